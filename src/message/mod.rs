pub mod message_dto;
pub mod message_handlers;
pub mod message_memory;
pub mod message_models;
pub mod message_repository;
pub mod message_service;
pub mod routes;

pub use message_memory::InMemoryMessageStore;
pub use message_models::Message;
pub use message_repository::{MessageRepository, MessageStore};
pub use message_service::MessageService;
