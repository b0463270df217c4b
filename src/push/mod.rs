pub mod encryption;
pub mod push_dto;
pub mod push_handlers;
pub mod push_memory;
pub mod push_models;
pub mod push_repository;
pub mod routes;
pub mod sender;
pub mod template;
pub mod worker;

pub use push_memory::InMemorySubscriptionStore;
pub use push_repository::{PushSubscriptionRepository, SubscriptionStore};
pub use sender::{VapidConfig, WebPushSender};
pub use worker::{start_job_reaper, PushWorker, WorkerSettings};
