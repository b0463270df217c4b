pub mod notification_handlers;
pub mod notification_memory;
pub mod notification_models;
pub mod notification_repository;
pub mod notification_service;
pub mod routes;

pub use notification_memory::InMemoryNotificationStore;
pub use notification_models::{Notification, NotificationKind};
pub use notification_repository::{NotificationRepository, NotificationStore};
pub use notification_service::NotificationService;
