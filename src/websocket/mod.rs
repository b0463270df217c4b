pub mod handler;
pub mod presence;
pub mod types;

pub use handler::ws_handler;
pub use presence::PresenceRegistry;
