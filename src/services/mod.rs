pub mod admin_service;
pub mod conversation_service;
pub mod message_service;
pub mod presence_service;
pub mod profile_service;

pub use admin_service::AdminService;
pub use conversation_service::ConversationService;
pub use message_service::{IncomingMessage, MessageService};
pub use presence_service::PresenceService;
pub use profile_service::ProfileService;
