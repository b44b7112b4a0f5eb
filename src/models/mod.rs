pub mod conversation;
pub mod message;
pub mod page;
pub mod user;

pub use conversation::Conversation;
pub use message::{Message, MessageType, MessageView, NewMessage};
pub use page::{Page, PageRequest};
pub use user::{
    ActivityStatus, Address, LastSeen, Preferences, ProfileUpdate, PublicProfile, User, UserFilter,
    UserRole, UserSummary,
};
