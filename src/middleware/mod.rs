pub mod auth;
pub mod error_handling;
pub mod guards;

pub use auth::{verify_jwt, Claims};
pub use guards::{AdminUser, AuthUser};
