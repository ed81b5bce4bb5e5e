// Public API - what other modules can use
pub use handlers::{login, logout, me, register};
pub use middleware::require_auth;
pub use types::AuthUser;

// Internal modules
mod handlers;
pub mod middleware;
pub mod models;
mod password;
pub mod repository;
pub mod service;
pub mod token;
pub mod types;
