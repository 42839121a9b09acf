//! HTTP transport for session management

pub mod handlers;
pub mod routes;

pub use handlers::{AppState, ApiError};
pub use routes::build_router;
