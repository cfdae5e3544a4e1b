//! HTTP surface: authentication middleware, router and server

pub mod auth;
mod router;
mod server;

pub use auth::{AuthRejection, ResolvedAuthConfig, auth_middleware};
pub use router::create_router;
pub use server::Gateway;
