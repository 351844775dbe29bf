//! API Module
//!
//! HTTP handlers and routing for the reference authority server.
//!
//! # Endpoints
//! - `POST /sync` - Exchange changes since `lastSync`
//! - `POST /set` - Push a single write
//! - `POST /remove` - Push a single delete
//! - `POST /clear` - Push a clear
//! - `GET /health` - Health check endpoint

pub mod handlers;
pub mod routes;

pub use handlers::*;
pub use routes::create_router;
