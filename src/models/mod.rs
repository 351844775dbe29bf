//! Models Module
//!
//! JSON bodies of the backend wire contract.

pub mod requests;
pub mod responses;

pub use requests::{validate_key, ClearRequest, RemoveRequest, SetRequest, SyncRequest};
pub use responses::{AckResponse, HealthResponse, SyncResponse};
