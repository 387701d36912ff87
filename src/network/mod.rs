//! Network Module
//!
//! HTTP request adapter over the engine.
//!
//! ## Routes
//! - `PUT    /v1/key/{key}`  body is the raw value → 201
//! - `GET    /v1/key/{key}`  → 200 with the value, 404 if absent
//! - `DELETE /v1/key/{key}`  → 200, 404 if absent
//!
//! Every other failure maps to 500.

mod handlers;
mod server;

pub use handlers::{build_router, AppState};
pub use server::Server;
