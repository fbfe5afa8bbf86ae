//! # cmdb-api
//!
//! REST API server for the CMDB.
//!
//! Exposes assets, tags, credentials, cloud accounts, database migration,
//! license files and user administration over HTTP. Every route under
//! `/api/v1` expects an `Authorization: Bearer cmdb_...` API key.

pub mod auth;
pub mod dto;
pub mod error;
pub mod middleware;
pub mod routes;
pub mod server;
pub mod state;
pub mod upload;

#[cfg(test)]
pub(crate) mod test_helpers;

pub use error::ApiError;
pub use server::{ApiServer, ApiServerConfig};
pub use state::AppState;
