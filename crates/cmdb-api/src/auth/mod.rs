//! Authentication and authorization for the API.
//!
//! Requests authenticate with a bearer API key (`cmdb_<prefix>_<secret>`).
//! Extractors resolve the owning user; handlers turn it into an
//! [`AuthorizationContext`](cmdb_core::AuthorizationContext) for the stores,
//! which make the final permission decision.

pub mod extractors;

#[cfg(test)]
pub mod test_helpers;

pub use extractors::{AuthenticatedUser, RequireAdmin};
