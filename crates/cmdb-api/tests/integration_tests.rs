//! Integration tests for the CMDB API.
//!
//! These drive the public router the way a deployed client does: with a
//! real API key in the `Authorization` header.

mod integration;
