//! Test helpers for authentication.
//!
//! Lets tests call authenticated endpoints without minting API keys.

use axum::{extract::Request, middleware::Next, response::Response};
use cmdb_core::User;

/// Extension type for injecting a test user into requests.
///
/// The wrapped user should exist in the test database, since stores record
/// the acting user id on the rows they write.
#[derive(Clone)]
pub struct TestUser(pub User);

/// Middleware that injects a test user into the request extensions.
///
/// # Example
///
/// ```ignore
/// let router = Router::new()
///     .route("/protected", get(handler))
///     .layer(middleware::from_fn(move |req, next| {
///         inject_test_user(TestUser(user.clone()), req, next)
///     }));
/// ```
pub async fn inject_test_user(test_user: TestUser, mut request: Request, next: Next) -> Response {
    request.extensions_mut().insert(test_user);
    next.run(request).await
}
