//! Current user handler.

use crate::auth::principal::Principal;
use crate::models::UserView;
use axum::{Extension, Json};
use tracing::instrument;

/// Handler for GET /api/v1/auth/me
///
/// ## Response
///
/// ```json
/// {
///   "sub": "f1c2...",
///   "username": "alice",
///   "email": "alice@example.com",
///   "email_verified": true,
///   "given_name": "Alice",
///   "family_name": "Smith",
///   "roles": ["leader", "student"],
///   "is_admin": false,
///   "is_leader": true
/// }
/// ```
#[instrument(skip_all, name = "bff.handlers.me")]
pub async fn get_me(Extension(principal): Extension<Principal>) -> Json<UserView> {
    Json(UserView::from(&principal))
}
