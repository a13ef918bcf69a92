use actix_web::{dev, http::header, web, FromRequest, HttpRequest};
use std::future::{ready, Ready};
use std::ops::Deref;

use crate::error::ApiError;
use crate::helper::auth_helpers::resolve_identity;
use crate::models::{Identity, Role, User};
use crate::{AppState, DbPool};

/// The live, active user behind the request's bearer token.
///
/// Resolution re-reads the user on every request, so deactivation and
/// deletion take effect immediately even for tokens that have not expired.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser(pub User);

impl AuthenticatedUser {
    pub fn identity(&self) -> Identity {
        self.0.identity()
    }

    /// Coarse route gate, checked before any resource is loaded.
    pub fn require_role(&self, allowed: &[Role]) -> Result<(), ApiError> {
        if allowed.contains(&self.0.role) {
            Ok(())
        } else {
            Err(ApiError::Forbidden(format!(
                "Role '{}' is not authorized to access this route.",
                self.0.role
            )))
        }
    }

    pub fn into_inner(self) -> User {
        self.0
    }
}

impl Deref for AuthenticatedUser {
    type Target = User;

    fn deref(&self) -> &User {
        &self.0
    }
}

fn authenticate(req: &HttpRequest) -> Result<AuthenticatedUser, ApiError> {
    let pool = req
        .app_data::<web::Data<DbPool>>()
        .ok_or_else(|| ApiError::internal("Server misconfigured.", "DbPool missing from app data"))?;
    let state = req
        .app_data::<web::Data<AppState>>()
        .ok_or_else(|| ApiError::internal("Server misconfigured.", "AppState missing from app data"))?;
    let header_value = req.headers().get(header::AUTHORIZATION).and_then(|v| v.to_str().ok());

    let conn = pool.get()?;
    let user = resolve_identity(&conn, &state.tokens, header_value)?;
    Ok(AuthenticatedUser(user))
}

impl FromRequest for AuthenticatedUser {
    type Error = ApiError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut dev::Payload) -> Self::Future {
        let result = authenticate(req);
        if let Err(ApiError::Authentication(reason)) = &result {
            log::debug!("Rejected request to {}: {}", req.path(), reason);
        }
        ready(result)
    }
}
