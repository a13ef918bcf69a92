use crate::error::ApiError;
use crate::models::db_operations::users_db_operations;
use crate::models::{Role, User};
use bcrypt::{hash, verify, DEFAULT_COST};
use chrono::{Duration, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use once_cell::sync::Lazy;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("No authentication token was provided. Please log in.")]
    MissingCredential,
    #[error("The authentication token is invalid.")]
    InvalidSignature,
    #[error("The authentication token has expired. Please log in again.")]
    Expired,
    #[error("The user for this token no longer exists.")]
    SubjectNotFound,
    #[error("This account has been deactivated.")]
    SubjectInactive,
    #[error("Invalid username or password.")]
    InvalidCredentials,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TokenUser {
    pub id: i64,
    pub username: String,
    pub role: Role,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Claims {
    pub user: TokenUser,
    pub iat: i64,
    pub exp: i64,
}

/// Issues and verifies HS256 bearer tokens.
#[derive(Clone)]
pub struct TokenService {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
    ttl: Duration,
}

impl TokenService {
    pub fn new(secret: &[u8], ttl: Duration) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        TokenService {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            validation,
            ttl,
        }
    }

    /// Builds the service from the hex-encoded secret held in configuration.
    pub fn from_hex_secret(secret_hex: &str, ttl_hours: i64) -> Result<Self, hex::FromHexError> {
        let secret = hex::decode(secret_hex)?;
        Ok(Self::new(&secret, Duration::hours(ttl_hours)))
    }

    pub fn issue(&self, user: &User) -> Result<String, ApiError> {
        let now = Utc::now();
        let claims = Claims {
            user: TokenUser { id: user.id, username: user.username.clone(), role: user.role },
            iat: now.timestamp(),
            exp: (now + self.ttl).timestamp(),
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| ApiError::internal("Could not issue an authentication token.", e))
    }

    pub fn verify(&self, token: &str) -> Result<Claims, AuthError> {
        decode::<Claims>(token, &self.decoding, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => AuthError::Expired,
                _ => AuthError::InvalidSignature,
            })
    }
}

/// Extracts the token from an `Authorization: Bearer <token>` header value.
pub fn bearer_token(header: Option<&str>) -> Result<&str, AuthError> {
    header
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or(AuthError::MissingCredential)
}

/// Resolves a bearer header to the live user it names. Read-only.
pub fn resolve_identity(conn: &Connection, tokens: &TokenService, header: Option<&str>) -> Result<User, ApiError> {
    let token = bearer_token(header)?;
    let claims = tokens.verify(token)?;
    let user = users_db_operations::read_user(conn, claims.user.id)?
        .ok_or(AuthError::SubjectNotFound)?;
    if !user.is_active {
        return Err(AuthError::SubjectInactive.into());
    }
    Ok(user)
}

pub fn hash_password(password: &str, cost: u32) -> Result<String, ApiError> {
    Ok(hash(password, cost)?)
}

pub fn verify_password(password: &str, password_hash: &str) -> bool {
    verify(password, password_hash).unwrap_or(false)
}

/// Verified against when the username is unknown, so both failure paths pay
/// for one bcrypt check.
static UNKNOWN_USER_HASH: Lazy<String> =
    Lazy::new(|| hash("unknown-user-placeholder", DEFAULT_COST).unwrap_or_default());

/// Checks a username/password pair and issues a token. Unknown users and
/// wrong passwords fail identically, in message and in work done.
pub fn login(conn: &Connection, tokens: &TokenService, username: &str, password: &str) -> Result<(String, User), ApiError> {
    let user_id = match users_db_operations::read_credentials(conn, username)? {
        Some((id, password_hash)) if verify_password(password, &password_hash) => id,
        Some(_) => return Err(AuthError::InvalidCredentials.into()),
        None => {
            verify_password(password, &UNKNOWN_USER_HASH);
            return Err(AuthError::InvalidCredentials.into());
        }
    };
    let user = users_db_operations::read_user(conn, user_id)?.ok_or(AuthError::InvalidCredentials)?;
    if !user.is_active {
        return Err(AuthError::SubjectInactive.into());
    }
    users_db_operations::update_last_login_time(conn, user.id)?;
    let token = tokens.issue(&user)?;
    Ok((token, user))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::now_timestamp;

    fn sample_user() -> User {
        User {
            id: 7,
            username: "staff1".into(),
            full_name: "Staff One".into(),
            email: "staff1@example.org".into(),
            role: Role::Staff,
            is_active: true,
            department_id: Some(2),
            department: None,
            avatar: None,
            position: None,
            phone_number: None,
            last_login: None,
            created_at: now_timestamp(),
            updated_at: now_timestamp(),
        }
    }

    #[test]
    fn issued_tokens_verify() {
        let tokens = TokenService::new(b"0123456789abcdef0123456789abcdef", Duration::hours(1));
        let token = tokens.issue(&sample_user()).unwrap();
        let claims = tokens.verify(&token).unwrap();
        assert_eq!(claims.user.id, 7);
        assert_eq!(claims.user.role, Role::Staff);
    }

    #[test]
    fn expired_and_foreign_tokens_are_distinguished() {
        let expired = TokenService::new(b"0123456789abcdef0123456789abcdef", Duration::hours(-1));
        let token = expired.issue(&sample_user()).unwrap();
        assert_eq!(expired.verify(&token), Err(AuthError::Expired));

        let other = TokenService::new(b"ffffffffffffffffffffffffffffffff", Duration::hours(1));
        let foreign = other.issue(&sample_user()).unwrap();
        let tokens = TokenService::new(b"0123456789abcdef0123456789abcdef", Duration::hours(1));
        assert_eq!(tokens.verify(&foreign), Err(AuthError::InvalidSignature));
        assert_eq!(tokens.verify("not-a-jwt"), Err(AuthError::InvalidSignature));
    }

    #[test]
    fn bearer_header_parsing() {
        assert_eq!(bearer_token(Some("Bearer abc")), Ok("abc"));
        assert_eq!(bearer_token(Some("Bearer ")), Err(AuthError::MissingCredential));
        assert_eq!(bearer_token(Some("Basic abc")), Err(AuthError::MissingCredential));
        assert_eq!(bearer_token(None), Err(AuthError::MissingCredential));
    }

    #[test]
    fn hex_secret_is_decoded() {
        assert!(TokenService::from_hex_secret(&"ab".repeat(32), 24).is_ok());
        assert!(TokenService::from_hex_secret("zz", 24).is_err());
    }

    #[test]
    fn unknown_user_pays_for_a_bcrypt_check() {
        assert!(UNKNOWN_USER_HASH.starts_with(&format!("$2b${}$", DEFAULT_COST)));
        assert!(!verify_password("", &UNKNOWN_USER_HASH));

        let mut conn = Connection::open_in_memory().unwrap();
        crate::setup::db_setup::setup_portal_db(&mut conn).unwrap();
        let tokens = TokenService::new(b"unit-test-secret", Duration::hours(1));
        let err = login(&conn, &tokens, "nobody", "whatever").unwrap_err();
        assert!(matches!(err, ApiError::Authentication(AuthError::InvalidCredentials)));
    }
}
