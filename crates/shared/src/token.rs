//! Session token issuance and verification.
//!
//! Tokens are HS256 JWTs signed with a secret shared by the auth service (which
//! issues them) and the forum service (which only verifies them).

use chrono::Utc;
use jsonwebtoken::{errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

pub const DEFAULT_ISSUER: &str = "forum-app";

#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    #[error("token service misconfigured: {0}")]
    Config(&'static str),
    #[error("failed to sign token: {0}")]
    Encode(#[source] jsonwebtoken::errors::Error),
    #[error("token expired")]
    Expired,
    #[error("invalid token: {0}")]
    Invalid(String),
}

/// JWT claims carried by every session token.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionClaims {
    pub user_id: i64,
    pub username: String,
    pub iss: String,
    pub iat: i64,
    pub exp: i64,
}

/// The verified subject of a token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user_id: i64,
    pub username: String,
}

#[derive(Clone)]
pub struct TokenService {
    encoding: EncodingKey,
    decoding: DecodingKey,
    issuer: String,
    ttl: chrono::Duration,
}

impl std::fmt::Debug for TokenService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenService")
            .field("issuer", &self.issuer)
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}

impl TokenService {
    pub fn new(secret: &str, ttl: std::time::Duration, issuer: impl Into<String>) -> Result<Self, TokenError> {
        if secret.is_empty() {
            return Err(TokenError::Config("secret key cannot be empty"));
        }
        if ttl.is_zero() {
            return Err(TokenError::Config("token lifetime must be positive"));
        }
        let ttl = chrono::Duration::from_std(ttl)
            .map_err(|_| TokenError::Config("token lifetime out of range"))?;

        Ok(Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            issuer: issuer.into(),
            ttl,
        })
    }

    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    /// Issue a signed token for a user.
    pub fn issue(&self, user_id: i64, username: &str) -> Result<String, TokenError> {
        let now = Utc::now();
        let claims = SessionClaims {
            user_id,
            username: username.to_string(),
            iss: self.issuer.clone(),
            iat: now.timestamp(),
            exp: (now + self.ttl).timestamp(),
        };
        self.sign(&claims)
    }

    fn sign(&self, claims: &SessionClaims) -> Result<String, TokenError> {
        let mut header = Header::new(Algorithm::HS256);
        header.typ = Some("JWT".to_string());
        jsonwebtoken::encode(&header, claims, &self.encoding).map_err(TokenError::Encode)
    }

    /// Validate an incoming token and return its subject.
    pub fn verify(&self, token: &str) -> Result<Identity, TokenError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[self.issuer.as_str()]);

        let data = jsonwebtoken::decode::<SessionClaims>(token, &self.decoding, &validation)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => TokenError::Expired,
                _ => TokenError::Invalid(e.to_string()),
            })?;

        let claims = data.claims;
        if claims.user_id <= 0 {
            return Err(TokenError::Invalid("invalid user ID in token".to_string()));
        }
        Ok(Identity {
            user_id: claims.user_id,
            username: claims.username,
        })
    }
}

/// Extract the token from an `Authorization: Bearer <token>` header value.
pub fn bearer_token(header: &str) -> Option<&str> {
    let mut parts = header.split(' ');
    match (parts.next(), parts.next(), parts.next()) {
        (Some("Bearer"), Some(token), None) if !token.is_empty() => Some(token),
        _ => None,
    }
}
