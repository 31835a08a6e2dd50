//! JWT token generation and validation

use crate::core::error::{AppError, Result};
use chrono::{DateTime, Duration, SecondsFormat, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

/// Which site a token was issued for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    User,
    Admin,
}

/// JWT Claims structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// User or admin id
    pub sub: String,
    pub kind: TokenKind,
    /// Admin session id; only admin tokens carry one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sid: Option<String>,
    pub iat: usize,
    pub exp: usize,
}

impl Claims {
    /// Claims valid for `expires_in_minutes` from now
    pub fn new(
        subject: &str,
        kind: TokenKind,
        session_id: Option<&str>,
        expires_in_minutes: i64,
    ) -> Result<Self> {
        let issued = Utc::now();
        let expiration = issued
            .checked_add_signed(Duration::minutes(expires_in_minutes))
            .ok_or_else(|| {
                AppError::AuthenticationError("Failed to calculate expiration".to_string())
            })?;

        Ok(Self {
            sub: subject.to_string(),
            kind,
            sid: session_id.map(str::to_string),
            iat: issued.timestamp() as usize,
            exp: expiration.timestamp() as usize,
        })
    }

    /// Expiration as an RFC 3339 timestamp, comparable with stored dates
    pub fn expires_at(&self) -> String {
        DateTime::<Utc>::from_timestamp(self.exp as i64, 0)
            .unwrap_or_else(Utc::now)
            .to_rfc3339_opts(SecondsFormat::Secs, true)
    }

    /// Seconds between issue and expiry
    pub fn lifetime_secs(&self) -> i64 {
        self.exp.saturating_sub(self.iat) as i64
    }
}

/// Sign claims into a token
pub fn generate_token(claims: &Claims, secret: &str) -> Result<String> {
    encode(
        &Header::default(),
        claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| AppError::AuthenticationError(format!("Failed to generate token: {}", e)))
}

/// Validate a JWT token and extract claims
pub fn validate_token(token: &str, secret: &str) -> Result<Claims> {
    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|e| AppError::AuthenticationError(format!("Invalid token: {}", e)))?;

    Ok(token_data.claims)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "test-secret-that-is-long-enough-for-hs256";

    #[test]
    fn test_admin_token_round_trip() {
        let claims = Claims::new("admin-1", TokenKind::Admin, Some("session-1"), 60).unwrap();
        let token = generate_token(&claims, SECRET).unwrap();

        let decoded = validate_token(&token, SECRET).unwrap();
        assert_eq!(decoded.sub, "admin-1");
        assert_eq!(decoded.kind, TokenKind::Admin);
        assert_eq!(decoded.sid.as_deref(), Some("session-1"));
        assert_eq!(decoded.lifetime_secs(), 3600);
    }

    #[test]
    fn test_wrong_secret_is_rejected() {
        let claims = Claims::new("user-1", TokenKind::User, None, 60).unwrap();
        let token = generate_token(&claims, SECRET).unwrap();

        let err = validate_token(&token, "another-secret").unwrap_err();
        assert!(matches!(err, AppError::AuthenticationError(_)));
    }

    #[test]
    fn test_expired_token_is_rejected() {
        // Past the default 60 second leeway
        let claims = Claims::new("user-1", TokenKind::User, None, -5).unwrap();
        let token = generate_token(&claims, SECRET).unwrap();

        assert!(validate_token(&token, SECRET).is_err());
    }

    #[test]
    fn test_expires_at_is_rfc3339() {
        let claims = Claims::new("user-1", TokenKind::User, None, 30).unwrap();
        let expires_at = claims.expires_at();
        assert!(expires_at.ends_with('Z'));
        assert!(DateTime::parse_from_rfc3339(&expires_at).is_ok());
    }
}
