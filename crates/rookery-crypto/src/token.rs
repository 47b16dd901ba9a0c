use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Seconds a confirmation, reset or email-change token stays valid.
pub const DEFAULT_TTL_SECS: i64 = 3600;
/// Login session lifetime without "remember me".
pub const SESSION_TTL_HOURS: i64 = 12;
/// Login session lifetime with "remember me".
pub const REMEMBER_ME_TTL_DAYS: i64 = 30;

/// What a token may be used for. Verification rejects a token presented
/// for any purpose other than the one it was issued with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenPurpose {
    Confirm,
    ResetPassword,
    ChangeEmail,
    Session,
}

impl TokenPurpose {
    pub fn default_ttl(self) -> Duration {
        match self {
            Self::Session => Duration::hours(SESSION_TTL_HOURS),
            Self::Confirm | Self::ResetPassword | Self::ChangeEmail => {
                Duration::seconds(DEFAULT_TTL_SECS)
            }
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenClaims {
    pub purpose: TokenPurpose,
    #[serde(rename = "sub")]
    pub user_id: i64,
    pub exp: i64,
}

/// Issues and checks signed, time-limited tokens carrying a user id.
#[derive(Clone)]
pub struct TokenService {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
}

impl TokenService {
    pub fn new(secret: &str) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;

        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            validation,
        }
    }

    /// Sign `{purpose, sub: user_id}` with expiry `now + ttl`.
    pub fn issue(&self, purpose: TokenPurpose, user_id: i64, ttl: Duration) -> Result<String> {
        self.issue_at(purpose, user_id, Utc::now(), ttl)
    }

    fn issue_at(
        &self,
        purpose: TokenPurpose,
        user_id: i64,
        issued_at: DateTime<Utc>,
        ttl: Duration,
    ) -> Result<String> {
        let claims = TokenClaims {
            purpose,
            user_id,
            exp: (issued_at + ttl).timestamp(),
        };

        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)?;
        Ok(token)
    }

    /// The user id carried by `token`, if the signature is valid, the token
    /// has not expired and it was issued for `purpose`.
    pub fn decode(&self, token: &str, purpose: TokenPurpose) -> Option<i64> {
        let data = match decode::<TokenClaims>(token, &self.decoding, &self.validation) {
            Ok(data) => data,
            Err(e) => {
                debug!(?purpose, "Token rejected: {}", e);
                return None;
            }
        };

        if data.claims.purpose != purpose {
            debug!(
                expected = ?purpose,
                actual = ?data.claims.purpose,
                "Token rejected: wrong purpose"
            );
            return None;
        }

        Some(data.claims.user_id)
    }

    /// True iff `token` is valid for `purpose` and was issued to `expected_user_id`.
    pub fn verify(&self, token: &str, purpose: TokenPurpose, expected_user_id: i64) -> bool {
        self.decode(token, purpose) == Some(expected_user_id)
    }
}
