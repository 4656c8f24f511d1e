use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::shared::error::{ApiError, ApiResult};

const LEEWAY_SECONDS: u64 = 60;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub role: String,
    pub iat: i64,
    pub exp: i64,
}

impl Claims {
    pub fn new(user_id: i32, role: &str, expiry_minutes: i64) -> Self {
        let now = Utc::now();
        Self {
            sub: user_id.to_string(),
            role: role.to_string(),
            iat: now.timestamp(),
            exp: (now + Duration::minutes(expiry_minutes)).timestamp(),
        }
    }

    pub fn user_id(&self) -> ApiResult<i32> {
        self.sub
            .parse()
            .map_err(|_| ApiError::Unauthorized("Invalid token subject".to_string()))
    }
}

pub fn issue_token(claims: &Claims, secret: &str) -> ApiResult<String> {
    encode(
        &Header::default(),
        claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|_| ApiError::Internal)
}

pub fn verify_token(token: &str, secret: &str) -> ApiResult<Claims> {
    let mut validation = Validation::default();
    validation.leeway = LEEWAY_SECONDS;
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &validation,
    )
    .map(|data| data.claims)
    .map_err(|_| ApiError::Unauthorized("Invalid or expired token".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_round_trip() {
        let claims = Claims::new(42, "technician", 15);
        let token = issue_token(&claims, "test-secret").unwrap();
        let decoded = verify_token(&token, "test-secret").unwrap();
        assert_eq!(decoded.user_id().unwrap(), 42);
        assert_eq!(decoded.role, "technician");
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let claims = Claims::new(1, "user", 15);
        let token = issue_token(&claims, "secret-a").unwrap();
        assert!(verify_token(&token, "secret-b").is_err());
    }

    #[test]
    fn expired_token_is_rejected() {
        let mut claims = Claims::new(1, "user", 15);
        claims.exp = (Utc::now() - Duration::hours(2)).timestamp();
        let token = issue_token(&claims, "secret").unwrap();
        assert!(verify_token(&token, "secret").is_err());
    }
}
