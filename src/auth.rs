use crate::config::Config;
use crate::errors::ApiError;
use actix_web::{FromRequest, HttpRequest, dev::Payload};
use argon2::password_hash::{PasswordHash, SaltString, rand_core::OsRng};
use argon2::{Argon2, PasswordHasher, PasswordVerifier};
use chrono::{Duration, Utc};
use futures_util::future::{Ready, err, ok};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, errors::ErrorKind};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String, // user id
    pub role: String,
    pub iat: usize,
    pub exp: usize,
}

#[derive(Debug, PartialEq, Eq)]
pub enum TokenError {
    Expired,
    Invalid,
}

impl From<TokenError> for ApiError {
    fn from(_: TokenError) -> Self {
        ApiError::Unauthorized
    }
}

pub fn hash_password(plain: &str) -> Result<String, ApiError> {
    let salt = SaltString::generate(&mut OsRng);
    Ok(Argon2::default()
        .hash_password(plain.as_bytes(), &salt)
        .map_err(|_| ApiError::Internal)?
        .to_string())
}

/// Returns false on mismatch or on an unparseable hash, never an error.
pub fn verify_password(hash: &str, plain: &str) -> bool {
    let parsed = match PasswordHash::new(hash) {
        Ok(p) => p,
        Err(_) => return false,
    };
    Argon2::default()
        .verify_password(plain.as_bytes(), &parsed)
        .is_ok()
}

pub fn create_access_token(user_id: &str, role: &str, cfg: &Config) -> Result<String, ApiError> {
    let now = Utc::now();
    let claims = Claims {
        sub: user_id.to_string(),
        role: role.to_string(),
        iat: now.timestamp() as usize,
        exp: (now + Duration::hours(cfg.token_ttl_hours)).timestamp() as usize,
    };
    jsonwebtoken::encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(cfg.jwt_secret_bytes()),
    )
    .map_err(|_| ApiError::Internal)
}

pub fn verify_access_token(token: &str, cfg: &Config) -> Result<Claims, TokenError> {
    let mut v = Validation::new(Algorithm::HS256);
    v.validate_exp = true;
    v.leeway = 0;
    jsonwebtoken::decode::<Claims>(token, &DecodingKey::from_secret(cfg.jwt_secret_bytes()), &v)
        .map(|data| data.claims)
        .map_err(|e| match e.kind() {
            ErrorKind::ExpiredSignature => TokenError::Expired,
            _ => TokenError::Invalid,
        })
}

/// Authenticated caller, resolved from the `Authorization: Bearer` header.
/// Tokens are only issued to verified accounts, so extraction succeeding
/// implies a verified principal.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: String,
    pub role: String,
}

impl FromRequest for AuthUser {
    type Error = ApiError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        let cfg = req.app_data::<actix_web::web::Data<Config>>().unwrap();
        if let Some(h) = req.headers().get("Authorization") {
            if let Ok(s) = h.to_str() {
                if let Some(token) = s.strip_prefix("Bearer ") {
                    if let Ok(claims) = verify_access_token(token, cfg) {
                        return ok(AuthUser {
                            user_id: claims.sub,
                            role: claims.role,
                        });
                    }
                }
            }
        }
        err(ApiError::Unauthorized)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::user::ROLE_USER;

    fn test_config() -> Config {
        Config {
            jwt_secret: Some("test-secret".into()),
            ..Config::default()
        }
    }

    #[test]
    fn hashes_differ_but_both_verify() {
        let h1 = hash_password("hunter22").unwrap();
        let h2 = hash_password("hunter22").unwrap();
        assert_ne!(h1, h2);
        assert!(verify_password(&h1, "hunter22"));
        assert!(verify_password(&h2, "hunter22"));
    }

    #[test]
    fn wrong_password_and_garbage_hash_are_false() {
        let h = hash_password("hunter22").unwrap();
        assert!(!verify_password(&h, "hunter23"));
        assert!(!verify_password("not-a-hash", "hunter22"));
    }

    #[test]
    fn token_round_trips_identity_and_role() {
        let cfg = test_config();
        let token = create_access_token("u-1", ROLE_USER, &cfg).unwrap();
        let claims = verify_access_token(&token, &cfg).unwrap();
        assert_eq!(claims.sub, "u-1");
        assert_eq!(claims.role, ROLE_USER);
    }

    #[test]
    fn expired_token_fails_with_expired() {
        let cfg = test_config();
        let now = Utc::now();
        let claims = Claims {
            sub: "u-1".into(),
            role: ROLE_USER.into(),
            iat: (now - Duration::hours(1)).timestamp() as usize,
            exp: (now - Duration::seconds(1)).timestamp() as usize,
        };
        let token = jsonwebtoken::encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(cfg.jwt_secret_bytes()),
        )
        .unwrap();
        assert_eq!(verify_access_token(&token, &cfg), Err(TokenError::Expired));
    }

    #[test]
    fn tampered_token_fails_with_invalid() {
        let cfg = test_config();
        let token = create_access_token("u-1", ROLE_USER, &cfg).unwrap();
        let mut bytes = token.into_bytes();
        let last = bytes.len() - 1;
        bytes[last] = if bytes[last] == b'A' { b'B' } else { b'A' };
        let tampered = String::from_utf8(bytes).unwrap();
        assert_eq!(
            verify_access_token(&tampered, &cfg),
            Err(TokenError::Invalid)
        );
    }
}
