// Authentication: trainer session JWTs and the admin-key guard.

use axum::{
    extract::FromRequestParts,
    http::{request::Parts, StatusCode},
    Json,
};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

// ── JWT ──────────────────────────────────────────────────────────────

/// Session lifetime for trainer tokens.
const TOKEN_TTL_DAYS: i64 = 30;

/// JWT secret – in production this should come from an env var.
fn jwt_secret() -> Vec<u8> {
    std::env::var("JWT_SECRET")
        .unwrap_or_else(|_| "pokedream-dev-secret-change-in-production".to_string())
        .into_bytes()
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Claims {
    pub sub: String, // trainer id
    pub name: String,
    pub exp: usize, // expiry (unix timestamp)
}

pub fn create_token(trainer_id: &str, name: &str) -> Result<String, String> {
    let expiration = (chrono::Utc::now() + chrono::Duration::days(TOKEN_TTL_DAYS)).timestamp();

    let claims = Claims {
        sub: trainer_id.to_string(),
        name: name.to_string(),
        exp: expiration as usize,
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(&jwt_secret()),
    )
    .map_err(|e| format!("Failed to create token: {e}"))
}

pub fn verify_token(token: &str) -> Result<Claims, String> {
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(&jwt_secret()),
        &Validation::default(),
    )
    .map(|data| data.claims)
    .map_err(|e| format!("Invalid token: {e}"))
}

type Rejection = (StatusCode, Json<serde_json::Value>);

fn reject(status: StatusCode, msg: &str) -> Rejection {
    (status, Json(serde_json::json!({ "error": msg })))
}

fn bearer_token(parts: &Parts) -> Option<&str> {
    parts
        .headers
        .get("Authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
}

// ── Axum extractor: AuthTrainer ──────────────────────────────────────

/// Extracts the signed-in trainer from the Authorization header.
/// Usage: `AuthTrainer(claims)` in handler parameters.
#[derive(Debug, Clone)]
pub struct AuthTrainer(pub Claims);

impl<S> FromRequestParts<S> for AuthTrainer
where
    S: Send + Sync,
{
    type Rejection = Rejection;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        if parts.headers.get("Authorization").is_none() {
            return Err(reject(
                StatusCode::UNAUTHORIZED,
                "Missing Authorization header",
            ));
        }
        let token = bearer_token(parts).ok_or_else(|| {
            reject(
                StatusCode::UNAUTHORIZED,
                "Invalid Authorization header format",
            )
        })?;

        verify_token(token)
            .map(AuthTrainer)
            .map_err(|_| reject(StatusCode::UNAUTHORIZED, "Invalid token"))
    }
}

/// Optional auth extractor – does not reject if no token is present.
#[derive(Debug, Clone)]
pub struct OptionalAuthTrainer(pub Option<Claims>);

impl<S> FromRequestParts<S> for OptionalAuthTrainer
where
    S: Send + Sync,
{
    type Rejection = Rejection;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(OptionalAuthTrainer(
            bearer_token(parts).and_then(|t| verify_token(t).ok()),
        ))
    }
}

// ── Admin guard ──────────────────────────────────────────────────────

/// Admin secret made available to the [`Admin`] extractor through request
/// extensions. `None` closes admin routes outside local mode.
#[derive(Debug, Clone, Default)]
pub struct AdminSecret(pub Option<String>);

fn digest(s: &str) -> [u8; 32] {
    Sha256::digest(s.as_bytes()).into()
}

impl AdminSecret {
    /// Compare fixed-size digests so the check does not leak the prefix length.
    pub fn matches(&self, presented: &str) -> bool {
        match &self.0 {
            Some(secret) => digest(secret) == digest(presented),
            None => false,
        }
    }
}

/// Marker extractor for administrative endpoints. Accepts the admin secret in
/// `X-Admin-Key` or as a Bearer token; always passes in local mode.
#[derive(Debug, Clone, Copy)]
pub struct Admin;

impl<S> FromRequestParts<S> for Admin
where
    S: Send + Sync,
{
    type Rejection = Rejection;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        if crate::config::is_local_mode() {
            return Ok(Admin);
        }

        let secret = parts
            .extensions
            .get::<AdminSecret>()
            .cloned()
            .unwrap_or_default();
        if secret.0.is_none() {
            return Err(reject(StatusCode::FORBIDDEN, "Admin endpoints are disabled"));
        }

        let presented = parts
            .headers
            .get("X-Admin-Key")
            .and_then(|v| v.to_str().ok())
            .or_else(|| bearer_token(parts));

        match presented {
            None => Err(reject(StatusCode::UNAUTHORIZED, "Admin key required")),
            Some(key) if secret.matches(key) => Ok(Admin),
            Some(_) => {
                tracing::warn!("Rejected admin request with a bad key");
                Err(reject(StatusCode::FORBIDDEN, "Invalid admin key"))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    fn parts_with(headers: &[(&str, &str)], secret: Option<&str>) -> Parts {
        let mut builder = Request::builder().uri("/");
        for (k, v) in headers {
            builder = builder.header(*k, *v);
        }
        let (mut parts, _) = builder.body(()).unwrap().into_parts();
        parts
            .extensions
            .insert(AdminSecret(secret.map(str::to_string)));
        parts
    }

    #[test]
    fn test_jwt_create_and_verify() {
        let token = create_token("ab12cd34", "Misty").unwrap();
        let claims = verify_token(&token).unwrap();
        assert_eq!(claims.sub, "ab12cd34");
        assert_eq!(claims.name, "Misty");
    }

    #[test]
    fn test_jwt_invalid_token() {
        assert!(verify_token("invalid.token.here").is_err());
    }

    #[test]
    fn test_admin_secret_matches() {
        let secret = AdminSecret(Some("hunter2".into()));
        assert!(secret.matches("hunter2"));
        assert!(!secret.matches("hunter3"));
        assert!(!AdminSecret(None).matches(""));
    }

    #[tokio::test]
    async fn test_auth_trainer_extractor() {
        let token = create_token("t1", "Ash").unwrap();
        let mut parts = parts_with(&[("Authorization", &format!("Bearer {token}"))], None);
        let AuthTrainer(claims) = AuthTrainer::from_request_parts(&mut parts, &())
            .await
            .unwrap();
        assert_eq!(claims.sub, "t1");

        let mut parts = parts_with(&[], None);
        let (status, _) = AuthTrainer::from_request_parts(&mut parts, &())
            .await
            .unwrap_err();
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let mut parts = parts_with(&[("Authorization", "Basic abc")], None);
        let OptionalAuthTrainer(claims) = OptionalAuthTrainer::from_request_parts(&mut parts, &())
            .await
            .unwrap();
        assert!(claims.is_none());
    }

    #[tokio::test]
    async fn test_admin_extractor() {
        let mut parts = parts_with(&[("X-Admin-Key", "s3cret")], Some("s3cret"));
        assert!(Admin::from_request_parts(&mut parts, &()).await.is_ok());

        let mut parts = parts_with(&[("Authorization", "Bearer s3cret")], Some("s3cret"));
        assert!(Admin::from_request_parts(&mut parts, &()).await.is_ok());

        let mut parts = parts_with(&[("X-Admin-Key", "nope")], Some("s3cret"));
        let (status, _) = Admin::from_request_parts(&mut parts, &()).await.unwrap_err();
        assert_eq!(status, StatusCode::FORBIDDEN);

        let mut parts = parts_with(&[], Some("s3cret"));
        let (status, _) = Admin::from_request_parts(&mut parts, &()).await.unwrap_err();
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let mut parts = parts_with(&[("X-Admin-Key", "s3cret")], None);
        let (status, _) = Admin::from_request_parts(&mut parts, &()).await.unwrap_err();
        assert_eq!(status, StatusCode::FORBIDDEN);
    }
}
