//! Authorization middleware
//!
//! Verifies HS256 bearer tokens and attaches the caller to the request

use axum::{
    body::Body,
    extract::State,
    http::{header, Request},
    middleware::Next,
    response::{IntoResponse, Response},
};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::config::AuthConfig;
use crate::error::{AppError, AppResult};

/// Permission constants
pub mod perm {
    pub const DEPARTMENT_WRITE: &str = "department:write";

    /// All permissions
    pub const ALL: [&str; 1] = [DEPARTMENT_WRITE];
}

/// Bearer token claims
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub exp: usize,
    #[serde(default)]
    pub permissions: Vec<String>,
}

/// Extension to store current caller in request
#[derive(Clone, Debug)]
pub struct CurrentUser {
    pub username: String,
    pub permissions: Vec<String>,
}

impl CurrentUser {
    /// Caller used when authorization is disabled
    pub fn anonymous() -> Self {
        Self {
            username: "anonymous".to_string(),
            permissions: perm::ALL.iter().map(|p| p.to_string()).collect(),
        }
    }

    /// Check if the user has a specific permission
    pub fn has_permission(&self, perm: &str) -> bool {
        self.permissions.iter().any(|p| p == perm)
    }

    /// Check if the user may create, change or delete departments
    pub fn can_manage_departments(&self) -> bool {
        self.has_permission(perm::DEPARTMENT_WRITE)
    }
}

/// Checks bearer tokens against the configured secret
pub struct TokenVerifier {
    enabled: bool,
    key: DecodingKey,
    validation: Validation,
}

impl TokenVerifier {
    pub fn from_config(config: &AuthConfig) -> Self {
        Self {
            enabled: config.enabled,
            key: DecodingKey::from_secret(config.jwt_secret.as_bytes()),
            validation: Validation::new(Algorithm::HS256),
        }
    }

    pub fn verify(&self, token: &str) -> AppResult<CurrentUser> {
        let data = decode::<Claims>(token, &self.key, &self.validation).map_err(|e| {
            tracing::debug!("Rejected bearer token: {}", e);
            AppError::Unauthorized
        })?;
        Ok(CurrentUser {
            username: data.claims.sub,
            permissions: data.claims.permissions,
        })
    }
}

/// Sign a token for `username`, valid for `ttl_secs`
pub fn issue_token(
    secret: &str,
    username: &str,
    permissions: &[&str],
    ttl_secs: i64,
) -> AppResult<String> {
    let exp = chrono::Utc::now().timestamp() + ttl_secs;
    let claims = Claims {
        sub: username.to_string(),
        exp: exp.max(0) as usize,
        permissions: permissions.iter().map(|p| p.to_string()).collect(),
    };
    encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| AppError::Internal(format!("failed to sign token: {}", e)))
}

/// Paths that don't require authentication
fn is_public_path(path: &str) -> bool {
    !path.starts_with("/api") || path == "/api/health"
}

fn bearer_token(request: &Request<Body>) -> Option<&str> {
    request
        .headers()
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
}

/// Authorization middleware
pub async fn auth_layer(
    State(verifier): State<Arc<TokenVerifier>>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    if !verifier.enabled {
        request.extensions_mut().insert(CurrentUser::anonymous());
        return next.run(request).await;
    }

    if is_public_path(request.uri().path()) {
        return next.run(request).await;
    }

    let Some(token) = bearer_token(&request) else {
        return AppError::Unauthorized.into_response();
    };

    match verifier.verify(token) {
        Ok(user) => {
            request.extensions_mut().insert(user);
            next.run(request).await
        }
        Err(e) => e.into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn verifier() -> TokenVerifier {
        TokenVerifier::from_config(&AuthConfig {
            enabled: true,
            jwt_secret: "test-secret".to_string(),
        })
    }

    #[test]
    fn test_token_round_trip() {
        let token = issue_token("test-secret", "alice", &[perm::DEPARTMENT_WRITE], 60).unwrap();
        let user = verifier().verify(&token).unwrap();
        assert_eq!(user.username, "alice");
        assert!(user.can_manage_departments());
    }

    #[test]
    fn test_rejects_wrong_secret_and_expired() {
        let token = issue_token("other-secret", "alice", &[], 60).unwrap();
        assert!(matches!(verifier().verify(&token), Err(AppError::Unauthorized)));

        let token = issue_token("test-secret", "alice", &[], -3600).unwrap();
        assert!(matches!(verifier().verify(&token), Err(AppError::Unauthorized)));
    }

    #[test]
    fn test_public_paths() {
        assert!(is_public_path("/api/health"));
        assert!(is_public_path("/index.html"));
        assert!(!is_public_path("/api/department/query"));
    }

    #[test]
    fn test_anonymous_has_all_permissions() {
        let user = CurrentUser::anonymous();
        assert!(perm::ALL.iter().all(|p| user.has_permission(p)));
    }
}
