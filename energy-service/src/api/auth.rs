use std::collections::HashMap;

use axum::{
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts},
};
use energy_client::domain::OwnerId;

use super::{error::ApiError, AppState};

/// Resolves a presented credential to the single owner it belongs to.
pub trait IdentityProvider: Send + Sync {
    fn authenticate(&self, token: &str) -> Option<OwnerId>;
}

/// Fixed bearer tokens from configuration.
#[derive(Debug, Clone, Default)]
pub struct StaticTokenIdentity {
    tokens: HashMap<String, OwnerId>,
}

impl StaticTokenIdentity {
    pub fn new(tokens: HashMap<String, OwnerId>) -> Self {
        Self { tokens }
    }
}

impl IdentityProvider for StaticTokenIdentity {
    fn authenticate(&self, token: &str) -> Option<OwnerId> {
        self.tokens.get(token).cloned()
    }
}

/// The owner behind the request's `Authorization: Bearer` header.
#[derive(Debug, Clone)]
pub struct AuthenticatedOwner(pub OwnerId);

fn bearer_token(parts: &Parts) -> Option<&str> {
    let value = parts.headers.get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    Some(token.trim()).filter(|t| !t.is_empty())
}

#[async_trait::async_trait]
impl FromRequestParts<AppState> for AuthenticatedOwner {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts).ok_or(ApiError::Unauthorized)?;
        let owner = state.identity.authenticate(token).ok_or_else(|| {
            metrics::counter!("auth_rejected_total").increment(1);
            ApiError::Unauthorized
        })?;

        Ok(AuthenticatedOwner(owner))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    fn parts_with(header: Option<&str>) -> Parts {
        let mut builder = Request::builder().uri("/statistics/");
        if let Some(h) = header {
            builder = builder.header(AUTHORIZATION, h);
        }
        builder.body(()).unwrap().into_parts().0
    }

    #[test]
    fn bearer_scheme_is_case_insensitive() {
        assert_eq!(bearer_token(&parts_with(Some("Bearer abc"))), Some("abc"));
        assert_eq!(bearer_token(&parts_with(Some("bearer abc"))), Some("abc"));
    }

    #[test]
    fn other_schemes_and_blank_tokens_are_ignored() {
        assert_eq!(bearer_token(&parts_with(Some("Basic abc"))), None);
        assert_eq!(bearer_token(&parts_with(Some("Bearer  "))), None);
        assert_eq!(bearer_token(&parts_with(None)), None);
    }

    #[test]
    fn static_tokens_map_to_owners() {
        let identity = StaticTokenIdentity::new(HashMap::from([("t-1".to_string(), OwnerId::new("alice"))]));
        assert_eq!(identity.authenticate("t-1"), Some(OwnerId::new("alice")));
        assert_eq!(identity.authenticate("t-2"), None);
    }
}
