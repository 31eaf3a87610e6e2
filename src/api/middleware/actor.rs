//! Caller identity extractor
//!
//! Authentication happens in front of this service. The gateway forwards
//! the resolved identity as `X-Actor-Id` and `X-Actor-Roles` (comma separated
//! role codes), which are trusted as given.

use axum::{
    extract::FromRequestParts,
    http::{request::Parts, HeaderMap},
};
use tracing::debug;

use crate::api::types::ApiError;
use crate::domain::actor::{Actor, Role};

pub const ACTOR_ID_HEADER: &str = "x-actor-id";
pub const ACTOR_ROLES_HEADER: &str = "x-actor-roles";

/// The acting user and roles for a request
#[derive(Debug, Clone)]
pub struct RequestActor(pub Actor);

impl<S> FromRequestParts<S> for RequestActor
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let actor = actor_from_headers(&parts.headers)?;
        debug!(actor_id = ?actor.user_id, roles = ?actor.role_codes(), "Resolved request actor");
        Ok(RequestActor(actor))
    }
}

fn actor_from_headers(headers: &HeaderMap) -> Result<Actor, ApiError> {
    let user_id = match headers.get(ACTOR_ID_HEADER) {
        Some(value) => {
            let value = value
                .to_str()
                .map_err(|_| ApiError::bad_request("Invalid X-Actor-Id header encoding"))?
                .trim();
            (!value.is_empty()).then(|| value.to_string())
        }
        None => None,
    };

    let roles = match headers.get(ACTOR_ROLES_HEADER) {
        Some(value) => value
            .to_str()
            .map_err(|_| ApiError::bad_request("Invalid X-Actor-Roles header encoding"))?
            .split(',')
            .map(str::trim)
            .filter(|code| !code.is_empty())
            .map(Role::new)
            .collect(),
        None => Vec::new(),
    };

    let actor = Actor::new(user_id, roles);
    if actor.is_system() {
        return Err(ApiError::forbidden(
            "The SYSTEM role is reserved for integrations",
        ));
    }

    Ok(actor)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::actor::{ROLE_FINANCE, ROLE_OP_MANAGER};
    use axum::http::StatusCode;

    #[test]
    fn test_roles_are_split_and_normalized() {
        let mut headers = HeaderMap::new();
        headers.insert(ACTOR_ID_HEADER, "user-7".parse().unwrap());
        headers.insert(ACTOR_ROLES_HEADER, "op_manager, FINANCE,,".parse().unwrap());

        let actor = actor_from_headers(&headers).unwrap();
        assert_eq!(actor.user_id.as_deref(), Some("user-7"));
        assert_eq!(
            actor.roles,
            vec![Role::new(ROLE_OP_MANAGER), Role::new(ROLE_FINANCE)]
        );
    }

    #[test]
    fn test_anonymous_actor() {
        let actor = actor_from_headers(&HeaderMap::new()).unwrap();
        assert!(actor.user_id.is_none());
        assert!(actor.roles.is_empty());
    }

    #[test]
    fn test_system_role_cannot_be_claimed() {
        let mut headers = HeaderMap::new();
        headers.insert(ACTOR_ROLES_HEADER, "system".parse().unwrap());

        let err = actor_from_headers(&headers).unwrap_err();
        assert_eq!(err.status, StatusCode::FORBIDDEN);
    }
}
