//! Claim extraction from gateway-injected headers.
//!
//! Token parsing happens at the authenticating gateway; by the time a
//! request reaches the platform its claims arrive as trusted headers.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use crate::error::Error;

const LOB_HEADER: &str = "x-lob-id";
const TEAM_HEADER: &str = "x-team-id";
const USER_HEADER: &str = "x-user-id";
const ROLES_HEADER: &str = "x-roles";

/// Tenancy claims required on every tenant-scoped path.
#[derive(Debug, Clone)]
pub struct TenantClaims {
    pub lob_id: String,
    pub team_id: String,
    pub user_id: String,
}

fn header_value(parts: &Parts, name: &str) -> Option<String> {
    parts
        .headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

impl<S> FromRequestParts<S> for TenantClaims
where
    S: Send + Sync,
{
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let lob_id = header_value(parts, LOB_HEADER).ok_or(Error::Unauthenticated)?;
        let team_id = header_value(parts, TEAM_HEADER).ok_or(Error::Unauthenticated)?;
        let user_id = header_value(parts, USER_HEADER).ok_or(Error::Unauthenticated)?;
        Ok(TenantClaims {
            lob_id,
            team_id,
            user_id,
        })
    }
}

/// Admin role claim required on `/admin/*` paths.
#[derive(Debug, Clone)]
pub struct AdminClaims {
    pub user_id: String,
}

impl<S> FromRequestParts<S> for AdminClaims
where
    S: Send + Sync,
{
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let roles = header_value(parts, ROLES_HEADER).ok_or(Error::Unauthenticated)?;
        let is_admin = roles
            .split(',')
            .map(str::trim)
            .any(|r| r.eq_ignore_ascii_case("admin"));
        if !is_admin {
            return Err(Error::Forbidden);
        }
        let user_id = header_value(parts, USER_HEADER).unwrap_or_else(|| "admin".to_string());
        Ok(AdminClaims { user_id })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    fn parts_with(headers: &[(&str, &str)]) -> Parts {
        let mut builder = Request::builder().uri("/");
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        builder.body(()).unwrap().into_parts().0
    }

    #[tokio::test]
    async fn missing_claims_are_unauthenticated() {
        let mut parts = parts_with(&[("x-lob-id", "acme")]);
        let result = TenantClaims::from_request_parts(&mut parts, &()).await;
        assert!(matches!(result, Err(Error::Unauthenticated)));
    }

    #[tokio::test]
    async fn full_claims_are_extracted() {
        let mut parts = parts_with(&[
            ("x-lob-id", "acme"),
            ("x-team-id", "pay"),
            ("x-user-id", "u1"),
        ]);
        let claims = TenantClaims::from_request_parts(&mut parts, &())
            .await
            .unwrap();
        assert_eq!(claims.lob_id, "acme");
        assert_eq!(claims.team_id, "pay");
        assert_eq!(claims.user_id, "u1");
    }

    #[tokio::test]
    async fn non_admin_roles_are_forbidden() {
        let mut parts = parts_with(&[("x-roles", "user,viewer")]);
        let result = AdminClaims::from_request_parts(&mut parts, &()).await;
        assert!(matches!(result, Err(Error::Forbidden)));

        let mut parts = parts_with(&[("x-roles", "user, Admin"), ("x-user-id", "ops")]);
        let claims = AdminClaims::from_request_parts(&mut parts, &()).await.unwrap();
        assert_eq!(claims.user_id, "ops");
    }
}
