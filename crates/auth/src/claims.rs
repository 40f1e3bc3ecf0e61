use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use deskhive_core::{CustomRoleId, OrgId, UserId};

use crate::{BuiltinRole, OrgMembership};

/// Session token claims (transport-agnostic).
///
/// A token is scoped to exactly one organization context. `role` and
/// `custom_role_id` describe the membership at issue time; authorization
/// re-reads the membership, so they are informational once issued.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionClaims {
    /// Subject / user identifier.
    pub sub: UserId,

    pub email: String,

    /// Organization context for the token.
    pub org_id: OrgId,

    pub role: BuiltinRole,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_role_id: Option<CustomRoleId>,

    /// Issued-at, seconds since the Unix epoch.
    pub iat: i64,

    /// Expiration, seconds since the Unix epoch.
    pub exp: i64,
}

impl SessionClaims {
    pub fn new(email: impl Into<String>, membership: &OrgMembership, now: DateTime<Utc>, ttl: Duration) -> Self {
        Self {
            sub: membership.user_id,
            email: email.into(),
            org_id: membership.org_id,
            role: membership.role,
            custom_role_id: membership.custom_role_id,
            iat: now.timestamp(),
            exp: (now + ttl).timestamp(),
        }
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.exp, 0)
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TokenError {
    #[error("token has expired")]
    Expired,

    #[error("token not yet valid (issued_at is in the future)")]
    NotYetValid,

    #[error("invalid token time window (expires_at <= issued_at)")]
    InvalidTimeWindow,

    #[error("malformed or tampered token: {0}")]
    Malformed(String),

    #[error("failed to sign token: {0}")]
    Signing(String),
}

/// Deterministically validate the claims' time window.
///
/// Note: this validates the *claims* only. Signature verification happens in
/// the codec before this is called.
pub fn validate_claims(claims: &SessionClaims, now: DateTime<Utc>) -> Result<(), TokenError> {
    let now = now.timestamp();
    if claims.exp <= claims.iat {
        return Err(TokenError::InvalidTimeWindow);
    }
    if now < claims.iat {
        return Err(TokenError::NotYetValid);
    }
    if now >= claims.exp {
        return Err(TokenError::Expired);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn claims(now: DateTime<Utc>, ttl: Duration) -> SessionClaims {
        let membership = OrgMembership::builtin(UserId::new(), OrgId::new(), BuiltinRole::Tester);
        SessionClaims::new("t@example.com", &membership, now, ttl)
    }

    #[test]
    fn valid_inside_window() {
        let now = Utc::now();
        let c = claims(now, Duration::days(7));
        assert_eq!(validate_claims(&c, now + Duration::days(6)), Ok(()));
    }

    #[test]
    fn expired_at_boundary() {
        let now = Utc::now();
        let c = claims(now, Duration::hours(1));
        assert_eq!(validate_claims(&c, now + Duration::hours(1)), Err(TokenError::Expired));
    }

    #[test]
    fn future_tokens_are_rejected() {
        let now = Utc::now();
        let c = claims(now, Duration::hours(1));
        assert_eq!(validate_claims(&c, now - Duration::minutes(5)), Err(TokenError::NotYetValid));
    }

    #[test]
    fn empty_window_is_invalid() {
        let now = Utc::now();
        let c = claims(now, Duration::zero());
        assert_eq!(validate_claims(&c, now), Err(TokenError::InvalidTimeWindow));
    }

    #[test]
    fn serializes_with_camel_case_claim_names() {
        let c = claims(Utc::now(), Duration::hours(1));
        let json = serde_json::to_value(&c).unwrap();
        assert!(json.get("orgId").is_some());
        assert_eq!(json["role"], "TESTER");
        assert!(json.get("customRoleId").is_none());
    }
}
