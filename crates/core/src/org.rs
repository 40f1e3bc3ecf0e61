//! Organization tree and user account records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult};
use crate::id::{OrgId, UserId};

// ─────────────────────────────────────────────────────────────────────────────
// Organization
// ─────────────────────────────────────────────────────────────────────────────

/// Kind of organization node.
///
/// `Client` organizations are leaves: nothing may be created beneath them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrgType {
    #[default]
    Normal,
    Client,
}

impl OrgType {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrgType::Normal => "NORMAL",
            OrgType::Client => "CLIENT",
        }
    }

    pub fn parse(s: &str) -> DomainResult<Self> {
        match s.trim().to_uppercase().as_str() {
            "NORMAL" => Ok(OrgType::Normal),
            "CLIENT" => Ok(OrgType::Client),
            other => Err(DomainError::validation(format!(
                "unknown org_type '{other}' (expected NORMAL or CLIENT)"
            ))),
        }
    }
}

impl core::fmt::Display for OrgType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Optional contact and location details of an organization.
///
/// Blank text is stored as absent.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct OrgProfile {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub whatsapp: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub slack_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub discord_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub linkedin_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address_line1: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address_line2: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub postal_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latitude: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub longitude: Option<f64>,
}

impl OrgProfile {
    /// Trim every text field and range-check the coordinates.
    pub fn normalized(self) -> DomainResult<Self> {
        let text = |v: Option<String>| v.map(|s| s.trim().to_string()).filter(|s| !s.is_empty());
        Ok(Self {
            email: text(self.email),
            whatsapp: text(self.whatsapp),
            slack_id: text(self.slack_id),
            discord_id: text(self.discord_id),
            linkedin_url: text(self.linkedin_url),
            address_line1: text(self.address_line1),
            address_line2: text(self.address_line2),
            city: text(self.city),
            state: text(self.state),
            postal_code: text(self.postal_code),
            country: text(self.country),
            latitude: coordinate("latitude", self.latitude, 90.0)?,
            longitude: coordinate("longitude", self.longitude, 180.0)?,
        })
    }
}

fn coordinate(what: &str, value: Option<f64>, limit: f64) -> DomainResult<Option<f64>> {
    match value {
        Some(v) if !v.is_finite() || v.abs() > limit => Err(DomainError::validation(format!(
            "{what} must be between -{limit} and {limit}"
        ))),
        other => Ok(other),
    }
}

/// A node in the organization forest.
///
/// # Invariants
/// - At most one parent; `parent_id == None` marks a root.
/// - The parent graph is acyclic: a node is only ever attached to a parent that
///   already exists, and parents are never re-pointed.
/// - A `Client` organization never has children.
/// - Names are unique among siblings only; roots may share a name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Organization {
    pub id: OrgId,
    pub name: String,
    pub parent_id: Option<OrgId>,
    pub org_type: OrgType,
    pub created_at: DateTime<Utc>,
    #[serde(flatten)]
    pub profile: OrgProfile,
}

impl Organization {
    /// Build a new root organization.
    pub fn new_root(name: &str, now: DateTime<Utc>) -> DomainResult<Self> {
        Ok(Self {
            id: OrgId::new(),
            name: validate_name("organization name", name)?,
            parent_id: None,
            org_type: OrgType::Normal,
            created_at: now,
            profile: OrgProfile::default(),
        })
    }

    /// Build a new organization beneath `self`.
    pub fn new_child(&self, name: &str, org_type: OrgType, now: DateTime<Utc>) -> DomainResult<Self> {
        self.ensure_can_own_children()?;
        Ok(Self {
            id: OrgId::new(),
            name: validate_name("organization name", name)?,
            parent_id: Some(self.id),
            org_type,
            created_at: now,
            profile: OrgProfile::default(),
        })
    }

    pub fn with_profile(mut self, profile: OrgProfile) -> DomainResult<Self> {
        self.profile = profile.normalized()?;
        Ok(self)
    }

    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }

    pub fn ensure_can_own_children(&self) -> DomainResult<()> {
        if self.org_type == OrgType::Client {
            return Err(DomainError::invariant(
                "client organizations cannot own sub-organizations",
            ));
        }
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// User
// ─────────────────────────────────────────────────────────────────────────────

/// A user account. Memberships live separately (see `deskhive-auth`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub name: String,
    /// Normalized (trimmed, lowercase). Globally unique.
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn new(name: &str, email: &str, password_hash: String, now: DateTime<Utc>) -> DomainResult<Self> {
        Ok(Self {
            id: UserId::new(),
            name: validate_name("user name", name)?,
            email: normalize_email(email)?,
            password_hash,
            created_at: now,
        })
    }
}

/// Trim + lowercase an email address, rejecting obviously malformed input.
pub fn normalize_email(email: &str) -> DomainResult<String> {
    let email = email.trim();
    if email.is_empty() || !email.contains('@') {
        return Err(DomainError::validation("invalid email format"));
    }
    Ok(email.to_lowercase())
}

fn validate_name(what: &str, name: &str) -> DomainResult<String> {
    let name = name.trim();
    if name.is_empty() {
        return Err(DomainError::validation(format!("{what} is required")));
    }
    Ok(name.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_org_cannot_own_children() {
        let root = Organization::new_root("Acme", Utc::now()).unwrap();
        let client = root.new_child("Globex", OrgType::Client, Utc::now()).unwrap();
        assert_eq!(client.parent_id, Some(root.id));

        let err = client.new_child("Nested", OrgType::Normal, Utc::now()).unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(_)));
    }

    #[test]
    fn profile_blanks_become_absent_and_coordinates_are_bounded() {
        let root = Organization::new_root("Acme", Utc::now()).unwrap();
        let org = root
            .with_profile(OrgProfile {
                city: Some("  Porto ".into()),
                country: Some(String::new()),
                longitude: Some(-8.61),
                ..OrgProfile::default()
            })
            .unwrap();
        assert_eq!(org.profile.city.as_deref(), Some("Porto"));
        assert_eq!(org.profile.country, None);

        let json = serde_json::to_value(&org).unwrap();
        assert_eq!(json["city"], "Porto");
        assert!(json.get("country").is_none());

        let bad = OrgProfile {
            longitude: Some(181.0),
            ..OrgProfile::default()
        };
        assert!(matches!(bad.normalized(), Err(DomainError::Validation(_))));
        let nan = OrgProfile {
            latitude: Some(f64::NAN),
            ..OrgProfile::default()
        };
        assert!(nan.normalized().is_err());
    }

    #[test]
    fn names_are_trimmed_and_required() {
        let org = Organization::new_root("  Acme  ", Utc::now()).unwrap();
        assert_eq!(org.name, "Acme");
        assert!(Organization::new_root("   ", Utc::now()).is_err());
    }

    #[test]
    fn emails_are_normalized() {
        assert_eq!(normalize_email(" Alice@Example.COM ").unwrap(), "alice@example.com");
        assert!(normalize_email("no-at-sign").is_err());
    }

    #[test]
    fn org_type_parses_case_insensitively() {
        assert_eq!(OrgType::parse("client").unwrap(), OrgType::Client);
        assert!(OrgType::parse("partner").is_err());
    }

    #[test]
    fn password_hash_is_not_serialized() {
        let user = User::new("Alice", "alice@example.com", "$2b$hash".into(), Utc::now()).unwrap();
        let json = serde_json::to_value(&user).unwrap();
        assert!(json.get("password_hash").is_none());
        assert_eq!(json["email"], "alice@example.com");
    }
}
