use serde::{Deserialize, Serialize};

/// Fixed five-level organization role hierarchy. Not user-configurable;
/// versioned alongside the code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrgRole {
    Owner,
    Admin,
    Manager,
    Member,
    Viewer,
}

impl OrgRole {
    pub fn hierarchy_level(&self) -> u8 {
        match self {
            Self::Owner => 4,
            Self::Admin => 3,
            Self::Manager => 2,
            Self::Member => 1,
            Self::Viewer => 0,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Owner => "owner",
            Self::Admin => "admin",
            Self::Manager => "manager",
            Self::Member => "member",
            Self::Viewer => "viewer",
        }
    }

    pub fn parse(label: &str) -> Option<Self> {
        match label.trim().to_ascii_lowercase().as_str() {
            "owner" => Some(Self::Owner),
            "admin" => Some(Self::Admin),
            "manager" => Some(Self::Manager),
            "member" => Some(Self::Member),
            "viewer" => Some(Self::Viewer),
            _ => None,
        }
    }
}

/// Hierarchy level for a role label. `None` for labels outside the fixed
/// hierarchy (workflow roles like "client" live in the transition table,
/// not here).
pub fn role_level(label: &str) -> Option<u8> {
    OrgRole::parse(label).map(|r| r.hierarchy_level())
}

/// True iff `actual` sits at or above `required` in the hierarchy. An
/// unknown label on either side denies; never fail open.
pub fn has_permission(actual: &str, required: &str) -> bool {
    match (role_level(actual), role_level(required)) {
        (Some(actual_level), Some(required_level)) => actual_level >= required_level,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reflexive_for_every_role() {
        for role in ["owner", "admin", "manager", "member", "viewer"] {
            assert!(has_permission(role, role), "{role} should satisfy itself");
        }
    }

    #[test]
    fn test_owner_outranks_viewer() {
        assert!(has_permission("Owner", "Viewer"));
        assert!(!has_permission("Viewer", "Owner"));
    }

    #[test]
    fn test_strict_ordering() {
        assert!(has_permission("admin", "manager"));
        assert!(has_permission("manager", "member"));
        assert!(!has_permission("member", "manager"));
    }

    #[test]
    fn test_unknown_labels_fail_closed() {
        assert!(!has_permission("unknown-role", "viewer"));
        assert!(!has_permission("owner", "unknown-role"));
        assert!(!has_permission("", "viewer"));
    }

    #[test]
    fn test_case_insensitive_parsing() {
        assert_eq!(OrgRole::parse("OWNER"), Some(OrgRole::Owner));
        assert_eq!(OrgRole::parse(" Manager "), Some(OrgRole::Manager));
        assert_eq!(OrgRole::parse("client"), None);
    }

    #[test]
    fn test_role_level_values() {
        assert_eq!(role_level("owner"), Some(4));
        assert_eq!(role_level("viewer"), Some(0));
        assert_eq!(role_level("nope"), None);
    }
}
