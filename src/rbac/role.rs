//! Administrative roles.

use serde::{Deserialize, Serialize};
use std::fmt;
use utoipa::ToSchema;

/// A named bundle of permissions assigned to a principal.
///
/// Roles are flat: no role inherits from another. `SuperAdmin` is simply the
/// role whose grant set is the full permission enumeration.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ToSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Every permission.
    SuperAdmin,
    /// Users, rooms and risk controls.
    Admin,
    /// Ledger, recharge, withdrawal review.
    Finance,
    /// Player blacklist and bans.
    Support,
    /// Releases, rollbacks and runtime configuration.
    Operator,
}

impl Role {
    pub const ALL: [Role; 5] = [
        Self::SuperAdmin,
        Self::Admin,
        Self::Finance,
        Self::Support,
        Self::Operator,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::SuperAdmin => "super_admin",
            Self::Admin => "admin",
            Self::Finance => "finance",
            Self::Support => "support",
            Self::Operator => "operator",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim() {
            "super_admin" => Some(Self::SuperAdmin),
            "admin" => Some(Self::Admin),
            "finance" => Some(Self::Finance),
            "support" => Some(Self::Support),
            "operator" => Some(Self::Operator),
            _ => None,
        }
    }

    /// Parse a comma-separated role list, skipping blanks.
    ///
    /// # Errors
    /// Returns the first unknown role name.
    pub fn parse_list(value: &str) -> Result<Vec<Self>, String> {
        value
            .split(',')
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(|name| Self::parse(name).ok_or_else(|| name.to_string()))
            .collect()
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_matches_as_str() {
        for role in Role::ALL {
            assert_eq!(Role::parse(role.as_str()), Some(role));
        }
        assert_eq!(Role::parse("root"), None);
    }

    #[test]
    fn parse_list_trims_and_rejects_unknown() {
        assert_eq!(
            Role::parse_list(" finance, support ,"),
            Ok(vec![Role::Finance, Role::Support])
        );
        assert_eq!(Role::parse_list("admin,root"), Err("root".to_string()));
        assert_eq!(Role::parse_list(""), Ok(Vec::new()));
    }
}
