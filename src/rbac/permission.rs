//! Fine-grained capability tokens, grouped by administrative domain.

use serde::{Deserialize, Serialize};
use std::fmt;
use utoipa::ToSchema;

/// Administrative domain a permission belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Domain {
    User,
    Room,
    Finance,
    Risk,
    Ops,
}

/// The smallest authorizable capability unit.
///
/// Wire names (`user:view`, `finance:recharge`, ...) are shared with the
/// dashboard and must not change.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ToSchema,
)]
pub enum Permission {
    #[serde(rename = "user:view")]
    UserView,
    #[serde(rename = "user:edit")]
    UserEdit,
    #[serde(rename = "user:blacklist")]
    UserBlacklist,
    #[serde(rename = "user:ban")]
    UserBan,
    #[serde(rename = "user:kyc")]
    UserKyc,

    #[serde(rename = "room:view")]
    RoomView,
    #[serde(rename = "room:manage")]
    RoomManage,
    #[serde(rename = "room:kick")]
    RoomKick,
    #[serde(rename = "room:replay")]
    RoomReplay,
    #[serde(rename = "room:close")]
    RoomClose,

    #[serde(rename = "finance:view")]
    FinanceView,
    #[serde(rename = "finance:recharge")]
    FinanceRecharge,
    #[serde(rename = "finance:withdraw")]
    FinanceWithdraw,
    #[serde(rename = "finance:reconcile")]
    FinanceReconcile,

    #[serde(rename = "risk:view")]
    RiskView,
    #[serde(rename = "risk:rule")]
    RiskRule,
    #[serde(rename = "risk:detect")]
    RiskDetect,

    #[serde(rename = "ops:publish")]
    OpsPublish,
    #[serde(rename = "ops:rollback")]
    OpsRollback,
    #[serde(rename = "ops:config")]
    OpsConfig,
    #[serde(rename = "ops:monitor")]
    OpsMonitor,
}

impl Permission {
    /// Every permission, in declaration order.
    pub const ALL: [Permission; 21] = [
        Self::UserView,
        Self::UserEdit,
        Self::UserBlacklist,
        Self::UserBan,
        Self::UserKyc,
        Self::RoomView,
        Self::RoomManage,
        Self::RoomKick,
        Self::RoomReplay,
        Self::RoomClose,
        Self::FinanceView,
        Self::FinanceRecharge,
        Self::FinanceWithdraw,
        Self::FinanceReconcile,
        Self::RiskView,
        Self::RiskRule,
        Self::RiskDetect,
        Self::OpsPublish,
        Self::OpsRollback,
        Self::OpsConfig,
        Self::OpsMonitor,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::UserView => "user:view",
            Self::UserEdit => "user:edit",
            Self::UserBlacklist => "user:blacklist",
            Self::UserBan => "user:ban",
            Self::UserKyc => "user:kyc",
            Self::RoomView => "room:view",
            Self::RoomManage => "room:manage",
            Self::RoomKick => "room:kick",
            Self::RoomReplay => "room:replay",
            Self::RoomClose => "room:close",
            Self::FinanceView => "finance:view",
            Self::FinanceRecharge => "finance:recharge",
            Self::FinanceWithdraw => "finance:withdraw",
            Self::FinanceReconcile => "finance:reconcile",
            Self::RiskView => "risk:view",
            Self::RiskRule => "risk:rule",
            Self::RiskDetect => "risk:detect",
            Self::OpsPublish => "ops:publish",
            Self::OpsRollback => "ops:rollback",
            Self::OpsConfig => "ops:config",
            Self::OpsMonitor => "ops:monitor",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|permission| permission.as_str() == value.trim())
    }

    #[must_use]
    pub const fn domain(self) -> Domain {
        match self {
            Self::UserView | Self::UserEdit | Self::UserBlacklist | Self::UserBan | Self::UserKyc => {
                Domain::User
            }
            Self::RoomView
            | Self::RoomManage
            | Self::RoomKick
            | Self::RoomReplay
            | Self::RoomClose => Domain::Room,
            Self::FinanceView
            | Self::FinanceRecharge
            | Self::FinanceWithdraw
            | Self::FinanceReconcile => Domain::Finance,
            Self::RiskView | Self::RiskRule | Self::RiskDetect => Domain::Risk,
            Self::OpsPublish | Self::OpsRollback | Self::OpsConfig | Self::OpsMonitor => {
                Domain::Ops
            }
        }
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_names_round_trip() {
        for permission in Permission::ALL {
            assert_eq!(Permission::parse(permission.as_str()), Some(permission));
        }
        assert_eq!(Permission::parse("user:delete"), None);
    }

    #[test]
    fn wire_name_prefix_matches_domain() {
        for permission in Permission::ALL {
            let prefix = permission.as_str().split(':').next().unwrap_or_default();
            let expected = match permission.domain() {
                Domain::User => "user",
                Domain::Room => "room",
                Domain::Finance => "finance",
                Domain::Risk => "risk",
                Domain::Ops => "ops",
            };
            assert_eq!(prefix, expected, "{permission}");
        }
    }

    #[test]
    fn serde_uses_wire_names() {
        let json = serde_json::to_string(&Permission::FinanceRecharge).unwrap_or_default();
        assert_eq!(json, "\"finance:recharge\"");
        let parsed: Permission = serde_json::from_str("\"ops:monitor\"").unwrap_or(Permission::UserView);
        assert_eq!(parsed, Permission::OpsMonitor);
    }
}
