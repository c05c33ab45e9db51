//! Role to permission resolution.
//!
//! The grant table is an immutable value built once at startup and handed to
//! every component that authorizes requests. There is no global lookup.

pub mod permission;
pub mod role;

pub use permission::{Domain, Permission};
pub use role::Role;

use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RbacError {
    #[error("role {0} has no grant entry")]
    MissingRole(Role),
    #[error("role {0} grants no permissions")]
    EmptyGrant(Role),
    #[error("super_admin must hold every permission, missing {0}")]
    SuperAdminIncomplete(Permission),
}

/// Total mapping `Role -> set<Permission>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RolePermissionMap {
    grants: BTreeMap<Role, BTreeSet<Permission>>,
}

impl RolePermissionMap {
    /// The production grant table.
    #[must_use]
    pub fn standard() -> Self {
        use Permission::{
            FinanceReconcile, FinanceRecharge, FinanceView, FinanceWithdraw, OpsConfig,
            OpsMonitor, OpsPublish, OpsRollback, RiskDetect, RiskRule, RiskView, RoomClose,
            RoomKick, RoomManage, RoomReplay, RoomView, UserBan, UserBlacklist, UserEdit,
            UserView,
        };

        let mut grants = BTreeMap::new();
        grants.insert(Role::SuperAdmin, Permission::ALL.into_iter().collect());
        grants.insert(
            Role::Admin,
            BTreeSet::from([
                UserView, UserEdit, UserBan, RoomView, RoomManage, RoomKick, RoomReplay,
                RoomClose, RiskView, RiskRule, RiskDetect,
            ]),
        );
        grants.insert(
            Role::Finance,
            BTreeSet::from([
                UserView,
                FinanceView,
                FinanceRecharge,
                FinanceWithdraw,
                FinanceReconcile,
            ]),
        );
        grants.insert(
            Role::Support,
            BTreeSet::from([UserView, UserBlacklist, UserBan, RoomView]),
        );
        grants.insert(
            Role::Operator,
            BTreeSet::from([OpsPublish, OpsRollback, OpsConfig, OpsMonitor]),
        );

        Self { grants }
    }

    /// Build a custom table, enforcing totality, non-empty grants and a
    /// complete `super_admin`.
    ///
    /// # Errors
    /// Returns the first violated invariant.
    pub fn from_grants(
        grants: impl IntoIterator<Item = (Role, BTreeSet<Permission>)>,
    ) -> Result<Self, RbacError> {
        let map = Self {
            grants: grants.into_iter().collect(),
        };
        map.validate()?;
        Ok(map)
    }

    /// Check the table invariants.
    ///
    /// # Errors
    /// Returns the first violated invariant.
    pub fn validate(&self) -> Result<(), RbacError> {
        for role in Role::ALL {
            let granted = self.grants.get(&role).ok_or(RbacError::MissingRole(role))?;
            if granted.is_empty() {
                return Err(RbacError::EmptyGrant(role));
            }
        }

        let super_grants = self
            .grants
            .get(&Role::SuperAdmin)
            .ok_or(RbacError::MissingRole(Role::SuperAdmin))?;
        if let Some(missing) = Permission::ALL
            .iter()
            .find(|permission| !super_grants.contains(permission))
        {
            return Err(RbacError::SuperAdminIncomplete(*missing));
        }

        Ok(())
    }

    /// Permissions granted directly to one role.
    #[must_use]
    pub fn permissions_for(&self, role: Role) -> BTreeSet<Permission> {
        self.grants.get(&role).cloned().unwrap_or_default()
    }

    /// Union of the grants of every held role.
    pub fn effective_permissions<'a>(
        &self,
        roles: impl IntoIterator<Item = &'a Role>,
    ) -> BTreeSet<Permission> {
        roles
            .into_iter()
            .filter_map(|role| self.grants.get(role))
            .flatten()
            .copied()
            .collect()
    }

    /// Membership test over the union of the held roles' grants. An empty role
    /// set holds nothing.
    pub fn has_permission<'a>(
        &self,
        roles: impl IntoIterator<Item = &'a Role>,
        permission: Permission,
    ) -> bool {
        roles.into_iter().any(|role| {
            self.grants
                .get(role)
                .is_some_and(|granted| granted.contains(&permission))
        })
    }
}

impl Default for RolePermissionMap {
    fn default() -> Self {
        Self::standard()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_table_is_valid() {
        assert_eq!(RolePermissionMap::standard().validate(), Ok(()));
    }

    #[test]
    fn super_admin_passes_every_check() {
        let map = RolePermissionMap::standard();
        for permission in Permission::ALL {
            assert!(map.has_permission(&[Role::SuperAdmin], permission));
        }
    }

    #[test]
    fn roles_without_finance_grants_fail_finance_checks() {
        let map = RolePermissionMap::standard();
        let finance = Permission::ALL
            .into_iter()
            .filter(|permission| permission.domain() == Domain::Finance);
        for permission in finance {
            for role in [Role::Admin, Role::Support, Role::Operator] {
                assert!(!map.has_permission(&[role], permission), "{role} {permission}");
            }
            assert!(map.has_permission(&[Role::Finance], permission));
        }
    }

    #[test]
    fn empty_role_set_holds_nothing() {
        let map = RolePermissionMap::standard();
        let none: [Role; 0] = [];
        for permission in Permission::ALL {
            assert!(!map.has_permission(&none, permission));
        }
        assert!(map.effective_permissions(&none).is_empty());
    }

    #[test]
    fn adding_a_role_never_removes_a_permission() {
        let map = RolePermissionMap::standard();
        for base in Role::ALL {
            let before = map.effective_permissions(&[base]);
            for extra in Role::ALL {
                let after = map.effective_permissions(&[base, extra]);
                assert!(before.is_subset(&after), "{base} + {extra}");
                for permission in &before {
                    assert!(map.has_permission(&[base, extra], *permission));
                }
            }
        }
    }

    #[test]
    fn union_combines_disjoint_roles() {
        let map = RolePermissionMap::standard();
        let roles = [Role::Support, Role::Operator];
        assert!(map.has_permission(&roles, Permission::UserBlacklist));
        assert!(map.has_permission(&roles, Permission::OpsMonitor));
        assert!(!map.has_permission(&roles, Permission::FinanceView));
    }

    #[test]
    fn from_grants_rejects_broken_tables() {
        let missing = RolePermissionMap::from_grants([(
            Role::SuperAdmin,
            Permission::ALL.into_iter().collect(),
        )]);
        assert_eq!(missing, Err(RbacError::MissingRole(Role::Admin)));

        let mut grants: Vec<(Role, BTreeSet<Permission>)> = Role::ALL
            .into_iter()
            .map(|role| (role, BTreeSet::from([Permission::UserView])))
            .collect();
        grants[0].1 = Permission::ALL.into_iter().collect();
        assert!(RolePermissionMap::from_grants(grants.clone()).is_ok());

        grants[2].1.clear();
        assert_eq!(
            RolePermissionMap::from_grants(grants.clone()),
            Err(RbacError::EmptyGrant(grants[2].0))
        );

        grants[2].1.insert(Permission::UserView);
        grants[0].1.remove(&Permission::OpsMonitor);
        assert_eq!(
            RolePermissionMap::from_grants(grants),
            Err(RbacError::SuperAdminIncomplete(Permission::OpsMonitor))
        );
    }
}
