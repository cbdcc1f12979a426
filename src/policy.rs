//! Role-based access policy.
//!
//! Each role maps to a fixed permission mask. Masks are grouped into
//! services (three-bit and two-bit blocks); a service check passes if the
//! role holds any bit of the service, an operation check only if it holds
//! every bit of the operation.

use crate::error::{LibraryError, Result};
use crate::record::Role;
use std::ops::BitOr;

/// A set of permission bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Permission(u16);

impl Permission {
    // services
    pub const BOOK_SERVICE: Self = Permission(0x0007);
    pub const ACCOUNT_SERVICE: Self = Permission(0x0038);
    pub const LIBRARY_SERVICE: Self = Permission(0x00C0);
    pub const PROPERTY_SERVICE: Self = Permission(0x0300);
    pub const RECORD_SERVICE: Self = Permission(0x0C00);

    // book service
    pub const BORROW: Self = Permission(0x0001);
    pub const RETURN: Self = Permission(0x0002);
    pub const QUERY: Self = Permission(0x0004);

    // account service
    pub const REGISTER: Self = Permission(0x0008);
    pub const LOGIN: Self = Permission(0x0010);
    pub const CANCEL_ACCOUNT: Self = Permission(0x0020);

    // library service
    pub const ADD_BOOK: Self = Permission(0x0040);
    pub const MODIFY_BOOK: Self = Permission(0x0080);

    // property service
    pub const RECHARGE: Self = Permission(0x0100);
    pub const DEDUCT: Self = Permission(0x0200);

    // record service
    pub const NEW_RECORD: Self = Permission(0x0400);
    pub const WITHDRAW_RECORD: Self = Permission(0x0800);

    pub const NONE: Self = Permission(0);

    pub const fn bits(self) -> u16 {
        self.0
    }

    pub const fn union(self, other: Self) -> Self {
        Permission(self.0 | other.0)
    }

    /// Every bit of `other` is set in `self`.
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// At least one bit of `other` is set in `self`.
    pub const fn intersects(self, other: Self) -> bool {
        self.0 & other.0 != 0
    }

    fn label(self) -> &'static str {
        match self.0 {
            0x0001 => "Borrowing books",
            0x0002 => "Returning books",
            0x0004 => "Searching books",
            0x0008 => "Registering accounts",
            0x0010 => "Logging in",
            0x0020 => "Cancelling accounts",
            0x0040 => "Adding books",
            0x0080 => "Modifying books",
            0x0100 => "Recharging",
            0x0200 => "Deducting balances",
            0x0400 => "Creating borrow records",
            0x0800 => "Withdrawing borrow records",
            0x0007 => "The book service",
            0x0038 => "The account service",
            0x00C0 => "The library management service",
            0x0300 => "The property service",
            0x0C00 => "The record service",
            _ => "This operation",
        }
    }
}

impl BitOr for Permission {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self::Output {
        self.union(rhs)
    }
}

const REGULAR_ACCESS: Permission = Permission::BOOK_SERVICE
    .union(Permission::ACCOUNT_SERVICE)
    .union(Permission::RECHARGE);

const MANAGER_ACCESS: Permission = Permission::QUERY
    .union(Permission::LIBRARY_SERVICE)
    .union(Permission::RECORD_SERVICE);

const ADMIN_ACCESS: Permission = Permission::BOOK_SERVICE
    .union(Permission::ACCOUNT_SERVICE)
    .union(Permission::LIBRARY_SERVICE)
    .union(Permission::PROPERTY_SERVICE)
    .union(Permission::RECORD_SERVICE);

/// Permission mask granted to `role`.
pub fn granted(role: Role) -> Permission {
    match role {
        Role::Regular => REGULAR_ACCESS,
        Role::Manager => MANAGER_ACCESS,
        Role::Admin => ADMIN_ACCESS,
    }
}

/// Coarse gate: `role` holds any bit of `service`.
pub fn requires_service(role: Role, service: Permission) -> bool {
    granted(role).intersects(service)
}

/// Fine gate: `role` holds every bit of `op`.
pub fn check_access(role: Role, op: Permission) -> bool {
    granted(role).contains(op)
}

/// [`requires_service`], reported as `PermissionDenied` on refusal.
pub fn ensure_service(role: Role, service: Permission) -> Result<()> {
    if requires_service(role, service) {
        Ok(())
    } else {
        Err(denied(role, service.label()))
    }
}

/// [`check_access`], reported as `PermissionDenied` on refusal.
pub fn ensure_access(role: Role, op: Permission) -> Result<()> {
    if check_access(role, op) {
        Ok(())
    } else {
        Err(denied(role, op.label()))
    }
}

/// Account administration (listing, password reset, removing or charging
/// other accounts) is reserved to administrators.
pub fn ensure_account_admin(role: Role) -> Result<()> {
    if role == Role::Admin {
        Ok(())
    } else {
        Err(denied(role, "Account administration"))
    }
}

fn denied(role: Role, operation: &str) -> LibraryError {
    LibraryError::PermissionDenied {
        role: role.to_string(),
        operation: operation.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_services_partition_all_operations() {
        let services = [
            Permission::BOOK_SERVICE,
            Permission::ACCOUNT_SERVICE,
            Permission::LIBRARY_SERVICE,
            Permission::PROPERTY_SERVICE,
            Permission::RECORD_SERVICE,
        ];
        let all = services.iter().fold(Permission::NONE, |acc, s| acc | *s);
        assert_eq!(all.bits(), 0x0FFF);
        for (i, a) in services.iter().enumerate() {
            for b in &services[i + 1..] {
                assert!(!a.intersects(*b));
            }
        }
    }

    #[test]
    fn test_regular_user_grants() {
        let role = Role::Regular;
        assert!(check_access(role, Permission::BORROW));
        assert!(check_access(role, Permission::RETURN));
        assert!(check_access(role, Permission::QUERY));
        assert!(check_access(role, Permission::REGISTER));
        assert!(check_access(role, Permission::LOGIN));
        assert!(check_access(role, Permission::RECHARGE));

        assert!(!check_access(role, Permission::ADD_BOOK));
        assert!(!check_access(role, Permission::DEDUCT));
        assert!(!check_access(role, Permission::WITHDRAW_RECORD));
        assert!(!requires_service(role, Permission::LIBRARY_SERVICE));
        assert!(!requires_service(role, Permission::RECORD_SERVICE));
        assert!(requires_service(role, Permission::PROPERTY_SERVICE));
    }

    #[test]
    fn test_manager_grants() {
        let role = Role::Manager;
        assert!(check_access(role, Permission::QUERY));
        assert!(check_access(role, Permission::ADD_BOOK));
        assert!(check_access(role, Permission::MODIFY_BOOK));
        assert!(check_access(role, Permission::NEW_RECORD | Permission::WITHDRAW_RECORD));

        assert!(!check_access(role, Permission::BORROW));
        assert!(!check_access(role, Permission::RETURN));
        assert!(!check_access(role, Permission::RECHARGE));
        assert!(!requires_service(role, Permission::ACCOUNT_SERVICE));
        assert!(requires_service(role, Permission::BOOK_SERVICE));
    }

    #[test]
    fn test_admin_holds_every_service() {
        assert!(check_access(Role::Admin, Permission(0x0FFF)));
    }

    #[test]
    fn test_service_check_is_any_bit_operation_check_is_all_bits() {
        // regular users hold RECHARGE but not DEDUCT
        let property = Permission::PROPERTY_SERVICE;
        assert!(requires_service(Role::Regular, property));
        assert!(!check_access(Role::Regular, property));
    }

    #[test]
    fn test_refusals_are_permission_denied() {
        let err = ensure_access(Role::Manager, Permission::BORROW).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::PermissionDenied);
        assert_eq!(
            err.to_string(),
            "Borrowing books is not available to manager accounts"
        );

        let err = ensure_service(Role::Regular, Permission::LIBRARY_SERVICE).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::PermissionDenied);

        assert!(ensure_account_admin(Role::Manager).is_err());
        assert!(ensure_account_admin(Role::Admin).is_ok());
    }
}
