use std::ops::BitOr;

use serde::{Deserialize, Serialize};

/// Permission bitmask carried by a role.
///
/// Checks use AND semantics: a role satisfies a mask only when every
/// requested bit is set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Permission(u8);

impl Permission {
    pub const NONE: Permission = Permission(0x00);
    pub const FOLLOW: Permission = Permission(0x01);
    pub const COMMENT: Permission = Permission(0x02);
    pub const WRITE_ARTICLES: Permission = Permission(0x04);
    pub const MODERATE_COMMENTS: Permission = Permission(0x08);
    pub const ADMINISTER: Permission = Permission(0x80);
    /// Every bit, including the reserved ones.
    pub const ALL: Permission = Permission(0xff);

    pub const fn from_bits(bits: u8) -> Self {
        Self(bits)
    }

    pub const fn bits(self) -> u8 {
        self.0
    }

    /// True when all bits of `other` are set in `self`.
    pub const fn contains(self, other: Permission) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for Permission {
    type Output = Permission;

    fn bitor(self, rhs: Self) -> Self::Output {
        Permission(self.0 | rhs.0)
    }
}

/// A row of the fixed role table seeded at startup.
#[derive(Debug, Clone, Copy)]
pub struct RoleSeed {
    pub name: &'static str,
    pub permissions: Permission,
    pub default: bool,
}

const USER_PERMISSIONS: Permission = Permission(
    Permission::FOLLOW.bits() | Permission::COMMENT.bits() | Permission::WRITE_ARTICLES.bits(),
);

/// Roles upserted by name on every startup. Exactly one is the default.
pub const ROLES: &[RoleSeed] = &[
    RoleSeed {
        name: "User",
        permissions: USER_PERMISSIONS,
        default: true,
    },
    RoleSeed {
        name: "Moderator",
        permissions: Permission(USER_PERMISSIONS.bits() | Permission::MODERATE_COMMENTS.bits()),
        default: false,
    },
    RoleSeed {
        name: "Administrator",
        permissions: Permission::ALL,
        default: false,
    },
];
