//! Channel role lattice.
//!
//! Roles form a strict total order: OWNER > ADMIN > OP > VOICE > MEMBER.
//! Moderation commands are gated on `has_role_at_least`.

use serde::{Deserialize, Serialize};

/// A member's role within one channel.
///
/// Declaration order is ascending so the derived `Ord` matches the lattice.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    #[default]
    Member,
    Voice,
    Op,
    Admin,
    Owner,
}

impl Role {
    /// Numeric rank, MEMBER(1) through OWNER(5).
    #[inline]
    pub fn rank(self) -> u8 {
        match self {
            Self::Member => 1,
            Self::Voice => 2,
            Self::Op => 3,
            Self::Admin => 4,
            Self::Owner => 5,
        }
    }

    /// Wire spelling ("OWNER", "ADMIN", ...).
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Member => "MEMBER",
            Self::Voice => "VOICE",
            Self::Op => "OP",
            Self::Admin => "ADMIN",
            Self::Owner => "OWNER",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// True when `role` is present and at least `min` on the lattice.
///
/// Absent or unknown membership never clears a role gate.
#[inline]
pub fn has_role_at_least(role: Option<Role>, min: Role) -> bool {
    role.is_some_and(|r| r >= min)
}

/// Map a role-changing command name to the role it grants.
///
/// `op` grants OP, `voice` grants VOICE; the `de`-prefixed forms demote back
/// to MEMBER. Unknown commands map to nothing.
pub fn role_from_mode(cmd: &str) -> Option<Role> {
    match cmd {
        "op" => Some(Role::Op),
        "deop" => Some(Role::Member),
        "voice" => Some(Role::Voice),
        "devoice" => Some(Role::Member),
        _ => None,
    }
}
