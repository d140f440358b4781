use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

/// The five roles, ordered by privilege.
///
/// Rank answers "who outranks whom"; it says nothing about which tickets a role may see.
/// Visibility is role-specific and lives in the ticket visibility engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    SuperAdmin,
    Admin,
    Manager,
    Technician,
    User,
}

impl Role {
    pub const ALL: [Role; 5] = [
        Role::SuperAdmin,
        Role::Admin,
        Role::Manager,
        Role::Technician,
        Role::User,
    ];

    pub const fn rank(self) -> u8 {
        match self {
            Role::SuperAdmin => 4,
            Role::Admin => 3,
            Role::Manager => 2,
            Role::Technician => 1,
            Role::User => 0,
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            Role::SuperAdmin => "super_admin",
            Role::Admin => "admin",
            Role::Manager => "manager",
            Role::Technician => "technician",
            Role::User => "user",
        }
    }

    pub fn outranks(self, other: Role) -> bool {
        self.rank() > other.rank()
    }

    /// Roles allowed to start, assign, and resolve tickets.
    pub const fn works_tickets(self) -> bool {
        matches!(self, Role::SuperAdmin | Role::Admin | Role::Technician)
    }

    pub const fn archives_tickets(self) -> bool {
        matches!(self, Role::SuperAdmin | Role::Admin)
    }

    /// Admins and managers are scoped by a Country and a Region.
    pub const fn requires_geography(self) -> bool {
        matches!(self, Role::Admin | Role::Manager)
    }

    pub const fn requires_centres(self) -> bool {
        matches!(self, Role::User)
    }
}

impl PartialOrd for Role {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Role {
    fn cmp(&self, other: &Self) -> Ordering {
        self.rank().cmp(&other.rank())
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown role '{0}'")]
pub struct RoleParseError(pub String);

impl FromStr for Role {
    type Err = RoleParseError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().replace(['-', ' '], "_").as_str() {
            "super_admin" | "superadmin" => Ok(Role::SuperAdmin),
            "admin" => Ok(Role::Admin),
            "manager" => Ok(Role::Manager),
            "technician" => Ok(Role::Technician),
            "user" => Ok(Role::User),
            _ => Err(RoleParseError(value.to_string())),
        }
    }
}
