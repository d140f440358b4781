use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use super::role::Role;
use crate::ids::{CentreId, CountryId, RegionId, UserId};
use crate::store::StoreError;
use crate::validation::{FieldErrors, REQUIRED};

pub const USERNAME_MAX_CHARS: usize = 150;

/// Stored account. The password hash never leaves the process in serialized form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub username: String,
    pub email: Option<String>,
    pub role: Role,
    pub country: Option<CountryId>,
    pub region: Option<RegionId>,
    pub centres: BTreeSet<CentreId>,
    #[serde(skip_serializing, default)]
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
}

impl User {
    /// Role-dependent affiliation rules: a plain user needs at least one centre,
    /// admins and managers need both a country and a region.
    pub fn check_affiliation(&self) -> Result<(), FieldErrors> {
        let mut errors = FieldErrors::default();
        if self.role.requires_centres() && self.centres.is_empty() {
            errors.push("centres", "a user must belong to at least one centre");
        }
        if self.role.requires_geography() {
            if self.country.is_none() {
                errors.push("country", REQUIRED);
            }
            if self.region.is_none() {
                errors.push("region", REQUIRED);
            }
        }
        errors.into_result()
    }

    pub fn summary(&self) -> UserSummary {
        UserSummary {
            id: self.id,
            username: self.username.clone(),
            role: self.role,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserSummary {
    pub id: UserId,
    pub username: String,
    pub role: Role,
}

/// Registration payload.
#[derive(Debug, Clone, Deserialize)]
pub struct NewUser {
    pub username: String,
    #[serde(default)]
    pub email: Option<String>,
    pub password: String,
    pub role: Role,
    #[serde(default)]
    pub country: Option<CountryId>,
    #[serde(default)]
    pub region: Option<RegionId>,
    #[serde(default)]
    pub centres: BTreeSet<CentreId>,
}

/// The geographic slice an identity is attached to.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Scope {
    pub country: Option<CountryId>,
    pub region: Option<RegionId>,
    pub centres: BTreeSet<CentreId>,
}

/// An authenticated actor: the explicit argument every ticket operation takes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Identity {
    pub user_id: UserId,
    pub username: String,
    pub role: Role,
    pub scope: Scope,
}

impl Identity {
    pub fn from_user(user: &User) -> Self {
        let scope = match user.role {
            Role::Admin | Role::Manager => Scope {
                country: user.country,
                region: user.region,
                centres: BTreeSet::new(),
            },
            Role::User => Scope {
                country: None,
                region: None,
                centres: user.centres.clone(),
            },
            Role::SuperAdmin | Role::Technician => Scope::default(),
        };

        Self {
            user_id: user.id,
            username: user.username.clone(),
            role: user.role,
            scope,
        }
    }

    pub fn rank(&self) -> u8 {
        self.role.rank()
    }
}

/// Storage contract for accounts. Usernames are unique and every referenced
/// country, region, and centre must exist.
pub trait UserRepository: Send + Sync {
    fn insert_user(&self, user: User) -> Result<User, StoreError>;
    fn update_user(&self, user: User) -> Result<User, StoreError>;
    fn user(&self, id: UserId) -> Result<Option<User>, StoreError>;
    fn user_by_username(&self, username: &str) -> Result<Option<User>, StoreError>;
    fn users(&self) -> Result<Vec<User>, StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(role: Role) -> User {
        User {
            id: UserId::new(),
            username: "kapya".to_string(),
            email: None,
            role,
            country: None,
            region: None,
            centres: BTreeSet::new(),
            password_hash: String::new(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn plain_user_without_centre_is_rejected() {
        let errors = user(Role::User)
            .check_affiliation()
            .expect_err("centre required");
        assert!(errors.has("centres"));
    }

    #[test]
    fn manager_needs_country_and_region() {
        let mut manager = user(Role::Manager);
        let errors = manager.check_affiliation().expect_err("geography required");
        assert!(errors.has("country"));
        assert!(errors.has("region"));

        manager.country = Some(CountryId::new());
        manager.region = Some(RegionId::new());
        assert!(manager.check_affiliation().is_ok());
    }

    #[test]
    fn technician_identity_is_unscoped() {
        let mut technician = user(Role::Technician);
        technician.country = Some(CountryId::new());
        let identity = Identity::from_user(&technician);
        assert_eq!(identity.scope, Scope::default());
        assert_eq!(identity.rank(), 1);
    }

    #[test]
    fn user_identity_carries_only_centres() {
        let mut member = user(Role::User);
        let centre = CentreId::new();
        member.centres.insert(centre);
        member.region = Some(RegionId::new());

        let identity = Identity::from_user(&member);
        assert!(identity.scope.region.is_none());
        assert!(identity.scope.centres.contains(&centre));
    }
}
