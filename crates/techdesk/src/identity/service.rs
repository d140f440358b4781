use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tracing::{debug, info};

use super::password::{
    hash_password, verify_account_password, PasswordError, PasswordPolicy,
};
use super::role::Role;
use super::session::SessionRegistry;
use super::user::{Identity, NewUser, User, UserRepository, USERNAME_MAX_CHARS};
use crate::directory::DirectoryRepository;
use crate::ids::UserId;
use crate::store::StoreError;
use crate::validation::FieldErrors;

const SUPER_ADMIN_TAKEN: &str = "a super administrator already exists";

/// Registration, credential checks, and session tokens.
pub struct IdentityService<S> {
    store: Arc<S>,
    policy: PasswordPolicy,
    sessions: SessionRegistry,
}

/// Token handed back on login together with the identity it resolves to.
#[derive(Debug, Clone, Serialize)]
pub struct Session {
    pub token: String,
    pub identity: Identity,
}

impl<S> IdentityService<S>
where
    S: UserRepository + DirectoryRepository + 'static,
{
    pub fn new(store: Arc<S>) -> Self {
        Self::with_policy(store, PasswordPolicy::default())
    }

    pub fn with_policy(store: Arc<S>, policy: PasswordPolicy) -> Self {
        Self {
            store,
            policy,
            sessions: SessionRegistry::default(),
        }
    }

    pub fn register(&self, new_user: NewUser) -> Result<User, IdentityError> {
        let mut errors = FieldErrors::default();

        let username = errors.require("username", &new_user.username, USERNAME_MAX_CHARS);
        if username
            .chars()
            .any(|c| !(c.is_alphanumeric() || "@.+-_".contains(c)))
        {
            errors.push(
                "username",
                "usernames may contain only letters, digits and @/./+/-/_",
            );
        }

        let email = new_user
            .email
            .as_deref()
            .map(str::trim)
            .filter(|email| !email.is_empty())
            .map(str::to_string);
        if let Some(email) = &email {
            if !email.contains('@') {
                errors.push("email", "enter a valid email address");
            }
        }

        for message in self.policy.violations(&new_user.password) {
            errors.push("password", message);
        }

        let candidate = User {
            id: UserId::new(),
            username,
            email,
            role: new_user.role,
            country: new_user.country,
            region: new_user.region,
            centres: new_user.centres,
            password_hash: String::new(),
            created_at: Utc::now(),
        };

        if let Err(affiliation) = candidate.check_affiliation() {
            for error in affiliation.errors() {
                errors.push(error.field, error.message.clone());
            }
        }
        self.check_references(&candidate, &mut errors)?;

        if candidate.role == Role::SuperAdmin
            && self
                .store
                .users()?
                .iter()
                .any(|user| user.role == Role::SuperAdmin)
        {
            errors.push("role", SUPER_ADMIN_TAKEN);
        }

        errors.into_result()?;

        let user = User {
            password_hash: hash_password(&new_user.password)?,
            ..candidate
        };

        let stored = match self.store.insert_user(user) {
            Ok(stored) => stored,
            Err(StoreError::Conflict { .. }) => {
                return Err(FieldErrors::single(
                    "username",
                    "a user with that username already exists",
                )
                .into())
            }
            Err(StoreError::SoleRoleTaken { .. }) => {
                return Err(FieldErrors::single("role", SUPER_ADMIN_TAKEN).into())
            }
            Err(other) => return Err(other.into()),
        };

        info!(user = %stored.username, role = %stored.role, "user registered");
        Ok(stored)
    }

    /// Saves edits to an existing account. The stored password hash and creation time
    /// are kept; the same affiliation rules as registration apply.
    pub fn save_user(&self, user: User) -> Result<User, IdentityError> {
        let current = self
            .store
            .user(user.id)?
            .ok_or(StoreError::NotFound { entity: "user" })?;

        let mut errors = FieldErrors::default();
        let username = errors.require("username", &user.username, USERNAME_MAX_CHARS);
        let candidate = User {
            username,
            password_hash: current.password_hash,
            created_at: current.created_at,
            ..user
        };

        if let Err(affiliation) = candidate.check_affiliation() {
            for error in affiliation.errors() {
                errors.push(error.field, error.message.clone());
            }
        }
        self.check_references(&candidate, &mut errors)?;

        if candidate.role == Role::SuperAdmin
            && self
                .store
                .users()?
                .iter()
                .any(|other| other.id != candidate.id && other.role == Role::SuperAdmin)
        {
            errors.push("role", SUPER_ADMIN_TAKEN);
        }

        errors.into_result()?;

        let stored = match self.store.update_user(candidate) {
            Ok(stored) => stored,
            Err(StoreError::Conflict { .. }) => {
                return Err(FieldErrors::single(
                    "username",
                    "a user with that username already exists",
                )
                .into())
            }
            Err(StoreError::SoleRoleTaken { .. }) => {
                return Err(FieldErrors::single("role", SUPER_ADMIN_TAKEN).into())
            }
            Err(other) => return Err(other.into()),
        };

        info!(user = %stored.username, role = %stored.role, "user updated");
        Ok(stored)
    }

    fn check_references(&self, user: &User, errors: &mut FieldErrors) -> Result<(), StoreError> {
        if let Some(country) = user.country {
            if self.store.country(country)?.is_none() {
                errors.push("country", "select a valid country");
            }
        }
        if let Some(region) = user.region {
            if self.store.region(region)?.is_none() {
                errors.push("region", "select a valid region");
            }
        }
        for centre in &user.centres {
            if self.store.centre(*centre)?.is_none() {
                errors.push("centres", format!("centre {centre} does not exist"));
            }
        }
        Ok(())
    }

    /// The error and the argon2 work are the same whether the username or the secret
    /// was wrong.
    pub fn authenticate(&self, username: &str, secret: &str) -> Result<Identity, IdentityError> {
        let user = self.store.user_by_username(username.trim())?;
        let stored_hash = user.as_ref().map(|user| user.password_hash.as_str());
        if verify_account_password(secret, stored_hash) {
            if let Some(user) = &user {
                return Ok(Identity::from_user(user));
            }
        }
        debug!("rejected login attempt");
        Err(IdentityError::InvalidCredentials)
    }

    pub fn login(&self, username: &str, secret: &str) -> Result<Session, IdentityError> {
        let identity = self.authenticate(username, secret)?;
        Ok(self.open_session(identity))
    }

    /// Issues a bearer token for an identity that has already been authenticated.
    pub fn open_session(&self, identity: Identity) -> Session {
        let token = self.sessions.issue(identity.user_id);
        info!(user = %identity.username, "session opened");
        Session { token, identity }
    }

    pub fn logout(&self, token: &str) -> bool {
        self.sessions.revoke(token)
    }

    /// Resolves a bearer token; the identity is rebuilt from storage on every call so
    /// role and scope changes take effect immediately.
    pub fn identity_for_token(&self, token: &str) -> Result<Identity, IdentityError> {
        let user_id = self
            .sessions
            .resolve(token)
            .ok_or(IdentityError::UnknownSession)?;
        self.identity_for(user_id)
    }

    pub fn identity_for(&self, user_id: UserId) -> Result<Identity, IdentityError> {
        let user = self
            .store
            .user(user_id)?
            .ok_or(IdentityError::UnknownSession)?;
        Ok(Identity::from_user(&user))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum IdentityError {
    #[error(transparent)]
    Validation(#[from] FieldErrors),
    #[error("invalid username or password")]
    InvalidCredentials,
    #[error("session is unknown or has expired")]
    UnknownSession,
    #[error(transparent)]
    Password(#[from] PasswordError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use super::*;
    use crate::seed::seed_reference_data;
    use crate::store::InMemoryStore;

    fn service() -> (IdentityService<InMemoryStore>, crate::seed::SeedCatalog) {
        let store = Arc::new(InMemoryStore::new());
        let catalog = seed_reference_data(store.as_ref()).expect("reference data");
        (IdentityService::new(store), catalog)
    }

    fn new_user(username: &str, role: Role) -> NewUser {
        NewUser {
            username: username.to_string(),
            email: None,
            password: "Helpdesk2024".to_string(),
            role,
            country: None,
            region: None,
            centres: BTreeSet::new(),
        }
    }

    #[test]
    fn only_one_super_admin_may_exist() {
        let (identity, _) = service();
        identity
            .store
            .insert_user(User {
                id: UserId::new(),
                username: "root".to_string(),
                email: None,
                role: Role::SuperAdmin,
                country: None,
                region: None,
                centres: BTreeSet::new(),
                password_hash: String::new(),
                created_at: Utc::now(),
            })
            .expect("first super admin");

        match identity.register(new_user("second", Role::SuperAdmin)) {
            Err(IdentityError::Validation(errors)) => assert!(errors.has("role")),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn registration_collects_affiliation_and_password_problems() {
        let (identity, _) = service();
        let mut request = new_user("bad name!", Role::Manager);
        request.password = "short".to_string();

        match identity.register(request) {
            Err(IdentityError::Validation(errors)) => {
                let fields: Vec<&str> = errors.by_field().into_keys().collect();
                assert_eq!(fields, vec!["country", "password", "region", "username"]);
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn credentials_fail_the_same_way_for_unknown_users_and_bad_secrets() {
        let (identity, catalog) = service();
        let mut request = new_user("mwila", Role::User);
        request.centres = [catalog.centre("Lumezi Primary").expect("centre")]
            .into_iter()
            .collect();
        identity.register(request).expect("registered");

        let unknown = identity.authenticate("nobody", "Helpdesk2024");
        let wrong = identity.authenticate("mwila", "Helpdesk2025");
        assert!(matches!(unknown, Err(IdentityError::InvalidCredentials)));
        assert!(matches!(wrong, Err(IdentityError::InvalidCredentials)));

        let session = identity.login(" mwila ", "Helpdesk2024").expect("login");
        assert_eq!(session.identity.role, Role::User);
        assert_eq!(session.identity.scope.centres.len(), 1);
        assert!(identity.identity_for_token(&session.token).is_ok());
        assert!(identity.logout(&session.token));
        assert!(matches!(
            identity.identity_for_token(&session.token),
            Err(IdentityError::UnknownSession)
        ));
    }

    #[test]
    fn saving_a_user_without_centres_is_refused() {
        let (identity, catalog) = service();
        let mut request = new_user("chipo", Role::User);
        request.centres = [catalog.centre("Lumezi Primary").expect("centre")]
            .into_iter()
            .collect();
        let stored = identity.register(request).expect("registered");

        let emptied = User {
            centres: BTreeSet::new(),
            ..stored.clone()
        };
        match identity.save_user(emptied) {
            Err(IdentityError::Validation(errors)) => assert!(errors.has("centres")),
            other => panic!("unexpected result: {other:?}"),
        }

        let renamed = User {
            email: Some("chipo@example.org".to_string()),
            password_hash: String::new(),
            ..stored.clone()
        };
        let saved = identity.save_user(renamed).expect("saved");
        assert_eq!(saved.email.as_deref(), Some("chipo@example.org"));
        assert_eq!(saved.password_hash, stored.password_hash);
    }
}
