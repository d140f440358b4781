//! Who is acting, what role they hold, and which slice of the hierarchy they belong to.

mod password;
mod role;
mod service;
mod session;
mod user;

pub use password::{
    hash_password, verify_account_password, verify_password, PasswordError, PasswordPolicy,
};
pub use role::{Role, RoleParseError};
pub use service::{IdentityError, IdentityService, Session};
pub use session::SessionRegistry;
pub use user::{Identity, NewUser, Scope, User, UserRepository, UserSummary, USERNAME_MAX_CHARS};

pub use crate::ids::UserId;
