//! Persistence contracts shared by the directory, taxonomy, identity and ticket modules.

mod memory;

pub use memory::InMemoryStore;

use crate::directory::DirectoryRepository;
use crate::identity::UserRepository;
use crate::taxonomy::TaxonomyRepository;
use crate::tickets::{TicketNumber, TicketRepository};

/// Error enumeration for repository failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("{entity} already exists: {detail}")]
    Conflict {
        entity: &'static str,
        detail: String,
    },
    #[error("{entity} not found")]
    NotFound { entity: &'static str },
    #[error("{entity} references a {parent} that does not exist")]
    MissingParent {
        entity: &'static str,
        parent: &'static str,
    },
    #[error("{entity} is still referenced by {dependents}")]
    ReferentialIntegrity {
        entity: &'static str,
        dependents: String,
    },
    #[error("only one {role} may exist")]
    SoleRoleTaken { role: &'static str },
    #[error("ticket number {0} is already taken")]
    NumberTaken(TicketNumber),
    #[error("{entity} changed since it was read (revision {expected}, stored {stored})")]
    StaleWrite {
        entity: &'static str,
        expected: u64,
        stored: u64,
    },
    #[error("{field} cannot change once a ticket exists")]
    ImmutableField { field: &'static str },
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Everything the ticket service needs from one backing store.
pub trait HelpdeskStore:
    DirectoryRepository + TaxonomyRepository + UserRepository + TicketRepository
{
}

impl<T> HelpdeskStore for T where
    T: DirectoryRepository + TaxonomyRepository + UserRepository + TicketRepository
{
}
