//! Tickets: numbering, role-scoped visibility, the lifecycle state machine, dashboard
//! aggregates, CSV export, and the HTTP router over them.

pub mod dashboard;
pub mod domain;
pub mod export;
pub mod lifecycle;
pub mod repository;
pub mod router;
pub mod service;
pub mod view;
pub mod visibility;

#[cfg(test)]
mod tests;

pub use dashboard::{CountEntry, DashboardSummary};
pub use domain::{
    derive_title, FieldLimits, NewTicketRequest, Priority, Ticket, TicketDraft, TicketEdit,
    TicketNumber, TicketStatus,
};
pub use export::{write_tickets_csv, ExportError, ExportRange, EXPORT_HEADERS};
pub use lifecycle::{CreationPolicy, Lifecycle, LifecyclePolicy, Transition, TransitionError};
pub use repository::TicketRepository;
pub use router::{helpdesk_router, ApiError, HelpdeskState};
pub use service::{TicketService, TicketServiceConfig, TicketServiceError};
pub use view::{ReferenceIndex, TicketLocation, TicketView};
pub use visibility::{
    ArchiveFilter, FilterOption, FilterOptions, Page, PageRequest, TicketQuery, VisibilityEngine,
    VisibilityScope,
};
