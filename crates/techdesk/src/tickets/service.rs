use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};

use super::dashboard::DashboardSummary;
use super::domain::{NewTicketRequest, Ticket, TicketEdit};
use super::export::{write_tickets_csv, ExportError, ExportRange};
use super::lifecycle::{Lifecycle, LifecyclePolicy, Transition, TransitionError};
use super::view::{ReferenceIndex, TicketView};
use super::visibility::{
    ArchiveFilter, FilterOptions, Page, PageRequest, TicketQuery, VisibilityEngine,
    VisibilityScope,
};
use crate::identity::{Identity, Role, UserSummary};
use crate::ids::{CategoryId, TicketId, UserId};
use crate::notifications::{NotificationEvent, NotificationSender, TicketNotice};
use crate::store::{HelpdeskStore, StoreError};
use crate::taxonomy::SubCategoryOption;
use crate::validation::FieldErrors;

pub const DEFAULT_NUMBER_ATTEMPTS: u32 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TicketServiceConfig {
    pub policy: LifecyclePolicy,
    /// How many times a write retries after losing a race: a ticket number taken by
    /// another creation, or a ticket changed between read and write.
    pub number_attempts: u32,
}

impl Default for TicketServiceConfig {
    fn default() -> Self {
        Self {
            policy: LifecyclePolicy::default(),
            number_attempts: DEFAULT_NUMBER_ATTEMPTS,
        }
    }
}

/// Service composing the visibility engine, the lifecycle engine, storage, and
/// notification dispatch. Every operation takes the acting identity explicitly.
pub struct TicketService<S, N> {
    store: Arc<S>,
    notifier: Arc<N>,
    lifecycle: Lifecycle,
    number_attempts: u32,
}

impl<S, N> TicketService<S, N>
where
    S: HelpdeskStore + 'static,
    N: NotificationSender + 'static,
{
    pub fn new(store: Arc<S>, notifier: Arc<N>, config: TicketServiceConfig) -> Self {
        Self {
            store,
            notifier,
            lifecycle: Lifecycle::new(config.policy),
            number_attempts: config.number_attempts.max(1),
        }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn policy(&self) -> &LifecyclePolicy {
        self.lifecycle.policy()
    }

    /// Validates the request, allocates the next number and stores the Open ticket.
    pub fn create(
        &self,
        actor: &Identity,
        request: NewTicketRequest,
    ) -> Result<TicketView, TicketServiceError> {
        let refs = self.references()?;
        let draft = self.lifecycle.draft(actor, &request, &refs)?;
        let submitted_at = Utc::now();

        for attempt in 1..=self.number_attempts {
            let inserted = self.store.insert_numbered(&mut |number| {
                Ticket::open(number, &draft, actor.user_id, submitted_at)
            });
            match inserted {
                Ok(ticket) => {
                    info!(
                        ticket = %ticket.number,
                        user = %actor.username,
                        centre = %refs.centre_name(ticket.centre),
                        "ticket created"
                    );
                    self.notify(NotificationEvent::TicketCreated, &ticket, actor, &refs);
                    return Ok(refs.view(&ticket, Utc::now()));
                }
                Err(StoreError::NumberTaken(number)) => {
                    warn!(attempt, %number, "ticket number already taken; retrying");
                }
                Err(other) => return Err(other.into()),
            }
        }

        warn!(attempts = self.number_attempts, "gave up allocating a ticket number");
        Err(TicketServiceError::Concurrency)
    }

    pub fn list(
        &self,
        actor: &Identity,
        query: &TicketQuery,
        page: PageRequest,
    ) -> Result<Page<TicketView>, TicketServiceError> {
        let refs = self.references()?;
        let selected = VisibilityEngine::new(&refs).select(actor, self.store.tickets()?, query);
        let now = Utc::now();
        Ok(Page::slice(selected, page).map(|ticket| refs.view(&ticket, now)))
    }

    pub fn get(&self, actor: &Identity, id: TicketId) -> Result<TicketView, TicketServiceError> {
        let (ticket, refs) = self.authorize(actor, id)?;
        Ok(refs.view(&ticket, Utc::now()))
    }

    pub fn start_progress(
        &self,
        actor: &Identity,
        id: TicketId,
    ) -> Result<TicketView, TicketServiceError> {
        self.mutate(actor, id, |ticket, _| {
            Ok(self.lifecycle.start_progress(actor, ticket)?)
        })
    }

    pub fn assign(
        &self,
        actor: &Identity,
        id: TicketId,
        technician: UserId,
    ) -> Result<TicketView, TicketServiceError> {
        self.mutate(actor, id, |ticket, refs| {
            let assignee = refs.user(technician).ok_or_else(|| {
                TicketServiceError::Validation(FieldErrors::single(
                    "technician",
                    "select a valid technician",
                ))
            })?;
            Ok(self.lifecycle.assign(actor, ticket, assignee)?)
        })
    }

    pub fn resolve(
        &self,
        actor: &Identity,
        id: TicketId,
        notes: &str,
    ) -> Result<TicketView, TicketServiceError> {
        self.mutate(actor, id, |ticket, _| {
            Ok(self.lifecycle.resolve(actor, ticket, notes, Utc::now())?)
        })
    }

    pub fn archive(&self, actor: &Identity, id: TicketId) -> Result<TicketView, TicketServiceError> {
        self.mutate(actor, id, |ticket, _| {
            Ok(self.lifecycle.archive(actor, ticket, Utc::now())?)
        })
    }

    pub fn unarchive(
        &self,
        actor: &Identity,
        id: TicketId,
    ) -> Result<TicketView, TicketServiceError> {
        self.mutate(actor, id, |ticket, _| Ok(self.lifecycle.unarchive(actor, ticket)?))
    }

    pub fn edit(
        &self,
        actor: &Identity,
        id: TicketId,
        edit: &TicketEdit,
    ) -> Result<TicketView, TicketServiceError> {
        self.mutate(actor, id, |ticket, _| Ok(self.lifecycle.edit(actor, ticket, edit)?))
    }

    pub fn dashboard(
        &self,
        actor: &Identity,
        query: &TicketQuery,
    ) -> Result<DashboardSummary, TicketServiceError> {
        let refs = self.references()?;
        let engine = VisibilityEngine::new(&refs);
        let selected = engine.select(actor, self.store.tickets()?, query);
        Ok(DashboardSummary::build(
            &selected,
            &refs,
            engine.filter_options(actor),
            Utc::now(),
        ))
    }

    pub fn filter_options(&self, actor: &Identity) -> Result<FilterOptions, TicketServiceError> {
        let refs = self.references()?;
        Ok(VisibilityEngine::new(&refs).filter_options(actor))
    }

    /// CSV of every ticket the identity can see that was submitted inside `range`,
    /// archived ones included, in ascending number order.
    pub fn export_csv(
        &self,
        actor: &Identity,
        range: ExportRange,
    ) -> Result<Vec<u8>, TicketServiceError> {
        let refs = self.references()?;
        let query = TicketQuery {
            archive: ArchiveFilter::All,
            ..TicketQuery::default()
        };
        let mut tickets: Vec<Ticket> = VisibilityEngine::new(&refs)
            .select(actor, self.store.tickets()?, &query)
            .into_iter()
            .filter(|ticket| range.contains(ticket.submitted_at))
            .collect();
        tickets.sort_by_key(|ticket| ticket.number);

        let mut buffer = Vec::new();
        let rows = write_tickets_csv(&mut buffer, &tickets, &refs)?;
        info!(user = %actor.username, rows, from = %range.from, to = %range.to, "tickets exported");
        Ok(buffer)
    }

    /// Subcategory options for a raw category identifier. Unknown or malformed
    /// identifiers produce an empty list.
    pub fn subcategories_for(&self, raw_category: &str) -> Vec<SubCategoryOption> {
        let Some(category) = CategoryId::parse(raw_category) else {
            return Vec::new();
        };
        match self.store.subcategories_of(category) {
            Ok(subcategories) => subcategories.iter().map(SubCategoryOption::from).collect(),
            Err(error) => {
                warn!(%error, "subcategory lookup failed");
                Vec::new()
            }
        }
    }

    /// Candidate assignees, for identities that work tickets.
    pub fn technicians(&self, actor: &Identity) -> Result<Vec<UserSummary>, TicketServiceError> {
        if !actor.role.works_tickets() {
            return Err(TicketServiceError::NotAuthorized);
        }
        Ok(self
            .store
            .users()?
            .iter()
            .filter(|user| user.role == Role::Technician)
            .map(|user| user.summary())
            .collect())
    }

    fn references(&self) -> Result<ReferenceIndex, TicketServiceError> {
        Ok(ReferenceIndex::load(self.store.as_ref())?)
    }

    /// Loads a ticket the identity may act on. Scoped identities cannot tell a missing
    /// ticket from one outside their scope.
    fn authorize(
        &self,
        actor: &Identity,
        id: TicketId,
    ) -> Result<(Ticket, ReferenceIndex), TicketServiceError> {
        let refs = self.references()?;
        let scope = VisibilityScope::for_identity(actor);
        match self.store.ticket(id)? {
            Some(ticket) if scope.admits(&ticket, &refs) => Ok((ticket, refs)),
            Some(ticket) => {
                debug!(user = %actor.username, ticket = %ticket.number, "ticket outside scope");
                Err(TicketServiceError::NotAuthorized)
            }
            None => Err(TicketServiceError::missing_ticket(actor)),
        }
    }

    /// Read, transition, write. A write that lost a race with another mutation is
    /// retried against the fresh ticket, so guards always see the committed state.
    fn mutate<F>(
        &self,
        actor: &Identity,
        id: TicketId,
        compute: F,
    ) -> Result<TicketView, TicketServiceError>
    where
        F: Fn(&Ticket, &ReferenceIndex) -> Result<Transition, TicketServiceError>,
    {
        for attempt in 1..=self.number_attempts {
            let (ticket, refs) = self.authorize(actor, id)?;
            let Transition { ticket, events } = compute(&ticket, &refs)?;
            let stored = match self.store.update_ticket(ticket) {
                Ok(stored) => stored,
                Err(StoreError::StaleWrite { expected, stored, .. }) => {
                    warn!(attempt, expected, stored, "ticket changed concurrently; retrying");
                    continue;
                }
                Err(other) => return Err(other.into()),
            };

            info!(
                ticket = %stored.number,
                status = %stored.status,
                user = %actor.username,
                "ticket updated"
            );
            for event in events {
                self.notify(event, &stored, actor, &refs);
            }
            return Ok(refs.view(&stored, Utc::now()));
        }

        warn!(attempts = self.number_attempts, %id, "gave up writing a contended ticket");
        Err(TicketServiceError::Concurrency)
    }

    /// Notification failures are logged and never undo the committed write.
    fn notify(
        &self,
        event: NotificationEvent,
        ticket: &Ticket,
        actor: &Identity,
        refs: &ReferenceIndex,
    ) {
        let notice = TicketNotice {
            event,
            ticket_number: ticket.number,
            centre: refs.centre_name(ticket.centre),
            title: ticket.title.clone(),
            category: refs.category_name(ticket.category),
            subcategory: refs.subcategory_name(ticket.subcategory),
            priority: ticket.priority,
            status: ticket.status,
            assigned_to: ticket.assigned_to.map(|id| refs.username(id)),
            actor: actor.username.clone(),
            submitter: refs.username(ticket.submitted_by),
            recipient: refs
                .user(ticket.submitted_by)
                .and_then(|user| user.email.clone()),
        };
        if let Err(error) = self.notifier.notify(&notice) {
            warn!(%error, event = %event, ticket = %ticket.number, "notification dispatch failed");
        }
    }
}

/// Error raised by the ticket service.
#[derive(Debug, thiserror::Error)]
pub enum TicketServiceError {
    #[error(transparent)]
    Validation(FieldErrors),
    #[error("you are not authorized to perform this action")]
    NotAuthorized,
    #[error("ticket not found")]
    NotFound,
    #[error("{0}")]
    ReferentialIntegrity(String),
    #[error("the ticket could not be saved, please try again")]
    Concurrency,
    #[error(transparent)]
    Transition(TransitionError),
    #[error(transparent)]
    Store(StoreError),
    #[error(transparent)]
    Export(#[from] ExportError),
}

impl TicketServiceError {
    /// The rejection for a ticket that does not exist, as seen by `actor`.
    pub fn missing_ticket(actor: &Identity) -> Self {
        if VisibilityScope::for_identity(actor).is_unrestricted() {
            TicketServiceError::NotFound
        } else {
            TicketServiceError::NotAuthorized
        }
    }
}

impl From<FieldErrors> for TicketServiceError {
    fn from(errors: FieldErrors) -> Self {
        TicketServiceError::Validation(errors)
    }
}

impl From<TransitionError> for TicketServiceError {
    fn from(error: TransitionError) -> Self {
        match error {
            TransitionError::Forbidden { .. } => TicketServiceError::NotAuthorized,
            TransitionError::Invalid(errors) => TicketServiceError::Validation(errors),
            other => TicketServiceError::Transition(other),
        }
    }
}

impl From<StoreError> for TicketServiceError {
    fn from(error: StoreError) -> Self {
        match error {
            StoreError::ReferentialIntegrity { .. } => {
                TicketServiceError::ReferentialIntegrity(error.to_string())
            }
            StoreError::NumberTaken(_) | StoreError::StaleWrite { .. } => {
                TicketServiceError::Concurrency
            }
            other => TicketServiceError::Store(other),
        }
    }
}
