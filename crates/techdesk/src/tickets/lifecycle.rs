//! Ticket state machine. Every transition is computed on a copy of the ticket, checked
//! for consistency, and handed back for a single repository write.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::domain::{FieldLimits, NewTicketRequest, Ticket, TicketDraft, TicketEdit, TicketStatus};
use super::view::ReferenceIndex;
use super::visibility::VisibilityScope;
use crate::identity::{Identity, Role, User};
use crate::notifications::NotificationEvent;
use crate::validation::{FieldErrors, REQUIRED};

/// Who may open tickets.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CreationPolicy {
    UserRoleOnly,
    #[default]
    AnyRole,
}

impl CreationPolicy {
    pub const fn key(self) -> &'static str {
        match self {
            CreationPolicy::UserRoleOnly => "user_role_only",
            CreationPolicy::AnyRole => "any_role",
        }
    }

    pub fn permits(self, role: Role) -> bool {
        match self {
            CreationPolicy::UserRoleOnly => role == Role::User,
            CreationPolicy::AnyRole => true,
        }
    }
}

impl fmt::Display for CreationPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl FromStr for CreationPolicy {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "user_role_only" => Ok(CreationPolicy::UserRoleOnly),
            "any_role" => Ok(CreationPolicy::AnyRole),
            other => Err(format!(
                "unknown creation policy '{other}' (expected user_role_only or any_role)"
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LifecyclePolicy {
    pub creation: CreationPolicy,
    /// Assigning an Open ticket also moves it to In Progress.
    pub auto_progress_on_assign: bool,
    pub limits: FieldLimits,
}

/// The ticket after a transition plus the notifications it should trigger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub ticket: Ticket,
    pub events: Vec<NotificationEvent>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransitionError {
    #[error("{role} may not {action} tickets")]
    Forbidden { action: &'static str, role: Role },
    #[error(transparent)]
    Invalid(#[from] FieldErrors),
    #[error("cannot {action} a ticket that is {status}")]
    InvalidState {
        action: &'static str,
        status: TicketStatus,
    },
    #[error("ticket is archived")]
    AlreadyArchived,
    #[error("ticket is not archived")]
    NotArchived,
    #[error("archived ticket has no recorded prior status")]
    MissingPriorStatus,
    #[error("inconsistent ticket: {0}")]
    Inconsistent(&'static str),
}

#[derive(Debug, Clone, Default)]
pub struct Lifecycle {
    policy: LifecyclePolicy,
}

impl Lifecycle {
    pub fn new(policy: LifecyclePolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &LifecyclePolicy {
        &self.policy
    }

    /// Validates a creation request, reporting every field problem at once.
    pub fn draft(
        &self,
        actor: &Identity,
        request: &NewTicketRequest,
        refs: &ReferenceIndex,
    ) -> Result<TicketDraft, TransitionError> {
        if !self.policy.creation.permits(actor.role) {
            return Err(self.forbid("create", actor));
        }

        let limits = self.policy.limits;
        let mut errors = FieldErrors::default();
        let scope = VisibilityScope::for_identity(actor);

        let centre = match request.centre {
            None => {
                errors.push("centre", REQUIRED);
                None
            }
            Some(id) if refs.centre(id).is_none() => {
                errors.push("centre", "select a valid centre");
                None
            }
            Some(id) if !scope.may_file_at(id, refs) => {
                errors.push("centre", "you cannot file tickets for this centre");
                None
            }
            Some(id) => Some(id),
        };

        let category = match request.category.map(|id| (id, refs.category(id))) {
            None => {
                errors.push("category", REQUIRED);
                None
            }
            Some((_, None)) => {
                errors.push("category", "select a valid category");
                None
            }
            Some((_, Some(category))) => Some(category),
        };

        let subcategory = match request.subcategory.map(|id| (id, refs.subcategory(id))) {
            None => {
                errors.push("subcategory", REQUIRED);
                None
            }
            Some((_, None)) => {
                errors.push("subcategory", "select a valid subcategory");
                None
            }
            Some((_, Some(subcategory))) => {
                match category {
                    Some(category) if !subcategory.belongs_to(category.id) => {
                        errors.push(
                            "subcategory",
                            "the selected subcategory does not belong to the selected category",
                        );
                    }
                    _ => {}
                }
                Some(subcategory)
            }
        };

        let description = errors.require("description", &request.description, limits.description_max);

        let title = request
            .title
            .as_deref()
            .map(str::trim)
            .filter(|title| !title.is_empty())
            .map(str::to_string);
        if let Some(title) = &title {
            errors.limit("title", title, limits.title_max);
        }

        errors.into_result()?;

        match (centre, category, subcategory) {
            (Some(centre), Some(category), Some(subcategory)) => Ok(TicketDraft {
                centre,
                category: category.id,
                category_code: category.code.clone(),
                subcategory: subcategory.id,
                subcategory_code: subcategory.code.clone(),
                title,
                description,
                priority: request.priority.unwrap_or_default(),
            }),
            _ => Err(TransitionError::Inconsistent("validated draft is incomplete")),
        }
    }

    pub fn start_progress(
        &self,
        actor: &Identity,
        ticket: &Ticket,
    ) -> Result<Transition, TransitionError> {
        const ACTION: &str = "start work on";
        self.require_worker(ACTION, actor)?;
        Self::require_active(ticket)?;
        if ticket.status != TicketStatus::Open {
            return Err(Self::invalid_state(ACTION, ticket));
        }

        let mut next = ticket.clone();
        next.status = TicketStatus::InProgress;
        Self::finish(next, vec![NotificationEvent::StatusChanged])
    }

    pub fn assign(
        &self,
        actor: &Identity,
        ticket: &Ticket,
        assignee: &User,
    ) -> Result<Transition, TransitionError> {
        const ACTION: &str = "assign";
        self.require_worker(ACTION, actor)?;
        Self::require_active(ticket)?;
        if matches!(ticket.status, TicketStatus::Resolved | TicketStatus::Closed) {
            return Err(Self::invalid_state(ACTION, ticket));
        }
        if assignee.role != Role::Technician {
            return Err(FieldErrors::single("technician", "tickets can only be assigned to technicians").into());
        }

        let mut next = ticket.clone();
        next.assigned_to = Some(assignee.id);
        let mut events = vec![NotificationEvent::Assigned];
        if self.policy.auto_progress_on_assign && next.status == TicketStatus::Open {
            next.status = TicketStatus::InProgress;
            events.push(NotificationEvent::StatusChanged);
        }
        Self::finish(next, events)
    }

    pub fn resolve(
        &self,
        actor: &Identity,
        ticket: &Ticket,
        notes: &str,
        now: DateTime<Utc>,
    ) -> Result<Transition, TransitionError> {
        const ACTION: &str = "resolve";
        self.require_worker(ACTION, actor)?;
        Self::require_active(ticket)?;
        if ticket.status == TicketStatus::Resolved {
            return Err(Self::invalid_state(ACTION, ticket));
        }
        let notes = notes.trim();
        if notes.is_empty() {
            return Err(FieldErrors::single("resolution_notes", REQUIRED).into());
        }

        let mut next = ticket.clone();
        next.status = TicketStatus::Resolved;
        next.resolution_notes = Some(notes.to_string());
        next.resolved_by = Some(actor.user_id);
        next.resolved_at = Some(now);
        Self::finish(next, vec![NotificationEvent::Resolved])
    }

    pub fn archive(
        &self,
        actor: &Identity,
        ticket: &Ticket,
        now: DateTime<Utc>,
    ) -> Result<Transition, TransitionError> {
        self.require_archivist("archive", actor)?;
        Self::require_active(ticket)?;

        let mut next = ticket.clone();
        next.status_before_archive = Some(ticket.status);
        next.status = TicketStatus::Closed;
        next.archived = true;
        next.archived_at = Some(now);
        Self::finish(next, vec![NotificationEvent::StatusChanged])
    }

    pub fn unarchive(
        &self,
        actor: &Identity,
        ticket: &Ticket,
    ) -> Result<Transition, TransitionError> {
        self.require_archivist("unarchive", actor)?;
        if !ticket.archived {
            return Err(TransitionError::NotArchived);
        }
        let prior = ticket
            .status_before_archive
            .ok_or(TransitionError::MissingPriorStatus)?;

        let mut next = ticket.clone();
        next.status = prior;
        next.archived = false;
        next.archived_at = None;
        next.status_before_archive = None;
        Self::finish(next, vec![NotificationEvent::StatusChanged])
    }

    /// Submitter edits. The title is fixed after creation.
    pub fn edit(
        &self,
        actor: &Identity,
        ticket: &Ticket,
        edit: &TicketEdit,
    ) -> Result<Transition, TransitionError> {
        if actor.user_id != ticket.submitted_by {
            return Err(self.forbid("edit other users'", actor));
        }
        Self::require_active(ticket)?;

        let mut errors = FieldErrors::default();
        if let Some(title) = edit.title.as_deref() {
            if title.trim() != ticket.title {
                errors.push("title", "the title cannot be changed");
            }
        }
        let description = edit.description.as_deref().map(|description| {
            errors.require("description", description, self.policy.limits.description_max)
        });
        errors.into_result()?;

        let mut next = ticket.clone();
        if let Some(description) = description {
            next.description = description;
        }
        Self::finish(next, Vec::new())
    }

    fn finish(ticket: Ticket, events: Vec<NotificationEvent>) -> Result<Transition, TransitionError> {
        ticket.check_consistency()?;
        Ok(Transition { ticket, events })
    }

    fn require_worker(&self, action: &'static str, actor: &Identity) -> Result<(), TransitionError> {
        if actor.role.works_tickets() {
            Ok(())
        } else {
            Err(self.forbid(action, actor))
        }
    }

    fn require_archivist(
        &self,
        action: &'static str,
        actor: &Identity,
    ) -> Result<(), TransitionError> {
        if actor.role.archives_tickets() {
            Ok(())
        } else {
            Err(self.forbid(action, actor))
        }
    }

    fn require_active(ticket: &Ticket) -> Result<(), TransitionError> {
        if ticket.archived {
            Err(TransitionError::AlreadyArchived)
        } else {
            Ok(())
        }
    }

    fn forbid(&self, action: &'static str, actor: &Identity) -> TransitionError {
        debug!(user = %actor.username, role = %actor.role, action, "transition refused");
        TransitionError::Forbidden {
            action,
            role: actor.role,
        }
    }

    fn invalid_state(action: &'static str, ticket: &Ticket) -> TransitionError {
        debug!(ticket = %ticket.number, status = %ticket.status, action, "transition not allowed from current state");
        TransitionError::InvalidState {
            action,
            status: ticket.status,
        }
    }
}
