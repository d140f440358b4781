//! Outbound ticket notifications: one notice fanned out to every configured channel.

pub mod channels;
pub mod templates;

use std::fmt;

use serde::Serialize;
use tracing::{debug, warn};

pub use channels::{LogChannel, MailRelayChannel, WebhookChannel};
pub use templates::{EmailTemplate, TemplateCatalog};

use crate::tickets::{Priority, TicketNumber, TicketStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationEvent {
    TicketCreated,
    StatusChanged,
    Resolved,
    Assigned,
}

impl NotificationEvent {
    pub const ALL: [NotificationEvent; 4] = [
        NotificationEvent::TicketCreated,
        NotificationEvent::StatusChanged,
        NotificationEvent::Resolved,
        NotificationEvent::Assigned,
    ];

    pub const fn label(self) -> &'static str {
        match self {
            NotificationEvent::TicketCreated => "Ticket Creation",
            NotificationEvent::StatusChanged => "Status Change",
            NotificationEvent::Resolved => "Resolution",
            NotificationEvent::Assigned => "Assignment",
        }
    }
}

impl fmt::Display for NotificationEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Everything a template may reference, resolved to display strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TicketNotice {
    pub event: NotificationEvent,
    pub ticket_number: TicketNumber,
    pub centre: String,
    pub title: String,
    pub category: String,
    pub subcategory: String,
    pub priority: Priority,
    pub status: TicketStatus,
    pub assigned_to: Option<String>,
    /// Username of whoever performed the action.
    pub actor: String,
    /// Username of the submitter, addressed in e-mail greetings.
    pub submitter: String,
    pub recipient: Option<String>,
}

impl TicketNotice {
    pub fn placeholders(&self) -> Vec<(&'static str, String)> {
        vec![
            ("ticket_number", self.ticket_number.to_string()),
            ("centre", self.centre.clone()),
            ("title", self.title.clone()),
            ("category", self.category.clone()),
            ("subcategory", self.subcategory.clone()),
            ("priority", self.priority.label().to_string()),
            ("status", self.status.label().to_string()),
            (
                "assigned_to",
                self.assigned_to
                    .clone()
                    .unwrap_or_else(|| "unassigned".to_string()),
            ),
            ("user", self.actor.clone()),
            ("user_name", self.submitter.clone()),
        ]
    }
}

#[derive(Debug, thiserror::Error)]
pub enum NotificationError {
    #[error("no async runtime available to send notifications")]
    NoRuntime,
    #[error("notification client error: {0}")]
    Client(String),
    #[error("notification endpoint rejected the request with status {0}")]
    Rejected(u16),
    #[error("notification failed on channels: {}", .0.join(", "))]
    Partial(Vec<String>),
}

/// Side-effect hook the ticket service calls after every committed transition.
pub trait NotificationSender: Send + Sync {
    fn notify(&self, notice: &TicketNotice) -> Result<(), NotificationError>;
}

/// A single delivery mechanism (mail relay, chat webhook, log line).
pub trait NotificationChannel: Send + Sync {
    fn name(&self) -> &'static str;
    fn deliver(&self, notice: &TicketNotice, catalog: &TemplateCatalog)
        -> Result<(), NotificationError>;
}

/// Fans one notice out to every channel. A failing channel does not stop the others.
pub struct Dispatcher {
    catalog: TemplateCatalog,
    channels: Vec<Box<dyn NotificationChannel>>,
}

impl Dispatcher {
    pub fn new(catalog: TemplateCatalog) -> Self {
        Self {
            catalog,
            channels: Vec::new(),
        }
    }

    pub fn with_channel(mut self, channel: impl NotificationChannel + 'static) -> Self {
        self.channels.push(Box::new(channel));
        self
    }

    pub fn channel_names(&self) -> Vec<&'static str> {
        self.channels.iter().map(|channel| channel.name()).collect()
    }
}

impl NotificationSender for Dispatcher {
    fn notify(&self, notice: &TicketNotice) -> Result<(), NotificationError> {
        let mut failed = Vec::new();
        for channel in &self.channels {
            match channel.deliver(notice, &self.catalog) {
                Ok(()) => debug!(
                    channel = channel.name(),
                    event = %notice.event,
                    ticket = %notice.ticket_number,
                    "notification dispatched"
                ),
                Err(error) => {
                    warn!(channel = channel.name(), %error, "notification channel failed");
                    failed.push(channel.name().to_string());
                }
            }
        }

        if failed.is_empty() {
            Ok(())
        } else {
            Err(NotificationError::Partial(failed))
        }
    }
}
