use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::ids::{CategoryId, CentreId, SubCategoryId, TicketId, UserId};

use super::lifecycle::TransitionError;

/// Human-facing ticket number: assigned once at creation, unique, strictly increasing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TicketNumber(pub u64);

impl TicketNumber {
    pub const FIRST: TicketNumber = TicketNumber(1);

    pub fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for TicketNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// `Closed` is only ever reached through archival and always pairs with the archive flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TicketStatus {
    Open,
    InProgress,
    Resolved,
    Closed,
}

impl TicketStatus {
    pub const ALL: [TicketStatus; 4] = [
        TicketStatus::Open,
        TicketStatus::InProgress,
        TicketStatus::Resolved,
        TicketStatus::Closed,
    ];

    pub const fn label(self) -> &'static str {
        match self {
            TicketStatus::Open => "Open",
            TicketStatus::InProgress => "In Progress",
            TicketStatus::Resolved => "Resolved",
            TicketStatus::Closed => "Closed",
        }
    }

    pub const fn key(self) -> &'static str {
        match self {
            TicketStatus::Open => "open",
            TicketStatus::InProgress => "in_progress",
            TicketStatus::Resolved => "resolved",
            TicketStatus::Closed => "closed",
        }
    }
}

impl fmt::Display for TicketStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for TicketStatus {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_ascii_lowercase().replace([' ', '-'], "_");
        TicketStatus::ALL
            .into_iter()
            .find(|status| status.key() == normalized)
            .ok_or_else(|| format!("unknown ticket status '{value}'"))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
}

impl Priority {
    pub const ALL: [Priority; 3] = [Priority::Low, Priority::Medium, Priority::High];

    pub const fn label(self) -> &'static str {
        match self {
            Priority::Low => "Low",
            Priority::Medium => "Medium",
            Priority::High => "High",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Length bounds for free-text ticket fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldLimits {
    pub description_max: usize,
    pub title_max: usize,
}

impl Default for FieldLimits {
    fn default() -> Self {
        Self {
            description_max: 100,
            title_max: 20,
        }
    }
}

/// Inbound creation payload, before validation.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewTicketRequest {
    #[serde(default)]
    pub centre: Option<CentreId>,
    #[serde(default)]
    pub category: Option<CategoryId>,
    #[serde(default)]
    pub subcategory: Option<SubCategoryId>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub priority: Option<Priority>,
}

/// A creation request that passed field validation; only the number is missing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TicketDraft {
    pub centre: CentreId,
    pub category: CategoryId,
    pub category_code: String,
    pub subcategory: SubCategoryId,
    pub subcategory_code: String,
    pub title: Option<String>,
    pub description: String,
    pub priority: Priority,
}

/// Submitter edit payload. `title` may be echoed back but never changed.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TicketEdit {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ticket {
    pub id: TicketId,
    pub number: TicketNumber,
    pub title: String,
    pub description: String,
    pub status: TicketStatus,
    pub priority: Priority,
    pub centre: CentreId,
    pub category: CategoryId,
    pub subcategory: SubCategoryId,
    pub submitted_by: UserId,
    pub assigned_to: Option<UserId>,
    pub resolved_by: Option<UserId>,
    pub resolution_notes: Option<String>,
    pub submitted_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub archived: bool,
    pub archived_at: Option<DateTime<Utc>>,
    pub status_before_archive: Option<TicketStatus>,
    /// Write counter; the store bumps it on every accepted update.
    #[serde(default)]
    pub revision: u64,
}

impl Ticket {
    /// Builds the Open ticket for an allocated number.
    pub fn open(
        number: TicketNumber,
        draft: &TicketDraft,
        submitted_by: UserId,
        submitted_at: DateTime<Utc>,
    ) -> Self {
        let title = draft.title.clone().unwrap_or_else(|| {
            derive_title(
                number,
                &draft.category_code,
                &draft.subcategory_code,
                &draft.description,
            )
        });

        Self {
            id: TicketId::new(),
            number,
            title,
            description: draft.description.clone(),
            status: TicketStatus::Open,
            priority: draft.priority,
            centre: draft.centre,
            category: draft.category,
            subcategory: draft.subcategory,
            submitted_by,
            assigned_to: None,
            resolved_by: None,
            resolution_notes: None,
            submitted_at,
            resolved_at: None,
            archived: false,
            archived_at: None,
            status_before_archive: None,
            revision: 0,
        }
    }

    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        now - self.submitted_at
    }

    pub fn time_to_resolve(&self) -> Option<Duration> {
        self.resolved_at.map(|resolved| resolved - self.submitted_at)
    }

    /// Cross-field invariants every stored ticket satisfies.
    pub fn check_consistency(&self) -> Result<(), TransitionError> {
        match self.status {
            TicketStatus::Resolved => {
                if self.resolved_by.is_none() || self.resolved_at.is_none() {
                    return Err(TransitionError::Inconsistent(
                        "resolved tickets record who resolved them and when",
                    ));
                }
                if self
                    .resolution_notes
                    .as_deref()
                    .map_or(true, |notes| notes.trim().is_empty())
                {
                    return Err(TransitionError::Inconsistent(
                        "resolved tickets carry resolution notes",
                    ));
                }
            }
            TicketStatus::Open | TicketStatus::InProgress => {
                if self.resolved_by.is_some() || self.resolved_at.is_some() {
                    return Err(TransitionError::Inconsistent(
                        "unresolved tickets have no resolver",
                    ));
                }
            }
            TicketStatus::Closed => {}
        }

        if self.archived != (self.status == TicketStatus::Closed) {
            return Err(TransitionError::Inconsistent(
                "closed status and the archive flag go together",
            ));
        }
        if self.archived && self.archived_at.is_none() {
            return Err(TransitionError::Inconsistent(
                "archived tickets carry an archive timestamp",
            ));
        }

        Ok(())
    }
}

/// `{number}-{category code}-{subcategory code}-{first 20 chars of description}`.
pub fn derive_title(
    number: TicketNumber,
    category_code: &str,
    subcategory_code: &str,
    description: &str,
) -> String {
    let excerpt: String = description.trim().chars().take(20).collect();
    format!("{number}-{category_code}-{subcategory_code}-{excerpt}")
}
