//! Role-scoped ticket visibility, layered list filters, ordering and pagination.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use super::domain::{Ticket, TicketStatus};
use super::view::ReferenceIndex;
use crate::identity::{Identity, Role};
use crate::ids::{CentreId, CountryId, RegionId, UserId};

pub const DEFAULT_PER_PAGE: usize = 10;
pub const MAX_PER_PAGE: usize = 100;

/// The slice of tickets an identity may see, derived from its role and affiliation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VisibilityScope {
    Everything,
    /// Tickets whose centre lies in `country`, or in `region`, or both.
    Geography {
        country: Option<CountryId>,
        region: Option<RegionId>,
    },
    /// Tickets the user submitted plus tickets at any of the user's centres.
    Membership {
        user: UserId,
        centres: BTreeSet<CentreId>,
    },
    Nothing,
}

impl VisibilityScope {
    pub fn for_identity(identity: &Identity) -> Self {
        match identity.role {
            Role::SuperAdmin | Role::Technician => VisibilityScope::Everything,
            Role::Admin | Role::Manager => match (identity.scope.country, identity.scope.region) {
                (None, None) => VisibilityScope::Nothing,
                (country, region) => VisibilityScope::Geography { country, region },
            },
            Role::User => VisibilityScope::Membership {
                user: identity.user_id,
                centres: identity.scope.centres.clone(),
            },
        }
    }

    pub fn is_unrestricted(&self) -> bool {
        matches!(self, VisibilityScope::Everything)
    }

    pub fn admits(&self, ticket: &Ticket, refs: &ReferenceIndex) -> bool {
        match self {
            VisibilityScope::Membership { user, centres } => {
                ticket.submitted_by == *user || centres.contains(&ticket.centre)
            }
            other => other.covers_centre(ticket.centre, refs),
        }
    }

    /// Whether a new ticket may be filed at `centre`. Plain users are held to their own
    /// centres; everyone else to the centres their scope covers.
    pub fn may_file_at(&self, centre: CentreId, refs: &ReferenceIndex) -> bool {
        refs.centre(centre).is_some() && self.covers_centre(centre, refs)
    }

    fn covers_centre(&self, centre: CentreId, refs: &ReferenceIndex) -> bool {
        match self {
            VisibilityScope::Everything => true,
            VisibilityScope::Geography { country, region } => {
                refs.location(centre).is_some_and(|location| {
                    Some(location.country) == *country || Some(location.region) == *region
                })
            }
            VisibilityScope::Membership { centres, .. } => centres.contains(&centre),
            VisibilityScope::Nothing => false,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArchiveFilter {
    #[default]
    Active,
    Archived,
    All,
}

impl ArchiveFilter {
    fn admits(self, ticket: &Ticket) -> bool {
        match self {
            ArchiveFilter::Active => !ticket.archived,
            ArchiveFilter::Archived => ticket.archived,
            ArchiveFilter::All => true,
        }
    }
}

/// Optional list filters, applied after role scoping in field order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TicketQuery {
    pub archive: ArchiveFilter,
    pub search: Option<String>,
    pub status: Option<TicketStatus>,
    pub regions: BTreeSet<RegionId>,
    pub centres: BTreeSet<CentreId>,
}

impl TicketQuery {
    fn matches_search(needle: &str, ticket: &Ticket, refs: &ReferenceIndex) -> bool {
        let needle = needle.to_lowercase();
        [
            ticket.title.clone(),
            refs.category_name(ticket.category),
            refs.subcategory_name(ticket.subcategory),
            refs.centre_name(ticket.centre),
            refs.region_name_of(ticket.centre),
            refs.username(ticket.submitted_by),
        ]
        .iter()
        .any(|haystack| haystack.to_lowercase().contains(&needle))
    }

    fn matches_location(&self, ticket: &Ticket, refs: &ReferenceIndex) -> bool {
        let region_ok = self.regions.is_empty()
            || refs
                .location(ticket.centre)
                .is_some_and(|location| self.regions.contains(&location.region));
        let centre_ok = self.centres.is_empty() || self.centres.contains(&ticket.centre);
        region_ok && centre_ok
    }

    pub fn admits(&self, ticket: &Ticket, refs: &ReferenceIndex) -> bool {
        if !self.archive.admits(ticket) {
            return false;
        }
        if let Some(search) = self.search.as_deref().map(str::trim) {
            if !search.is_empty() && !Self::matches_search(search, ticket, refs) {
                return false;
            }
        }
        if self.status.is_some_and(|status| status != ticket.status) {
            return false;
        }
        self.matches_location(ticket, refs)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FilterOption<I> {
    pub id: I,
    pub name: String,
}

/// Candidate values for the region and centre multi-selects.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FilterOptions {
    pub regions: Vec<FilterOption<RegionId>>,
    pub centres: Vec<FilterOption<CentreId>>,
}

/// Applies role scope and list filters to a ticket collection.
pub struct VisibilityEngine<'a> {
    refs: &'a ReferenceIndex,
}

impl<'a> VisibilityEngine<'a> {
    pub fn new(refs: &'a ReferenceIndex) -> Self {
        Self { refs }
    }

    pub fn can_view(&self, identity: &Identity, ticket: &Ticket) -> bool {
        VisibilityScope::for_identity(identity).admits(ticket, self.refs)
    }

    /// Every ticket the identity may see that passes `query`, newest first with ties
    /// broken by descending number.
    pub fn select(
        &self,
        identity: &Identity,
        tickets: Vec<Ticket>,
        query: &TicketQuery,
    ) -> Vec<Ticket> {
        let scope = VisibilityScope::for_identity(identity);
        let mut selected: Vec<Ticket> = tickets
            .into_iter()
            .filter(|ticket| scope.admits(ticket, self.refs))
            .filter(|ticket| query.admits(ticket, self.refs))
            .collect();
        selected.sort_by(|left, right| {
            right
                .submitted_at
                .cmp(&left.submitted_at)
                .then_with(|| right.number.cmp(&left.number))
        });
        selected
    }

    pub fn filter_options(&self, identity: &Identity) -> FilterOptions {
        let scope = VisibilityScope::for_identity(identity);
        let regions: BTreeSet<RegionId> = match &scope {
            VisibilityScope::Everything => self.refs.regions().map(|r| r.id).collect(),
            VisibilityScope::Geography { country, region } => self
                .refs
                .regions()
                .filter(|r| Some(r.country) == *country || Some(r.id) == *region)
                .map(|r| r.id)
                .collect(),
            VisibilityScope::Membership { centres, .. } => centres
                .iter()
                .filter_map(|centre| self.refs.location(*centre))
                .map(|location| location.region)
                .collect(),
            VisibilityScope::Nothing => BTreeSet::new(),
        };
        let centres: BTreeSet<CentreId> = match &scope {
            VisibilityScope::Membership { centres, .. } => centres.clone(),
            _ => self
                .refs
                .centres()
                .filter(|c| regions.contains(&c.region))
                .map(|c| c.id)
                .collect(),
        };

        let mut options = FilterOptions {
            regions: regions
                .into_iter()
                .filter_map(|id| self.refs.region(id))
                .map(|r| FilterOption {
                    id: r.id,
                    name: r.name.clone(),
                })
                .collect(),
            centres: centres
                .into_iter()
                .filter_map(|id| self.refs.centre(id))
                .map(|c| FilterOption {
                    id: c.id,
                    name: c.name.clone(),
                })
                .collect(),
        };
        options.regions.sort_by(|a, b| a.name.cmp(&b.name));
        options.centres.sort_by(|a, b| a.name.cmp(&b.name));
        options
    }
}

/// 1-based page request; `per_page` is clamped to `1..=MAX_PER_PAGE`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct PageRequest {
    #[serde(default = "first_page")]
    pub page: usize,
    #[serde(default = "default_per_page")]
    pub per_page: usize,
}

fn first_page() -> usize {
    1
}

fn default_per_page() -> usize {
    DEFAULT_PER_PAGE
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            page: first_page(),
            per_page: DEFAULT_PER_PAGE,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page: usize,
    pub per_page: usize,
    pub total: usize,
    pub pages: usize,
}

impl<T> Page<T> {
    /// Out-of-range page numbers land on the nearest valid page.
    pub fn slice(items: Vec<T>, request: PageRequest) -> Self {
        let per_page = request.per_page.clamp(1, MAX_PER_PAGE);
        let total = items.len();
        let pages = total.div_ceil(per_page).max(1);
        let page = request.page.clamp(1, pages);
        let items = items
            .into_iter()
            .skip((page - 1) * per_page)
            .take(per_page)
            .collect();
        Self {
            items,
            page,
            per_page,
            total,
            pages,
        }
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            page: self.page,
            per_page: self.per_page,
            total: self.total,
            pages: self.pages,
        }
    }
}
