use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::domain::{Priority, Ticket, TicketNumber, TicketStatus};
use crate::directory::{Centre, Country, Region};
use crate::identity::User;
use crate::ids::{
    CategoryId, CentreId, CountryId, RegionId, SubCategoryId, TicketId, UserId,
};
use crate::store::{HelpdeskStore, StoreError};
use crate::taxonomy::{Category, SubCategory};

/// Where a centre sits in the hierarchy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TicketLocation {
    pub centre: CentreId,
    pub region: RegionId,
    pub country: CountryId,
}

/// Snapshot of every reference entity, keyed by id, used to join tickets to names.
#[derive(Debug, Clone, Default)]
pub struct ReferenceIndex {
    countries: HashMap<CountryId, Country>,
    regions: HashMap<RegionId, Region>,
    centres: HashMap<CentreId, Centre>,
    categories: HashMap<CategoryId, Category>,
    subcategories: HashMap<SubCategoryId, SubCategory>,
    users: HashMap<UserId, User>,
}

impl ReferenceIndex {
    pub fn load<S>(store: &S) -> Result<Self, StoreError>
    where
        S: HelpdeskStore + ?Sized,
    {
        Ok(Self {
            countries: store.countries()?.into_iter().map(|c| (c.id, c)).collect(),
            regions: store.regions()?.into_iter().map(|r| (r.id, r)).collect(),
            centres: store.centres()?.into_iter().map(|c| (c.id, c)).collect(),
            categories: store.categories()?.into_iter().map(|c| (c.id, c)).collect(),
            subcategories: store
                .subcategories()?
                .into_iter()
                .map(|s| (s.id, s))
                .collect(),
            users: store.users()?.into_iter().map(|u| (u.id, u)).collect(),
        })
    }

    pub fn location(&self, centre: CentreId) -> Option<TicketLocation> {
        let centre = self.centres.get(&centre)?;
        let region = self.regions.get(&centre.region)?;
        Some(TicketLocation {
            centre: centre.id,
            region: region.id,
            country: region.country,
        })
    }

    pub fn country(&self, id: CountryId) -> Option<&Country> {
        self.countries.get(&id)
    }

    pub fn region(&self, id: RegionId) -> Option<&Region> {
        self.regions.get(&id)
    }

    pub fn centre(&self, id: CentreId) -> Option<&Centre> {
        self.centres.get(&id)
    }

    pub fn category(&self, id: CategoryId) -> Option<&Category> {
        self.categories.get(&id)
    }

    pub fn subcategory(&self, id: SubCategoryId) -> Option<&SubCategory> {
        self.subcategories.get(&id)
    }

    pub fn user(&self, id: UserId) -> Option<&User> {
        self.users.get(&id)
    }

    pub fn regions(&self) -> impl Iterator<Item = &Region> {
        self.regions.values()
    }

    pub fn centres(&self) -> impl Iterator<Item = &Centre> {
        self.centres.values()
    }

    pub fn users(&self) -> impl Iterator<Item = &User> {
        self.users.values()
    }

    pub fn centre_name(&self, id: CentreId) -> String {
        self.centre(id).map(|c| c.name.clone()).unwrap_or_default()
    }

    pub fn region_name_of(&self, centre: CentreId) -> String {
        self.location(centre)
            .and_then(|location| self.region(location.region))
            .map(|region| region.name.clone())
            .unwrap_or_default()
    }

    pub fn category_name(&self, id: CategoryId) -> String {
        self.category(id).map(|c| c.name.clone()).unwrap_or_default()
    }

    pub fn subcategory_name(&self, id: SubCategoryId) -> String {
        self.subcategory(id)
            .map(|s| s.name.clone())
            .unwrap_or_default()
    }

    pub fn username(&self, id: UserId) -> String {
        self.user(id)
            .map(|u| u.username.clone())
            .unwrap_or_default()
    }

    pub fn view(&self, ticket: &Ticket, now: DateTime<Utc>) -> TicketView {
        let location = self.location(ticket.centre);
        TicketView {
            id: ticket.id,
            number: ticket.number,
            title: ticket.title.clone(),
            description: ticket.description.clone(),
            status: ticket.status,
            status_label: ticket.status.label(),
            priority: ticket.priority,
            centre_id: ticket.centre,
            centre: self.centre_name(ticket.centre),
            region_id: location.map(|l| l.region),
            region: self.region_name_of(ticket.centre),
            country: location
                .and_then(|l| self.country(l.country))
                .map(|c| c.name.clone())
                .unwrap_or_default(),
            category_id: ticket.category,
            category: self.category_name(ticket.category),
            subcategory_id: ticket.subcategory,
            subcategory: self.subcategory_name(ticket.subcategory),
            submitted_by: self.username(ticket.submitted_by),
            assigned_to: ticket.assigned_to.map(|id| self.username(id)),
            resolved_by: ticket.resolved_by.map(|id| self.username(id)),
            resolution_notes: ticket.resolution_notes.clone(),
            submitted_at: ticket.submitted_at,
            resolved_at: ticket.resolved_at,
            archived: ticket.archived,
            archived_at: ticket.archived_at,
            age_hours: ticket.age(now).num_hours(),
        }
    }
}

/// Flat, name-joined ticket row handed to API clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TicketView {
    pub id: TicketId,
    pub number: TicketNumber,
    pub title: String,
    pub description: String,
    pub status: TicketStatus,
    pub status_label: &'static str,
    pub priority: Priority,
    pub centre_id: CentreId,
    pub centre: String,
    pub region_id: Option<RegionId>,
    pub region: String,
    pub country: String,
    pub category_id: CategoryId,
    pub category: String,
    pub subcategory_id: SubCategoryId,
    pub subcategory: String,
    pub submitted_by: String,
    pub assigned_to: Option<String>,
    pub resolved_by: Option<String>,
    pub resolution_notes: Option<String>,
    pub submitted_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub archived: bool,
    pub archived_at: Option<DateTime<Utc>>,
    pub age_hours: i64,
}
