use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::domain::{Priority, Ticket, TicketStatus};
use super::view::{ReferenceIndex, TicketView};
use super::visibility::FilterOptions;
use crate::identity::Role;

pub const RECENT_TICKETS: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CountEntry {
    pub label: String,
    pub count: usize,
}

/// Aggregates over one identity's filtered ticket set.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DashboardSummary {
    pub total: usize,
    pub by_status: BTreeMap<&'static str, usize>,
    pub by_priority: BTreeMap<&'static str, usize>,
    pub by_centre: Vec<CountEntry>,
    pub by_region: Vec<CountEntry>,
    pub by_category: Vec<CountEntry>,
    pub high_priority_open: usize,
    pub average_resolution_hours: Option<f64>,
    /// In-progress tickets per technician, idle technicians included.
    pub technician_workload: Vec<CountEntry>,
    pub recent: Vec<TicketView>,
    pub filters: FilterOptions,
}

impl DashboardSummary {
    /// `tickets` is expected newest first, as the visibility engine returns them.
    pub fn build(
        tickets: &[Ticket],
        refs: &ReferenceIndex,
        filters: FilterOptions,
        now: DateTime<Utc>,
    ) -> Self {
        let mut by_status: BTreeMap<&'static str, usize> =
            TicketStatus::ALL.iter().map(|s| (s.label(), 0)).collect();
        let mut by_priority: BTreeMap<&'static str, usize> =
            Priority::ALL.iter().map(|p| (p.label(), 0)).collect();
        let mut by_centre: BTreeMap<String, usize> = BTreeMap::new();
        let mut by_region: BTreeMap<String, usize> = BTreeMap::new();
        let mut by_category: BTreeMap<String, usize> = BTreeMap::new();
        let mut workload: BTreeMap<String, usize> = refs
            .users()
            .filter(|user| user.role == Role::Technician)
            .map(|user| (user.username.clone(), 0))
            .collect();

        for ticket in tickets {
            *by_status.entry(ticket.status.label()).or_default() += 1;
            *by_priority.entry(ticket.priority.label()).or_default() += 1;
            *by_centre.entry(refs.centre_name(ticket.centre)).or_default() += 1;
            *by_region.entry(refs.region_name_of(ticket.centre)).or_default() += 1;
            *by_category.entry(refs.category_name(ticket.category)).or_default() += 1;

            if ticket.status == TicketStatus::InProgress {
                if let Some(technician) = ticket.assigned_to {
                    *workload.entry(refs.username(technician)).or_default() += 1;
                }
            }
        }

        let high_priority_open = tickets
            .iter()
            .filter(|t| t.priority == Priority::High && t.status == TicketStatus::Open)
            .count();

        let durations: Vec<i64> = tickets
            .iter()
            .filter_map(Ticket::time_to_resolve)
            .map(|elapsed| elapsed.num_seconds())
            .collect();
        let average_resolution_hours = if durations.is_empty() {
            None
        } else {
            let total: i64 = durations.iter().sum();
            Some(total as f64 / durations.len() as f64 / 3600.0)
        };

        Self {
            total: tickets.len(),
            by_status,
            by_priority,
            by_centre: ranked(by_centre),
            by_region: ranked(by_region),
            by_category: ranked(by_category),
            high_priority_open,
            average_resolution_hours,
            technician_workload: ranked(workload),
            recent: tickets
                .iter()
                .take(RECENT_TICKETS)
                .map(|ticket| refs.view(ticket, now))
                .collect(),
            filters,
        }
    }
}

fn ranked(counts: BTreeMap<String, usize>) -> Vec<CountEntry> {
    let mut entries: Vec<CountEntry> = counts
        .into_iter()
        .map(|(label, count)| CountEntry { label, count })
        .collect();
    entries.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.label.cmp(&b.label)));
    entries
}
