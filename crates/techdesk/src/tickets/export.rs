use std::io::Write;

use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;

use super::domain::Ticket;
use super::view::ReferenceIndex;
use crate::validation::FieldErrors;

pub const EXPORT_HEADERS: [&str; 12] = [
    "Ticket Number",
    "Submission Date",
    "Status",
    "Priority",
    "Centre",
    "Submitted By",
    "Category",
    "Subcategory",
    "Description",
    "Title",
    "Resolution Notes",
    "Assigned To",
];

const DATE_FORMAT: &str = "%Y-%m-%d %H:%M";

/// Inclusive calendar-day range over `submitted_at` (UTC).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct ExportRange {
    pub from: NaiveDate,
    pub to: NaiveDate,
}

impl ExportRange {
    pub fn new(from: NaiveDate, to: NaiveDate) -> Result<Self, FieldErrors> {
        if from > to {
            return Err(FieldErrors::single(
                "to",
                "the end date must not be before the start date",
            ));
        }
        Ok(Self { from, to })
    }

    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        let day = at.date_naive();
        self.from <= day && day <= self.to
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("failed to write CSV row: {0}")]
    Csv(#[from] csv::Error),
    #[error("failed to flush CSV output: {0}")]
    Io(#[from] std::io::Error),
}

/// Writes one row per ticket after the header row; returns the number of data rows.
pub fn write_tickets_csv<W: Write>(
    writer: W,
    tickets: &[Ticket],
    refs: &ReferenceIndex,
) -> Result<usize, ExportError> {
    let mut csv_writer = csv::Writer::from_writer(writer);
    csv_writer.write_record(EXPORT_HEADERS)?;

    for ticket in tickets {
        let submitted = ticket.submitted_at.format(DATE_FORMAT).to_string();
        let assignee = ticket
            .assigned_to
            .map(|id| refs.username(id))
            .unwrap_or_default();
        csv_writer.write_record([
            ticket.number.to_string().as_str(),
            submitted.as_str(),
            ticket.status.label(),
            ticket.priority.label(),
            refs.centre_name(ticket.centre).as_str(),
            refs.username(ticket.submitted_by).as_str(),
            refs.category_name(ticket.category).as_str(),
            refs.subcategory_name(ticket.subcategory).as_str(),
            ticket.description.as_str(),
            ticket.title.as_str(),
            ticket.resolution_notes.as_deref().unwrap_or_default(),
            assignee.as_str(),
        ])?;
    }

    csv_writer.flush()?;
    Ok(tickets.len())
}
