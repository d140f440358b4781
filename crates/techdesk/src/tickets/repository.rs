use super::domain::{Ticket, TicketNumber};
use crate::ids::TicketId;
use crate::store::StoreError;

/// Storage contract for tickets.
///
/// `insert_numbered` allocates the next number and inserts the ticket built for it in
/// one serialized step. Stores that cannot serialize allocation report
/// [`StoreError::NumberTaken`] and the caller retries.
pub trait TicketRepository: Send + Sync {
    fn insert_numbered(
        &self,
        build: &mut dyn FnMut(TicketNumber) -> Ticket,
    ) -> Result<Ticket, StoreError>;

    /// Replaces a stored ticket. Number, submitter, submission time and title are fixed.
    /// The write is refused with [`StoreError::StaleWrite`] unless `ticket.revision`
    /// matches the stored revision; the returned ticket carries the next revision.
    fn update_ticket(&self, ticket: Ticket) -> Result<Ticket, StoreError>;

    fn ticket(&self, id: TicketId) -> Result<Option<Ticket>, StoreError>;
    fn ticket_by_number(&self, number: TicketNumber) -> Result<Option<Ticket>, StoreError>;
    fn tickets(&self) -> Result<Vec<Ticket>, StoreError>;
}
