//! Role-scoped IT support ticketing.
//!
//! Tickets are filed against a Centre in the Country → Region → Centre hierarchy and
//! classified by Category/SubCategory. The [`tickets`] module holds the visibility engine
//! that decides which tickets an identity may see and the lifecycle engine that guards
//! every status change; everything else is reference data, identity, storage, and the
//! outbound notification contract.

pub mod config;
pub mod directory;
pub mod error;
pub mod identity;
pub mod ids;
pub mod notifications;
pub mod seed;
pub mod store;
pub mod taxonomy;
pub mod telemetry;
pub mod tickets;
pub mod validation;
