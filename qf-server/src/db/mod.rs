//! SQL access layer
//!
//! Counter updates are single-statement increments and multi-row changes run
//! in a transaction, so concurrent submissions never lose updates.

pub mod confusion;
pub mod doubts;
pub mod sessions;
