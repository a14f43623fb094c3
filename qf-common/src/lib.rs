//! # QuestionFlow Common Library
//!
//! Shared code for QuestionFlow services including:
//! - Data model (sessions, doubts, confusion readings)
//! - Realtime event types and the session room broadcaster
//! - Configuration loading
//! - Database initialization
//! - Timestamp helpers

pub mod config;
pub mod db;
pub mod error;
pub mod events;
pub mod models;
pub mod rooms;
pub mod time;

pub use error::{Error, Result};
pub use events::SessionEvent;
pub use models::{ConfusionLevel, ConfusionSnapshot, Doubt, Session};
pub use rooms::RoomBroadcaster;
