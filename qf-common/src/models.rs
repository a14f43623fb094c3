//! Data model shared by the QuestionFlow services
//!
//! Serialized field names are camelCase to match the browser clients.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Length of the short, human-shareable session code
pub const SESSION_CODE_LEN: usize = 6;

/// Display name recorded for anonymous submissions
pub const ANONYMOUS_NAME: &str = "Anonymous";

/// Derive the short display code of a session identity
///
/// The code is the last six characters of the identity, upper-cased.
/// Identities shorter than that yield the whole identity.
pub fn session_code(session_id: &str) -> String {
    let chars: Vec<char> = session_id.chars().collect();
    let start = chars.len().saturating_sub(SESSION_CODE_LEN);
    chars[start..].iter().collect::<String>().to_uppercase()
}

/// True when `raw` has the shape of a session code (6 ASCII alphanumerics)
pub fn is_session_code(raw: &str) -> bool {
    raw.len() == SESSION_CODE_LEN && raw.chars().all(|c| c.is_ascii_alphanumeric())
}

/// Per-session behavior switches
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSettings {
    /// Fold near-duplicate questions into an existing doubt
    #[serde(default = "default_auto_merge")]
    pub auto_merge_doubts: bool,
}

fn default_auto_merge() -> bool {
    true
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            auto_merge_doubts: default_auto_merge(),
        }
    }
}

/// Aggregate counters maintained by the doubt ledger
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStats {
    pub total_doubts: i64,
    pub answered_doubts: i64,
}

/// A live classroom session
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: String,
    pub title: String,
    pub instructor_name: Option<String>,
    pub is_active: bool,
    pub settings: SessionSettings,
    pub stats: SessionStats,
    pub created_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
}

impl Session {
    /// Short display code derived from the identity
    pub fn code(&self) -> String {
        session_code(&self.id)
    }
}

/// One submission folded into a doubt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MergedStudent {
    pub student_id: String,
    pub student_name: String,
    pub timestamp: DateTime<Utc>,
}

/// A submitted question within a session
///
/// A doubt with `merged_with == None` is canonical. On a canonical doubt
/// `merged_count == merged_students.len()`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Doubt {
    pub id: String,
    pub session_id: String,
    pub question: String,
    pub student_id: String,
    pub student_name: String,
    pub is_anonymous: bool,
    pub topic: String,
    pub confusion_level: i64,
    pub is_answered: bool,
    pub answer: Option<String>,
    pub answered_at: Option<DateTime<Utc>>,
    pub upvotes: i64,
    pub upvoted_by: Vec<String>,
    pub merged_with: Option<String>,
    pub merged_count: i64,
    pub merged_students: Vec<MergedStudent>,
    pub created_at: DateTime<Utc>,
}

impl Doubt {
    pub fn is_canonical(&self) -> bool {
        self.merged_with.is_none()
    }
}

/// Self-reported understanding level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfusionLevel {
    Clear = 0,
    Slight = 1,
    Confused = 2,
    Lost = 3,
}

impl ConfusionLevel {
    pub const ALL: [ConfusionLevel; 4] = [
        ConfusionLevel::Clear,
        ConfusionLevel::Slight,
        ConfusionLevel::Confused,
        ConfusionLevel::Lost,
    ];

    /// Map a stored ordinal to a level; unknown ordinals yield `None`
    pub fn from_ordinal(value: i64) -> Option<Self> {
        match value {
            0 => Some(ConfusionLevel::Clear),
            1 => Some(ConfusionLevel::Slight),
            2 => Some(ConfusionLevel::Confused),
            3 => Some(ConfusionLevel::Lost),
            _ => None,
        }
    }

    pub fn ordinal(self) -> i64 {
        self as i64
    }
}

/// Immutable confusion report from one student
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfusionReading {
    pub id: i64,
    pub session_id: String,
    pub student_id: String,
    pub student_name: Option<String>,
    pub level: i64,
    pub timestamp: DateTime<Utc>,
}

/// Point-in-time distribution of confusion levels
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfusionSnapshot {
    pub clear: u32,
    pub slight: u32,
    pub confused: u32,
    pub lost: u32,
    pub total: u32,
}

impl ConfusionSnapshot {
    /// Zero-filled snapshot used when stats cannot be computed
    pub fn zero() -> Self {
        Self::default()
    }

    /// Count one reading; returns false (and counts nothing) for unknown ordinals
    pub fn add(&mut self, ordinal: i64) -> bool {
        let Some(level) = ConfusionLevel::from_ordinal(ordinal) else {
            return false;
        };
        match level {
            ConfusionLevel::Clear => self.clear += 1,
            ConfusionLevel::Slight => self.slight += 1,
            ConfusionLevel::Confused => self.confused += 1,
            ConfusionLevel::Lost => self.lost += 1,
        }
        self.total += 1;
        true
    }

    pub fn count(&self, level: ConfusionLevel) -> u32 {
        match level {
            ConfusionLevel::Clear => self.clear,
            ConfusionLevel::Slight => self.slight,
            ConfusionLevel::Confused => self.confused,
            ConfusionLevel::Lost => self.lost,
        }
    }
}
