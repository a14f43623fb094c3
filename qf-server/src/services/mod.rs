//! Domain services: code resolution, duplicate detection, the doubt ledger,
//! confusion aggregation and the session directory

pub mod code_resolver;
pub mod confusion;
pub mod doubt_ledger;
pub mod sessions;
pub mod similarity;

pub use code_resolver::CodeResolver;
pub use confusion::{AggregationError, ConfusionAggregator};
pub use doubt_ledger::{DoubtLedger, DoubtSubmission, SubmitOutcome};
pub use sessions::{NewSession, SessionDirectory};
pub use similarity::SimilarityMatcher;
