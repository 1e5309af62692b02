pub mod config;
pub mod dictionary;
pub mod error;
pub mod fuzzy_matcher;
pub mod ingestion;
pub mod record;

pub use dictionary::{AddOutcome, Dictionary, DictionaryConfig, FuzzyMatch, Snapshot};
pub use error::{DictionaryError, Result};
pub use fuzzy_matcher::{NameMatcher, Scorer};
pub use record::{normalize, Normalizer, Record, RecordId};
