pub mod matcher;
pub mod query;
pub mod stats;

pub use matcher::{extract_keywords, MatchThresholds, ResourceMatcher, ScoredResource};
pub use query::{list_all, search_all, search_resources, CategoryGroups, ResourcePage, SearchAll};
pub use stats::{CategoryStats, LibraryStats};
