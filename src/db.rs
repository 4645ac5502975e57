//! All job state is stored in a SQLite database

/// Connect to a SQLite database
pub mod open;
pub mod job;
/// Table columns and the filters built on them
pub mod column;
pub mod predicate;
