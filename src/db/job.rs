//! Job records: loading, inserting and updating rows of the `job` table
//!
//! Functions take a `&Connection` so they compose inside a caller's
//! transaction (`rusqlite::Transaction` derefs to `Connection`).

pub mod load;
pub mod record;
pub mod state;
pub mod update;
