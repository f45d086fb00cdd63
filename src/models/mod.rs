//! Schema models
//!
//! Tables, columns, indexes and foreign keys as read from a schema snapshot.

pub mod foreign_key;
pub mod table;

// Re-export commonly used types
pub use foreign_key::*;
pub use table::*;
