//! Store Module
//!
//! The authoritative in-memory key-value state.
//!
//! ## Responsibilities
//! - Fast reads and writes in memory
//! - Many concurrent readers, one exclusive writer
//! - Typed not-found results for absent keys
//!
//! ## Data Structure Choice
//! A `HashMap` behind a `parking_lot::RwLock`. Keys carry no ordering
//! semantics; durability comes from the transaction log, never from the map.

mod table;

pub use table::KeyValueStore;
