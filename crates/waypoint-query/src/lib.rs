//! # waypoint-query
//!
//! Access to session hit streams for the analysis engine.
//!
//! - **HitStreamProvider**: trait every warehouse backend implements
//! - **InMemoryHitStore**: fixture-backed provider
//! - **PostgresHitStream**: sea-orm provider over a hits table
//!
//! Also home of the hit model, path normalization, step value patterns and
//! the parameterised query type shared by the SQL renderers.

pub mod error;
pub mod memory;
pub mod normalize;
pub mod pattern;
pub mod postgres;
pub mod sql;
pub mod traits;
pub mod types;

pub use error::{DataError, Result};
pub use memory::InMemoryHitStore;
pub use normalize::normalize_path;
pub use pattern::{PatternError, ValuePattern, WILDCARD};
pub use postgres::{filter_condition, PostgresHitStream};
pub use sql::{validate_table_name, CompiledQuery, QueryBuilder, QueryParam};
pub use traits::HitStreamProvider;
pub use types::*;
