//! Runtime for recordql.
//!
//! This crate turns GraphQL response JSON into records:
//! - `record`: Identity-stable record handles with change tracking
//! - `list`: Paginated, mutable record lists
//! - `store`: Per-client identity map from `(model, id)` to records
//! - `hydrator`: Response to record hydration and merging
//! - `error`: Hydration and record errors

pub mod error;
pub mod hydrator;
pub mod list;
pub mod record;
pub mod store;

pub use error::{HydrateError, HydrateResult, RecordError, ValidationError};
pub use hydrator::{HydratedResult, Hydrator};
pub use list::{PageInfo, RecordList};
pub use record::{Change, Record, RecordState};
pub use store::{RecordKey, RecordStore};
