//! # esorm Core
//!
//! Object-to-document mapping for the esorm document store.
//!
//! This crate provides:
//! - Schema descriptors declared per record type ([`Model`], [`SchemaBuilder`])
//! - The [`ModelRegistry`], keyed by record type and by index name
//! - The fluent [`QuerySet`] builder (filter, sort, paging, cursor, count,
//!   scripted update)
//! - Single and bulk record operations on [`Orm`]
//!
//! ## Architecture
//!
//! Record types are registered once at startup. Registration builds an
//! immutable [`RecordSchema`] and provisions the index template through the
//! gateway. Queries stage their state locally and issue exactly one backend
//! round trip per terminal call.
//!
//! ## Key Invariants
//!
//! - The registry's two maps always agree; the last registration of an index wins
//! - Inserts never overwrite: an existing id is a conflict
//! - Updates and by-column deletes never run without a filter
//! - "Not found" is [`ErrorKind::NoRows`], never a hard failure

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod id;
mod model;
mod orm;
mod query;
mod registry;
mod schema;
mod value;

pub use error::{ErrorKind, OrmError, OrmResult};
pub use id::IdGenerator;
pub use model::Model;
pub use orm::Orm;
pub use query::{Page, Params, QuerySet, DEFAULT_PAGE_SIZE};
pub use registry::ModelRegistry;
pub use schema::{
    FieldDef, FieldKind, RecordSchema, SchemaBuilder, SchemaError, DEFAULT_PRIMARY_KEY,
};
pub use value::{get_field_value, set_field_value, FieldValue};
