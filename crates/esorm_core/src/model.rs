//! The model trait implemented by persisted record types.

use crate::schema::SchemaBuilder;
use serde::de::DeserializeOwned;
use serde::Serialize;

/// A record type stored as documents in one backend index.
///
/// The serde representation is the document: field names declared in
/// [`describe`](Model::describe) must match the serialized names. Models
/// should derive `Default` and use `#[serde(default)]` so projected reads
/// (which return only some fields) still decode.
///
/// # Example
///
/// ```
/// use esorm_core::{FieldKind, Model, SchemaBuilder};
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Debug, Default, Serialize, Deserialize)]
/// #[serde(default, rename_all = "camelCase")]
/// struct Product {
///     id: String,
///     name: String,
///     create_time: String,
/// }
///
/// impl Model for Product {
///     fn describe(schema: &mut SchemaBuilder) {
///         schema
///             .field("Id", FieldKind::String)
///             .primary_key()
///             .field("Name", FieldKind::String)
///             .field("CreateTime", FieldKind::String)
///             .mapping("date");
///     }
/// }
/// ```
pub trait Model: Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Declares the persisted fields.
    fn describe(schema: &mut SchemaBuilder);

    /// Index name without prefix. Defaults to the lowercased type name.
    fn index_name() -> Option<String> {
        None
    }
}
