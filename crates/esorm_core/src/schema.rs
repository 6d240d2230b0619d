//! Schema descriptors.
//!
//! A record type declares its persisted fields once through a
//! [`SchemaBuilder`]; the result is an immutable [`RecordSchema`] holding the
//! index name, primary key and backend field mappings.

use esorm_gateway::{first_lower, Property};
use serde_json::{Map, Value};
use std::any::TypeId;
use thiserror::Error;

/// Primary key used when no field is marked with
/// [`SchemaBuilder::primary_key`].
pub const DEFAULT_PRIMARY_KEY: &str = "id";

/// Language-level kind of a persisted field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldKind {
    /// `bool`
    Bool,
    /// `f32`
    F32,
    /// `f64`
    F64,
    /// `i8`
    I8,
    /// `i16`
    I16,
    /// `i32`
    I32,
    /// `i64`
    I64,
    /// A map or nested struct.
    Map,
    /// A sequence of values.
    Seq,
    /// A point in time.
    Timestamp,
    /// A string.
    String,
    /// Anything else; stored as an exact-match keyword.
    Other,
}

impl FieldKind {
    /// Returns the backend field type this kind maps to.
    pub fn backend_type(&self) -> &'static str {
        match self {
            FieldKind::Bool => "boolean",
            FieldKind::F32 => "float",
            FieldKind::F64 => "double",
            FieldKind::I8 => "byte",
            FieldKind::I16 => "short",
            FieldKind::I32 => "integer",
            FieldKind::I64 => "long",
            FieldKind::Map => "object",
            FieldKind::Seq => "nested",
            FieldKind::Timestamp => "date",
            FieldKind::String | FieldKind::Other => "keyword",
        }
    }
}

/// A declared field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDef {
    /// Field name as stored.
    pub name: String,
    /// Declared kind.
    pub kind: FieldKind,
    /// Backend type override.
    pub mapping: Option<String>,
}

impl FieldDef {
    /// Returns the backend mapping for this field.
    pub fn property(&self) -> Property {
        let field_type = self
            .mapping
            .as_deref()
            .unwrap_or_else(|| self.kind.backend_type());
        if field_type == "date" {
            Property::date()
        } else {
            Property::of(field_type)
        }
    }
}

/// Errors in a schema descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaError {
    /// A field was declared twice.
    #[error("{model}: duplicate field `{field}`")]
    DuplicateField {
        /// Model type name.
        model: String,
        /// Field name.
        field: String,
    },

    /// More than one field was marked as primary key.
    #[error("{model}: primary key declared on both `{first}` and `{second}`")]
    DuplicatePrimaryKey {
        /// Model type name.
        model: String,
        /// First primary key.
        first: String,
        /// Second primary key.
        second: String,
    },

    /// `primary_key` or `mapping` was called before any field.
    #[error("{model}: `{modifier}` must follow a field declaration")]
    DanglingModifier {
        /// Model type name.
        model: String,
        /// Modifier name.
        modifier: &'static str,
    },

    /// The primary key was placed on a skipped field.
    #[error("{model}: skipped field `{field}` cannot be the primary key")]
    SkippedPrimaryKey {
        /// Model type name.
        model: String,
        /// Field name.
        field: String,
    },

    /// No persisted field was declared.
    #[error("{model}: no persisted fields")]
    NoFields {
        /// Model type name.
        model: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Last {
    Field(usize),
    Skipped(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Defect {
    Duplicate(usize),
    DuplicatePk(usize, usize),
    Dangling(&'static str),
    SkippedPk(usize),
}

/// Collects the field declarations of one record type.
///
/// Modifiers ([`primary_key`](Self::primary_key), [`mapping`](Self::mapping))
/// apply to the most recently declared field. Defects are reported when the
/// schema is built, so `describe` implementations can chain freely.
///
/// ```
/// use esorm_core::{FieldKind, SchemaBuilder};
///
/// let mut schema = SchemaBuilder::new();
/// schema
///     .field("Sn", FieldKind::String).primary_key()
///     .field("CreateTime", FieldKind::String).mapping("date")
///     .skip("Cache");
/// ```
#[derive(Debug, Default)]
pub struct SchemaBuilder {
    fields: Vec<FieldDef>,
    skipped: Vec<String>,
    primary_key: Option<usize>,
    last: Option<Last>,
    defect: Option<Defect>,
}

impl SchemaBuilder {
    /// Creates an empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares a persisted field. The name is stored lowercase-first.
    pub fn field(&mut self, name: &str, kind: FieldKind) -> &mut Self {
        let name = first_lower(name);
        if self.contains(&name) {
            self.flag(Defect::Duplicate(self.fields.len()));
        }
        self.fields.push(FieldDef {
            name,
            kind,
            mapping: None,
        });
        self.last = Some(Last::Field(self.fields.len() - 1));
        self
    }

    /// Marks the last declared field as primary key.
    pub fn primary_key(&mut self) -> &mut Self {
        let current = self.primary_key;
        match self.last {
            Some(Last::Field(idx)) => match current {
                Some(first) if first != idx => self.flag(Defect::DuplicatePk(first, idx)),
                _ => self.primary_key = Some(idx),
            },
            Some(Last::Skipped(idx)) => self.flag(Defect::SkippedPk(idx)),
            None => self.flag(Defect::Dangling("primary_key")),
        }
        self
    }

    /// Overrides the backend type of the last declared field.
    pub fn mapping(&mut self, field_type: &str) -> &mut Self {
        match self.last {
            Some(Last::Field(idx)) => self.fields[idx].mapping = Some(field_type.to_string()),
            _ => self.flag(Defect::Dangling("mapping")),
        }
        self
    }

    /// Declares a field that is never persisted.
    pub fn skip(&mut self, name: &str) -> &mut Self {
        let name = first_lower(name);
        self.skipped.push(name);
        self.last = Some(Last::Skipped(self.skipped.len() - 1));
        self
    }

    fn contains(&self, name: &str) -> bool {
        self.fields.iter().any(|f| f.name == name) || self.skipped.iter().any(|s| s == name)
    }

    fn flag(&mut self, defect: Defect) {
        if self.defect.is_none() {
            self.defect = Some(defect);
        }
    }

    /// Validates the declarations and produces the schema.
    pub(crate) fn build(self, identity: ModelIdentity) -> Result<RecordSchema, SchemaError> {
        let model = identity.name.clone();
        if let Some(defect) = self.defect {
            return Err(match defect {
                Defect::Duplicate(idx) => SchemaError::DuplicateField {
                    model,
                    field: self.fields[idx].name.clone(),
                },
                Defect::DuplicatePk(first, second) => SchemaError::DuplicatePrimaryKey {
                    model,
                    first: self.fields[first].name.clone(),
                    second: self.fields[second].name.clone(),
                },
                Defect::Dangling(modifier) => SchemaError::DanglingModifier { model, modifier },
                Defect::SkippedPk(idx) => SchemaError::SkippedPrimaryKey {
                    model,
                    field: self.skipped[idx].clone(),
                },
            });
        }
        if self.fields.is_empty() {
            return Err(SchemaError::NoFields { model });
        }

        let primary_key = match self.primary_key {
            Some(idx) => self.fields[idx].name.clone(),
            None => DEFAULT_PRIMARY_KEY.to_string(),
        };

        Ok(RecordSchema {
            type_id: identity.type_id,
            full_name: identity.full_name,
            name: identity.name,
            index_name: identity.index_name,
            primary_key,
            fields: self.fields,
        })
    }
}

/// Naming facts about a record type, resolved before its schema is built.
#[derive(Debug, Clone)]
pub(crate) struct ModelIdentity {
    pub type_id: TypeId,
    pub full_name: String,
    pub name: String,
    pub index_name: String,
}

/// The registered schema of one record type. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordSchema {
    type_id: TypeId,
    full_name: String,
    name: String,
    index_name: String,
    primary_key: String,
    fields: Vec<FieldDef>,
}

impl RecordSchema {
    /// Returns the type id of the record type.
    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    /// Returns the fully qualified type name.
    pub fn full_name(&self) -> &str {
        &self.full_name
    }

    /// Returns the simple type name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the resolved index name, prefix included.
    pub fn index_name(&self) -> &str {
        &self.index_name
    }

    /// Returns the template name used for this index.
    pub fn template_name(&self) -> String {
        format!("{}-template", self.index_name)
    }

    /// Returns the primary key field.
    pub fn primary_key(&self) -> &str {
        &self.primary_key
    }

    /// Returns the persisted fields in declaration order.
    pub fn fields(&self) -> &[FieldDef] {
        &self.fields
    }

    /// Returns the persisted field names in declaration order.
    pub fn field_names(&self) -> Vec<&str> {
        self.fields.iter().map(|f| f.name.as_str()).collect()
    }

    /// Returns the declared field called `name`.
    pub fn field(&self, name: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Returns true when `name` is a persisted field.
    pub fn has_field(&self, name: &str) -> bool {
        self.fields.iter().any(|f| f.name == name)
    }

    /// Returns the `mappings.properties` object.
    pub fn properties(&self) -> Map<String, Value> {
        self.fields
            .iter()
            .filter_map(|f| {
                serde_json::to_value(f.property())
                    .ok()
                    .map(|property| (f.name.clone(), property))
            })
            .collect()
    }
}

/// Returns the last path segment of a type name, without generics.
pub(crate) fn simple_name(full_name: &str) -> &str {
    let base = full_name.split('<').next().unwrap_or(full_name);
    base.rsplit("::").next().unwrap_or(base)
}
