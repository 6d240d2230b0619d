//! Registry-aware single and bulk record operations.

use crate::error::{OrmError, OrmResult};
use crate::id::IdGenerator;
use crate::model::Model;
use crate::query::QuerySet;
use crate::registry::ModelRegistry;
use crate::schema::{FieldKind, RecordSchema};
use crate::value::{field_values, get_field_value, set_field_value, FieldValue};
use esorm_gateway::{
    build_filter, first_lower, BulkBody, BulkResponse, FilterTerm, Gateway, GatewayError,
    SearchQuery,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::any::type_name;
use std::sync::Arc;
use tracing::{debug, error, info};

/// Entry point for model registration, queries and record writes.
///
/// Cheap to share: it holds the gateway and registry behind `Arc`s.
pub struct Orm {
    gateway: Arc<Gateway>,
    registry: Arc<ModelRegistry>,
    ids: IdGenerator,
}

impl Orm {
    /// Creates an ORM with an empty registry.
    pub fn new(gateway: Arc<Gateway>) -> Self {
        Self::with_registry(gateway, Arc::new(ModelRegistry::new()))
    }

    /// Creates an ORM over an existing registry.
    pub fn with_registry(gateway: Arc<Gateway>, registry: Arc<ModelRegistry>) -> Self {
        Self {
            gateway,
            registry,
            ids: IdGenerator::new(),
        }
    }

    /// Returns the gateway.
    pub fn gateway(&self) -> &Arc<Gateway> {
        &self.gateway
    }

    /// Returns the model registry.
    pub fn registry(&self) -> &Arc<ModelRegistry> {
        &self.registry
    }

    /// Registers `T` under the configured index prefix and provisions its
    /// index template.
    ///
    /// # Panics
    ///
    /// Panics when `T`'s schema descriptor is invalid. That is a wiring
    /// defect to be fixed in code, not a runtime condition; use
    /// [`try_register_model`](Self::try_register_model) to handle it.
    pub fn register_model<T: Model>(&self) -> OrmResult<Arc<RecordSchema>> {
        let prefix = self.gateway.config().index_prefix.clone();
        self.register_model_with_prefix::<T>(&prefix)
    }

    /// Like [`register_model`](Self::register_model) with an explicit prefix.
    ///
    /// # Panics
    ///
    /// Panics when `T`'s schema descriptor is invalid.
    pub fn register_model_with_prefix<T: Model>(
        &self,
        prefix: &str,
    ) -> OrmResult<Arc<RecordSchema>> {
        match self.try_register_model_with_prefix::<T>(prefix) {
            Err(OrmError::Schema(err)) => panic!("cannot register {}: {err}", type_name::<T>()),
            other => other,
        }
    }

    /// Registers `T` under the configured index prefix, returning schema
    /// defects as errors.
    pub fn try_register_model<T: Model>(&self) -> OrmResult<Arc<RecordSchema>> {
        let prefix = self.gateway.config().index_prefix.clone();
        self.try_register_model_with_prefix::<T>(&prefix)
    }

    /// Registers `T` with an explicit prefix, returning schema defects as
    /// errors.
    pub fn try_register_model_with_prefix<T: Model>(
        &self,
        prefix: &str,
    ) -> OrmResult<Arc<RecordSchema>> {
        let schema = self.registry.register::<T>(prefix)?;
        match self.gateway.create_template(
            &schema.template_name(),
            schema.index_name(),
            &schema.properties(),
        ) {
            Ok(()) => {}
            Err(err) if err.is_already_exists() => {
                info!(index = schema.index_name(), "template already exists");
            }
            Err(err) => {
                error!(index = schema.index_name(), "template creation failed: {}", err);
                return Err(err.into());
            }
        }
        Ok(schema)
    }

    /// Returns the schema of `T`.
    pub fn schema<T: Model>(&self) -> OrmResult<Arc<RecordSchema>> {
        self.registry
            .get::<T>()
            .ok_or_else(|| OrmError::NotRegistered(type_name::<T>().to_string()))
    }

    /// Starts a query over `T`'s index.
    pub fn query<T: Model>(&self) -> OrmResult<QuerySet<'_, T>> {
        Ok(QuerySet::new(&self.gateway, self.schema::<T>()?))
    }

    /// Inserts a record and returns its id.
    ///
    /// An unset primary key (zero, empty or null) is filled with a
    /// millisecond id first. The write is a create, so an existing id fails
    /// with a conflict instead of being overwritten.
    pub fn insert<T: Model>(&self, record: &mut T) -> OrmResult<String> {
        let schema = self.schema::<T>()?;
        let id = self.assign_id(&schema, record)?;
        self.gateway
            .create_doc(schema.index_name(), Some(id.as_str()), &*record)?;
        debug!(index = schema.index_name(), id = %id, "record inserted");
        Ok(id)
    }

    /// Inserts records with one bulk request and returns how many were
    /// written.
    ///
    /// Ids are assigned in input order before anything is sent. Fails with
    /// bad arguments, without reaching the backend, when `records` is
    /// empty. The first failed item, if any, is returned as a backend error.
    pub fn insert_multi<T: Model>(&self, records: &mut [T]) -> OrmResult<u64> {
        if records.is_empty() {
            return Err(OrmError::bad_arguments("insert_multi requires at least one record"));
        }
        let schema = self.schema::<T>()?;

        let mut body = BulkBody::new();
        for record in records.iter_mut() {
            let id = self.assign_id(&schema, record)?;
            body.create(schema.index_name(), Some(id.as_str()), &*record)?;
        }
        let response = self.gateway.send_bulk(&body)?;
        check_bulk(&response)?;
        Ok(records.len() as u64)
    }

    /// Writes `columns` of a record (every registered field when empty) to
    /// the stored document with the same primary key.
    pub fn update<T: Model>(&self, record: &T, columns: &[&str]) -> OrmResult<()> {
        let schema = self.schema::<T>()?;
        let id = primary_key(&schema, record)?;
        let columns = resolve_columns(&schema, columns)?;

        let source = match serde_json::to_value(record)? {
            Value::Object(map) => map,
            _ => return Err(OrmError::bad_arguments("record must serialize to an object")),
        };
        let partial: Map<String, Value> = columns
            .into_iter()
            .filter_map(|column| source.get(&column).cloned().map(|value| (column, value)))
            .collect();

        self.gateway
            .update_doc(schema.index_name(), &id.to_string(), &partial)?;
        Ok(())
    }

    /// Deletes records.
    ///
    /// Without columns, deletes the document with the record's primary key
    /// and returns 1, or 0 if it did not exist. With columns, deletes every
    /// document whose fields equal the record's current values and returns
    /// the deleted count.
    pub fn delete<T: Model>(&self, record: &T, columns: &[&str]) -> OrmResult<u64> {
        let schema = self.schema::<T>()?;
        if columns.is_empty() {
            let id = primary_key(&schema, record)?;
            let deleted = self.gateway.delete_doc(schema.index_name(), &id.to_string())?;
            return Ok(u64::from(deleted));
        }

        let filter = self.equality_filter(&schema, record, columns)?;
        Ok(self.gateway.delete_by_query(schema.index_name(), &filter)?)
    }

    /// Loads the stored record whose `columns` equal the given record's
    /// values (the primary key when `columns` is empty).
    ///
    /// Returns [`OrmError::NoRows`] when nothing matches.
    pub fn read<T: Model>(&self, record: &T, columns: &[&str]) -> OrmResult<T> {
        let schema = self.schema::<T>()?;
        let filter = if columns.is_empty() {
            let id = primary_key(&schema, record)?;
            build_filter(&[FilterTerm::eq(schema.primary_key(), id.to_json())])
        } else {
            self.equality_filter(&schema, record, columns)?
        };

        let query = SearchQuery {
            size: 1,
            filter,
            ..SearchQuery::default()
        };
        let response = self.gateway.search(&[schema.index_name()], &query)?;
        match response.first_source() {
            Some(source) => Ok(T::deserialize(source)?),
            None => Err(OrmError::NoRows),
        }
    }

    /// Like [`read`](Self::read), with no rows mapped to `None`.
    pub fn find<T: Model>(&self, record: &T, columns: &[&str]) -> OrmResult<Option<T>> {
        match self.read(record, columns) {
            Ok(found) => Ok(Some(found)),
            Err(OrmError::NoRows) => Ok(None),
            Err(err) => Err(err),
        }
    }

    /// Loads a record by document id.
    pub fn get<T: Model>(&self, id: &str) -> OrmResult<Option<T>> {
        let schema = self.schema::<T>()?;
        match self.gateway.get_doc(schema.index_name(), id)? {
            Some(source) => Ok(Some(serde_json::from_value(source)?)),
            None => Ok(None),
        }
    }

    /// Merges the same partial document into every listed record with one
    /// bulk request. Returns the number of ids sent.
    pub fn update_many_by_id<T: Model, P: Serialize + ?Sized>(
        &self,
        ids: &[&str],
        partial: &P,
    ) -> OrmResult<u64> {
        if ids.is_empty() {
            return Err(OrmError::bad_arguments("update_many_by_id requires at least one id"));
        }
        let schema = self.schema::<T>()?;

        let mut body = BulkBody::new();
        for id in ids {
            body.update(schema.index_name(), id, partial)?;
        }
        let response = self.gateway.send_bulk(&body)?;
        check_bulk(&response)?;
        Ok(ids.len() as u64)
    }

    /// Fills an unset primary key with a generated id and returns the
    /// record's id as a string.
    fn assign_id<T: Model>(&self, schema: &RecordSchema, record: &mut T) -> OrmResult<String> {
        let field = schema.primary_key();
        match get_field_value(record, field)? {
            Some(value) if !value.is_zero() => Ok(value.to_string()),
            Some(FieldValue::Str(_)) => self.assign_string_id(record, field),
            Some(_) => self.assign_int_id(record, field),
            // A null key takes its shape from the declared kind.
            None => match schema.field(field).map(|def| def.kind) {
                Some(FieldKind::String | FieldKind::Other) => self.assign_string_id(record, field),
                _ => self.assign_int_id(record, field),
            },
        }
    }

    fn assign_string_id<T: Model>(&self, record: &mut T, field: &str) -> OrmResult<String> {
        let id = self.ids.next_id().to_string();
        set_field_value(record, field, FieldValue::Str(id.clone()))?;
        Ok(id)
    }

    fn assign_int_id<T: Model>(&self, record: &mut T, field: &str) -> OrmResult<String> {
        let id = self.ids.next_id();
        set_field_value(record, field, FieldValue::Int(id))?;
        Ok(id.to_string())
    }

    fn equality_filter<T: Model>(
        &self,
        schema: &RecordSchema,
        record: &T,
        columns: &[&str],
    ) -> OrmResult<Vec<Value>> {
        let columns = resolve_columns(schema, columns)?;
        if columns.iter().any(|c| c.as_str() == schema.primary_key()) {
            primary_key(schema, record)?;
        }
        let terms: Vec<FilterTerm> = field_values(record, &columns)?
            .into_iter()
            .map(|(field, value)| FilterTerm::eq(field, value))
            .collect();
        Ok(build_filter(&terms))
    }
}

/// Returns the record's primary key, failing when it is unset.
fn primary_key<T: Model>(schema: &RecordSchema, record: &T) -> OrmResult<FieldValue> {
    match get_field_value(record, schema.primary_key())? {
        Some(value) if !value.is_zero() => Ok(value),
        _ => Err(OrmError::MissingPrimaryKey {
            model: schema.name().to_string(),
            field: schema.primary_key().to_string(),
        }),
    }
}

/// Normalizes column names and checks them against the schema. Empty means
/// every registered field.
fn resolve_columns(schema: &RecordSchema, columns: &[&str]) -> OrmResult<Vec<String>> {
    if columns.is_empty() {
        return Ok(schema.field_names().into_iter().map(String::from).collect());
    }
    columns
        .iter()
        .map(|column| {
            let name = first_lower(column);
            if schema.has_field(&name) || name == schema.primary_key() {
                Ok(name)
            } else {
                Err(OrmError::bad_arguments(format!(
                    "{} has no field `{}`",
                    schema.name(),
                    name
                )))
            }
        })
        .collect()
}

fn check_bulk(response: &BulkResponse) -> OrmResult<()> {
    match response.first_error() {
        Some(err) => Err(GatewayError::Backend(err.clone()).into()),
        None => Ok(()),
    }
}
