//! Model registry.

use crate::model::Model;
use crate::schema::{simple_name, ModelIdentity, RecordSchema, SchemaBuilder, SchemaError};
use parking_lot::RwLock;
use std::any::{type_name, TypeId};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

#[derive(Default)]
struct Maps {
    by_type: HashMap<TypeId, Arc<RecordSchema>>,
    by_index: HashMap<String, Arc<RecordSchema>>,
}

/// Registry of record schemas, keyed by record type and by index name.
///
/// Both maps are updated under one lock, so lookups never observe a type
/// and an index that disagree. Registration is expected at startup but is
/// safe at any time.
#[derive(Default)]
pub struct ModelRegistry {
    maps: RwLock<Maps>,
}

impl ModelRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds and stores the schema of `T`, with `prefix` prepended to its
    /// index name.
    ///
    /// Registering again replaces the previous schema of `T`. If another
    /// type already owns the resolved index name, that type is unregistered:
    /// the last registration wins.
    pub fn register<T: Model>(&self, prefix: &str) -> Result<Arc<RecordSchema>, SchemaError> {
        let full_name = type_name::<T>();
        let name = simple_name(full_name).to_string();
        let base = T::index_name().unwrap_or_else(|| name.to_lowercase());
        let identity = ModelIdentity {
            type_id: TypeId::of::<T>(),
            full_name: full_name.to_string(),
            index_name: format!("{prefix}{base}"),
            name,
        };

        let mut builder = SchemaBuilder::new();
        T::describe(&mut builder);
        let schema = Arc::new(builder.build(identity)?);

        let mut maps = self.maps.write();
        if let Some(previous) = maps.by_type.remove(&schema.type_id()) {
            maps.by_index.remove(previous.index_name());
        }
        if let Some(displaced) = maps.by_index.remove(schema.index_name()) {
            warn!(
                index = schema.index_name(),
                previous = displaced.full_name(),
                model = schema.full_name(),
                "index re-registered by another model"
            );
            maps.by_type.remove(&displaced.type_id());
        }
        maps.by_type.insert(schema.type_id(), Arc::clone(&schema));
        maps.by_index
            .insert(schema.index_name().to_string(), Arc::clone(&schema));
        debug!(model = schema.full_name(), index = schema.index_name(), "model registered");

        Ok(schema)
    }

    /// Returns the schema of `T`.
    pub fn get<T: Model>(&self) -> Option<Arc<RecordSchema>> {
        self.get_by_type_id(TypeId::of::<T>())
    }

    /// Returns the schema registered for a type id.
    pub fn get_by_type_id(&self, type_id: TypeId) -> Option<Arc<RecordSchema>> {
        self.maps.read().by_type.get(&type_id).cloned()
    }

    /// Returns the schema registered for an index name.
    pub fn get_by_index_name(&self, index: &str) -> Option<Arc<RecordSchema>> {
        self.maps.read().by_index.get(index).cloned()
    }

    /// Returns the registered index names, sorted.
    pub fn index_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.maps.read().by_index.keys().cloned().collect();
        names.sort();
        names
    }

    /// Returns the number of registered models.
    pub fn len(&self) -> usize {
        self.maps.read().by_type.len()
    }

    /// Returns true when nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::FieldKind;
    use proptest::prelude::*;
    use serde::{Deserialize, Serialize};

    #[derive(Default, Serialize, Deserialize)]
    struct Device {
        id: String,
    }

    impl Model for Device {
        fn describe(schema: &mut SchemaBuilder) {
            schema.field("Id", FieldKind::String);
        }
    }

    #[derive(Default, Serialize, Deserialize)]
    struct DeviceV2 {
        id: String,
    }

    impl Model for DeviceV2 {
        fn describe(schema: &mut SchemaBuilder) {
            schema.field("Id", FieldKind::String);
        }

        fn index_name() -> Option<String> {
            Some("device".into())
        }
    }

    #[derive(Default, Serialize, Deserialize)]
    struct Broken {
        id: String,
    }

    impl Model for Broken {
        fn describe(schema: &mut SchemaBuilder) {
            schema.primary_key();
        }
    }

    /// Checks that every entry in one map has its mirror in the other.
    fn assert_consistent(registry: &ModelRegistry) {
        let maps = registry.maps.read();
        assert_eq!(maps.by_type.len(), maps.by_index.len());
        for (index, schema) in &maps.by_index {
            assert_eq!(schema.index_name(), index);
            let by_type = maps.by_type.get(&schema.type_id()).unwrap();
            assert!(Arc::ptr_eq(by_type, schema));
        }
    }

    #[test]
    fn lookups_by_type_and_index() {
        let registry = ModelRegistry::new();
        let schema = registry.register::<Device>("goiot-").unwrap();

        assert_eq!(schema.name(), "Device");
        assert_eq!(schema.index_name(), "goiot-device");
        assert!(schema.full_name().ends_with("::Device"));
        assert!(registry.get::<Device>().is_some());
        assert!(registry.get_by_index_name("goiot-device").is_some());
        assert!(registry.get_by_index_name("device").is_none());
        assert!(registry.get::<DeviceV2>().is_none());
    }

    #[test]
    fn registering_twice_is_idempotent() {
        let registry = ModelRegistry::new();
        let first = registry.register::<Device>("goiot-").unwrap();
        let second = registry.register::<Device>("goiot-").unwrap();

        assert_eq!(*first, *second);
        assert_eq!(registry.len(), 1);
        assert_consistent(&registry);
    }

    #[test]
    fn new_prefix_replaces_old_index() {
        let registry = ModelRegistry::new();
        registry.register::<Device>("a-").unwrap();
        registry.register::<Device>("b-").unwrap();

        assert_eq!(registry.index_names(), vec!["b-device"]);
        assert_consistent(&registry);
    }

    #[test]
    fn last_registration_of_an_index_wins() {
        let registry = ModelRegistry::new();
        registry.register::<Device>("goiot-").unwrap();
        registry.register::<DeviceV2>("goiot-").unwrap();

        assert!(registry.get::<Device>().is_none());
        let schema = registry.get_by_index_name("goiot-device").unwrap();
        assert_eq!(schema.type_id(), TypeId::of::<DeviceV2>());
        assert_consistent(&registry);
    }

    #[test]
    fn broken_descriptor_is_not_registered() {
        let registry = ModelRegistry::new();
        assert!(registry.register::<Broken>("").is_err());
        assert!(registry.is_empty());
    }

    proptest! {
        #[test]
        fn maps_stay_consistent(ops in prop::collection::vec((0u8..2, 0u8..3), 1..24)) {
            let registry = ModelRegistry::new();
            let prefixes = ["", "goiot-", "test-"];
            for (model, prefix) in ops {
                let prefix = prefixes[prefix as usize];
                let result = match model {
                    0 => registry.register::<Device>(prefix),
                    _ => registry.register::<DeviceV2>(prefix),
                };
                prop_assert!(result.is_ok());
                assert_consistent(&registry);
            }
        }
    }
}
