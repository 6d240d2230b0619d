//! Fixture models and ORM helpers.
//!
//! The models mirror the records of the device-management platform the
//! ORM serves: string and integer primary keys, object-valued fields and
//! date-mapped timestamps.

use crate::memory::MemoryBackend;
use esorm_core::{FieldKind, Model, Orm, SchemaBuilder};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

/// A registered device. String primary key.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Device {
    /// Device id.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Owning product.
    pub product_id: String,
    /// `online`, `offline`, `unknown` or `noActive`.
    pub state: String,
    /// Configuration properties.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metaconfig: Option<Value>,
    /// Free-form tags.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tag: Option<Value>,
    /// Description.
    pub desc: String,
    /// Creating user.
    pub create_id: i64,
    /// Creation time, `yyyy-MM-dd HH:mm:ss`.
    pub create_time: String,
}

impl Model for Device {
    fn describe(schema: &mut SchemaBuilder) {
        schema
            .field("Id", FieldKind::String)
            .primary_key()
            .field("Name", FieldKind::String)
            .field("ProductId", FieldKind::String)
            .field("State", FieldKind::String)
            .field("Metaconfig", FieldKind::Map)
            .field("Tag", FieldKind::Map)
            .field("Desc", FieldKind::String)
            .field("CreateId", FieldKind::I64)
            .field("CreateTime", FieldKind::String)
            .mapping("date");
    }
}

impl Device {
    /// Creates an online device of a product.
    pub fn new(id: &str, name: &str, product_id: &str) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            product_id: product_id.to_string(),
            state: "online".to_string(),
            create_time: "2023-05-01 08:00:00".to_string(),
            ..Self::default()
        }
    }
}

/// A product definition. String primary key.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Product {
    /// Product id.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Product type.
    pub type_id: String,
    /// Enabled.
    pub state: bool,
    /// `es` or `mock`.
    pub store_policy: String,
    /// Codec id.
    pub codec_id: String,
    /// Cached codec script; never persisted.
    #[serde(skip)]
    pub script: String,
    /// Creation time.
    pub create_time: String,
}

impl Model for Product {
    fn describe(schema: &mut SchemaBuilder) {
        schema
            .field("Id", FieldKind::String)
            .primary_key()
            .field("Name", FieldKind::String)
            .field("TypeId", FieldKind::String)
            .field("State", FieldKind::Bool)
            .field("StorePolicy", FieldKind::String)
            .field("CodecId", FieldKind::String)
            .skip("Script")
            .field("CreateTime", FieldKind::Timestamp);
    }
}

/// A network listener configuration. Integer primary key.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Network {
    /// Network id.
    pub id: i64,
    /// Display name.
    pub name: String,
    /// Listening port.
    pub port: i32,
    /// Bound product.
    pub product_id: String,
    /// `MQTT_BROKER`, `TCP_SERVER`, ...
    #[serde(rename = "type")]
    pub network_type: String,
    /// `running` or `stop`.
    pub state: String,
}

impl Model for Network {
    fn describe(schema: &mut SchemaBuilder) {
        schema
            .field("Id", FieldKind::I64)
            .primary_key()
            .field("Name", FieldKind::String)
            .field("Port", FieldKind::I32)
            .field("ProductId", FieldKind::String)
            .field("Type", FieldKind::String)
            .field("State", FieldKind::String);
    }

    fn index_name() -> Option<String> {
        Some("network-config".to_string())
    }
}

/// An alarm raised by a rule. Integer primary key.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AlarmLog {
    /// Alarm id.
    pub id: i64,
    /// Raising rule.
    pub rule_id: i64,
    /// Alarm name.
    pub alarm_name: String,
    /// Device the alarm concerns.
    pub device_id: String,
    /// Product of the device.
    pub product_id: String,
    /// `open` or `solve`.
    pub state: String,
    /// Raw alarm payload.
    pub alarm_data: String,
    /// Creation time.
    pub create_time: String,
}

impl Model for AlarmLog {
    fn describe(schema: &mut SchemaBuilder) {
        schema
            .field("Id", FieldKind::I64)
            .primary_key()
            .field("RuleId", FieldKind::I64)
            .field("AlarmName", FieldKind::String)
            .field("DeviceId", FieldKind::String)
            .field("ProductId", FieldKind::String)
            .field("State", FieldKind::String)
            .field("AlarmData", FieldKind::String)
            .field("CreateTime", FieldKind::Timestamp);
    }

    fn index_name() -> Option<String> {
        Some("alarm-log".to_string())
    }
}

/// A test ORM over a fresh [`MemoryBackend`].
pub struct TestOrm {
    /// The ORM.
    pub orm: Orm,
    /// The backend, for inspecting stored documents and call counts.
    pub backend: Arc<MemoryBackend>,
}

impl TestOrm {
    /// Creates an ORM with no registered models.
    pub fn new() -> Self {
        let backend = MemoryBackend::new();
        let orm = Orm::new(Arc::new(backend.gateway()));
        Self { orm, backend }
    }

    /// Creates an ORM with every fixture model registered, and a clean
    /// request log.
    pub fn with_fixtures() -> Self {
        let test = Self::new();
        test.orm
            .register_model::<Device>()
            .expect("Failed to register Device");
        test.orm
            .register_model::<Product>()
            .expect("Failed to register Product");
        test.orm
            .register_model::<Network>()
            .expect("Failed to register Network");
        test.orm
            .register_model::<AlarmLog>()
            .expect("Failed to register AlarmLog");
        test.backend.clear_log();
        test
    }
}

impl Default for TestOrm {
    fn default() -> Self {
        Self::new()
    }
}

impl std::ops::Deref for TestOrm {
    type Target = Orm;

    fn deref(&self) -> &Self::Target {
        &self.orm
    }
}

/// Runs a test with an ORM over a fresh backend with every fixture model
/// registered.
///
/// # Example
///
/// ```rust,ignore
/// use esorm_testkit::{with_test_orm, Device};
///
/// #[test]
/// fn my_test() {
///     with_test_orm(|orm| {
///         let mut device = Device::new("d1", "gateway", "p1");
///         orm.insert(&mut device).unwrap();
///     });
/// }
/// ```
pub fn with_test_orm<F, R>(f: F) -> R
where
    F: FnOnce(&TestOrm) -> R,
{
    let test = TestOrm::with_fixtures();
    f(&test)
}

/// Devices `d01..=dNN` of product `p1`, with increasing creation times.
pub fn sample_devices(count: usize) -> Vec<Device> {
    (1..=count)
        .map(|n| {
            let mut device = Device::new(&format!("d{n:02}"), &format!("device {n}"), "p1");
            device.create_time = format!("2023-05-01 08:{:02}:00", n % 60);
            device.state = if n % 2 == 0 { "offline" } else { "online" }.to_string();
            device
        })
        .collect()
}
