//! NDJSON bulk request bodies.

use crate::error::GatewayResult;
use serde::Serialize;
use serde_json::{json, Value};

/// Builder for a bulk request body.
///
/// Each action is one metadata line followed, except for `delete`, by one
/// source line. Metadata lines are produced by serde so index names and ids
/// are always escaped correctly.
#[derive(Debug, Clone, Default)]
pub struct BulkBody {
    buf: Vec<u8>,
    actions: usize,
}

impl BulkBody {
    /// Creates an empty body.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty body with preallocated capacity in bytes.
    pub fn with_capacity(bytes: usize) -> Self {
        Self {
            buf: Vec::with_capacity(bytes),
            actions: 0,
        }
    }

    /// Creates an empty body that writes into `buf`, keeping its allocation.
    pub fn reuse(mut buf: Vec<u8>) -> Self {
        buf.clear();
        Self { buf, actions: 0 }
    }

    /// Appends a `create` action; fails on the backend if the id exists.
    pub fn create<T: Serialize + ?Sized>(
        &mut self,
        index: &str,
        id: Option<&str>,
        doc: &T,
    ) -> GatewayResult<&mut Self> {
        self.action("create", index, id)?;
        self.source(doc)?;
        Ok(self)
    }

    /// Appends an `index` action (create or overwrite).
    pub fn index<T: Serialize + ?Sized>(
        &mut self,
        index: &str,
        id: Option<&str>,
        doc: &T,
    ) -> GatewayResult<&mut Self> {
        self.action("index", index, id)?;
        self.source(doc)?;
        Ok(self)
    }

    /// Appends an `update` action merging `partial` into the document.
    pub fn update<T: Serialize + ?Sized>(
        &mut self,
        index: &str,
        id: &str,
        partial: &T,
    ) -> GatewayResult<&mut Self> {
        self.action("update", index, Some(id))?;
        self.source(&json!({ "doc": partial }))?;
        Ok(self)
    }

    /// Appends a `delete` action.
    pub fn delete(&mut self, index: &str, id: &str) -> GatewayResult<&mut Self> {
        self.action("delete", index, Some(id))?;
        Ok(self)
    }

    /// Appends an `index` action whose source is already serialized.
    ///
    /// `source` must be a single line of JSON; a trailing newline is added
    /// when missing.
    pub fn raw(&mut self, index: &str, source: &[u8]) -> GatewayResult<&mut Self> {
        self.action("index", index, None)?;
        self.buf.extend_from_slice(source);
        if source.last() != Some(&b'\n') {
            self.buf.push(b'\n');
        }
        Ok(self)
    }

    fn action(&mut self, action: &str, index: &str, id: Option<&str>) -> GatewayResult<()> {
        let mut meta = json!({ "_index": index });
        if let Some(id) = id {
            meta["_id"] = Value::from(id);
        }
        serde_json::to_writer(&mut self.buf, &json!({ action: meta }))?;
        self.buf.push(b'\n');
        self.actions += 1;
        Ok(())
    }

    fn source<T: Serialize + ?Sized>(&mut self, doc: &T) -> GatewayResult<()> {
        serde_json::to_writer(&mut self.buf, doc)?;
        self.buf.push(b'\n');
        Ok(())
    }

    /// Number of actions in the body.
    pub fn len(&self) -> usize {
        self.actions
    }

    /// Returns true when no action has been added.
    pub fn is_empty(&self) -> bool {
        self.actions == 0
    }

    /// Returns the encoded body.
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    /// Consumes the builder and returns the encoded body.
    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }
}
