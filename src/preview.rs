//! ALFA Photo Capture - Preview Handles
//!
//! Revocable, locally-addressable references to captured bytes (the blob-URL
//! equivalent). A handle resolves until it is revoked; revoking twice is a
//! no-op.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use parking_lot::Mutex;
use serde::{Serialize, Serializer};
use uuid::Uuid;

/// Handle to registered preview bytes
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PreviewHandle {
    id: Uuid,
}

impl PreviewHandle {
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Locally-addressable URL for display
    pub fn url(&self) -> String {
        format!("blob:alfa-capture/{}", self.id)
    }
}

impl fmt::Display for PreviewHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.url())
    }
}

impl Serialize for PreviewHandle {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.url())
    }
}

struct PreviewEntry {
    bytes: Arc<[u8]>,
    mime_type: &'static str,
}

/// Registry of live preview handles
#[derive(Clone, Default)]
pub struct PreviewRegistry {
    entries: Arc<Mutex<HashMap<Uuid, PreviewEntry>>>,
}

impl PreviewRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `bytes` and return a fresh handle
    pub fn create(&self, bytes: Arc<[u8]>, mime_type: &'static str) -> PreviewHandle {
        let handle = PreviewHandle { id: Uuid::new_v4() };
        self.entries
            .lock()
            .insert(handle.id, PreviewEntry { bytes, mime_type });
        handle
    }

    /// Bytes behind a live handle
    pub fn resolve(&self, handle: &PreviewHandle) -> Option<Arc<[u8]>> {
        self.entries.lock().get(&handle.id).map(|e| Arc::clone(&e.bytes))
    }

    pub fn is_live(&self, handle: &PreviewHandle) -> bool {
        self.entries.lock().contains_key(&handle.id)
    }

    /// Render a live handle as a `data:` URL
    pub fn data_url(&self, handle: &PreviewHandle) -> Option<String> {
        let entries = self.entries.lock();
        let entry = entries.get(&handle.id)?;
        Some(format!("data:{};base64,{}", entry.mime_type, STANDARD.encode(&entry.bytes)))
    }

    /// Revoke a handle; true if it was live
    pub fn revoke(&self, handle: &PreviewHandle) -> bool {
        self.entries.lock().remove(&handle.id).is_some()
    }

    /// Number of handles not yet revoked
    pub fn outstanding(&self) -> usize {
        self.entries.lock().len()
    }
}

impl fmt::Debug for PreviewRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PreviewRegistry")
            .field("outstanding", &self.outstanding())
            .finish()
    }
}
