//! Service Directory
//!
//! Maps RFCOMM service UUIDs to the port that currently serves them, playing
//! the part SDP records play on a real adapter. Listeners register on bind and
//! drop their record when they go away.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tracing::debug;

/// Shared UUID -> port table
#[derive(Debug, Clone, Default)]
pub struct ServiceDirectory {
    static_records: Arc<HashMap<String, u16>>,
    dynamic_records: Arc<RwLock<HashMap<String, u16>>>,
}

impl ServiceDirectory {
    /// Create a directory seeded with static records
    pub fn new(static_records: HashMap<String, u16>) -> Self {
        let static_records = static_records
            .into_iter()
            .map(|(uuid, port)| (normalize(&uuid), port))
            .collect();

        Self {
            static_records: Arc::new(static_records),
            dynamic_records: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Publish a record; it is withdrawn when the returned guard is dropped
    pub fn register(&self, uuid: &str, port: u16) -> ServiceRecord {
        let uuid = normalize(uuid);
        debug!("Registering service record {} -> port {}", uuid, port);
        if let Ok(mut records) = self.dynamic_records.write() {
            records.insert(uuid.clone(), port);
        }

        ServiceRecord {
            uuid,
            port,
            records: Arc::clone(&self.dynamic_records),
        }
    }

    /// Look up the port serving `uuid`; live listeners win over static records
    pub fn lookup(&self, uuid: &str) -> Option<u16> {
        let uuid = normalize(uuid);
        let dynamic = self
            .dynamic_records
            .read()
            .ok()
            .and_then(|records| records.get(&uuid).copied());

        dynamic.or_else(|| self.static_records.get(&uuid).copied())
    }
}

/// Registration guard for a published service record
#[derive(Debug)]
pub struct ServiceRecord {
    uuid: String,
    port: u16,
    records: Arc<RwLock<HashMap<String, u16>>>,
}

impl ServiceRecord {
    pub fn uuid(&self) -> &str {
        &self.uuid
    }

    pub fn port(&self) -> u16 {
        self.port
    }
}

impl Drop for ServiceRecord {
    fn drop(&mut self) {
        if let Ok(mut records) = self.records.write() {
            // A newer listener may have taken over the UUID
            if records.get(&self.uuid) == Some(&self.port) {
                records.remove(&self.uuid);
                debug!("Withdrew service record {}", self.uuid);
            }
        }
    }
}

fn normalize(uuid: &str) -> String {
    uuid.trim().to_ascii_lowercase()
}
