//! Connection Registry
//!
//! Maps generated identifiers to open connection records.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{debug, info};
use uuid::Uuid;

use super::record::{ConnectionInfo, ConnectionRecord};
use crate::error::{SocketError, SocketResult};

/// Identifier -> record table shared by the facade and the workers
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    connections: RwLock<HashMap<String, Arc<ConnectionRecord>>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a record under a fresh random identifier
    pub async fn add(&self, mut record: ConnectionRecord) -> String {
        let id = Uuid::new_v4().to_string();
        record.assign_id(id.clone());

        let mut connections = self.connections.write().await;
        info!(
            "Registered {:?} connection {} to {} ({})",
            record.direction(),
            id,
            record.remote_address(),
            record.kind()
        );
        connections.insert(id.clone(), Arc::new(record));
        id
    }

    /// Look up a record; an empty id selects the sole connection
    pub async fn resolve(&self, id: &str) -> SocketResult<Arc<ConnectionRecord>> {
        let connections = self.connections.read().await;

        if !id.is_empty() {
            return connections
                .get(id)
                .cloned()
                .ok_or_else(|| SocketError::NotFound { id: id.to_string() });
        }

        if connections.len() == 1 {
            if let Some(record) = connections.values().next() {
                return Ok(Arc::clone(record));
            }
        }

        Err(SocketError::AmbiguousOrNoConnection {
            count: connections.len(),
        })
    }

    /// Drop a record from the table; no-op if absent
    pub async fn remove(&self, id: &str) -> Option<Arc<ConnectionRecord>> {
        let removed = self.connections.write().await.remove(id);
        if let Some(record) = &removed {
            debug!(
                "Removed connection {} after {:?}",
                id,
                record.age()
            );
        }
        removed
    }

    /// Close and remove every record
    pub async fn clear(&self) -> usize {
        let drained: Vec<Arc<ConnectionRecord>> = {
            let mut connections = self.connections.write().await;
            connections.drain().map(|(_, record)| record).collect()
        };

        for record in &drained {
            record.close().await;
        }

        if !drained.is_empty() {
            info!("Closed {} connections", drained.len());
        }
        drained.len()
    }

    /// Identifier -> remote address snapshot
    pub async fn list(&self) -> HashMap<String, String> {
        self.connections
            .read()
            .await
            .iter()
            .map(|(id, record)| (id.clone(), record.remote_address().to_string()))
            .collect()
    }

    /// Detailed snapshot of every record
    pub async fn info(&self) -> Vec<ConnectionInfo> {
        self.connections
            .read()
            .await
            .values()
            .map(|record| record.info())
            .collect()
    }

    pub async fn len(&self) -> usize {
        self.connections.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.connections.read().await.is_empty()
    }
}
