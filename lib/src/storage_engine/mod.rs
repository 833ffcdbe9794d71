// lib/src/storage_engine/mod.rs

pub mod storage_engine;
pub mod inmemory_storage;
#[cfg(test)]
pub(crate) mod interleaving_store;

pub use storage_engine::{
    ChwFilter, ClinicalStore, SortOrder, SpatialHit, SpatialIndex, SpatialPredicate, SpatialQuery, SpatialTable,
    StoreTransaction, TerritoryQuery, VisitQuery, WGS84_SRID,
};
pub use inmemory_storage::{InMemoryStore, StoreSnapshot};

use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use tracing::info;

use crate::config::{StorageConfig, StorageEngineType};

/// The store handles every service is built from. Both trait objects
/// usually point at the same engine.
#[derive(Clone)]
pub struct StorageHandles {
    pub store: Arc<dyn ClinicalStore>,
    pub index: Arc<dyn SpatialIndex>,
    /// Snapshot the engine was seeded from, if any (users go to the identity provider).
    pub snapshot: Option<StoreSnapshot>,
}

/// Creates the storage engine selected by the configuration.
///
/// Only the in-memory engine ships with the planner; a PostGIS-backed engine
/// is provided by the deployment and is rejected here.
pub async fn create_storage(config: &StorageConfig) -> Result<StorageHandles> {
    match config.engine_type {
        StorageEngineType::InMemory => {
            let snapshot = match &config.fixture_path {
                Some(path) => Some(
                    StoreSnapshot::load(path)
                        .await
                        .with_context(|| format!("Failed to load store fixture from {:?}", path))?,
                ),
                None => None,
            };
            let engine = match &snapshot {
                Some(snapshot) => Arc::new(InMemoryStore::from_snapshot(snapshot).await),
                None => Arc::new(InMemoryStore::new()),
            };
            info!("Initialized in-memory clinical store");
            Ok(StorageHandles {
                store: engine.clone(),
                index: engine,
                snapshot,
            })
        }
        StorageEngineType::Postgis => Err(anyhow!(
            "PostGIS storage is provided by the deployment; use engine_type: in_memory for the planner binary"
        )),
    }
}
