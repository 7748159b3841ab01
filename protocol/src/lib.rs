use fogwarden_core::{FogCell, GridConfig, SNAPSHOT_VERSION, Snapshot, SnapshotCell};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

pub use event::*;

mod event;

#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("Malformed fog message: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = core::result::Result<T, ProtocolError>;

/// Identifies the fog state of one map within one session.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionKey {
    pub session_id: String,
    pub map_id: String,
}

impl SessionKey {
    pub fn new(session_id: impl Into<String>, map_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            map_id: map_id.into(),
        }
    }
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.session_id, self.map_id)
    }
}

/// One stored row per non-hidden cell, a missing row means hidden.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedCell {
    pub session_id: String,
    pub map_id: String,
    pub grid_x: i32,
    pub grid_y: i32,
    /// `true` for visible, `false` for explored
    pub is_revealed: bool,
}

impl PersistedCell {
    pub fn belongs_to(&self, key: &SessionKey) -> bool {
        self.session_id == key.session_id && self.map_id == key.map_id
    }

    pub const fn state(&self) -> FogCell {
        if self.is_revealed {
            FogCell::Visible
        } else {
            FogCell::Explored
        }
    }
}

/// Rows replacing everything stored for `key`.
pub fn records_from_snapshot(key: &SessionKey, snapshot: &Snapshot) -> Vec<PersistedCell> {
    snapshot
        .cells
        .iter()
        .filter(|cell| cell.state.is_seen())
        .map(|cell| PersistedCell {
            session_id: key.session_id.clone(),
            map_id: key.map_id.clone(),
            grid_x: cell.col,
            grid_y: cell.row,
            is_revealed: cell.state.is_visible(),
        })
        .collect()
}

/// Rebuilds a snapshot for a grid of shape `config` from stored rows.
///
/// Rows belonging to another session or map are skipped. Bounds are not checked here, loading the snapshot drops
/// out of range cells.
pub fn snapshot_from_records(key: &SessionKey, config: GridConfig, records: &[PersistedCell]) -> Snapshot {
    let mut foreign = 0usize;
    let cells = records
        .iter()
        .filter(|record| {
            let ours = record.belongs_to(key);
            if !ours {
                foreign += 1;
            }
            ours
        })
        .map(|record| SnapshotCell {
            col: record.grid_x,
            row: record.grid_y,
            state: record.state(),
        })
        .collect();
    if foreign > 0 {
        log::warn!("Ignored {} fog rows not belonging to {}", foreign, key);
    }
    Snapshot {
        version: SNAPSHOT_VERSION,
        cols: config.cols,
        rows: config.rows,
        cell_size: config.cell_size,
        cells,
    }
}
