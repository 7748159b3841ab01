use fogwarden_core::{FogChange, FogGrid, GridCoord, Snapshot};
use serde::{Deserialize, Serialize};

use crate::Result;

/// A fog edit, as broadcast from the host to every other viewer of the map.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum FogAction {
    Reveal { x: f32, y: f32, radius: f32 },
    Hide { x: f32, y: f32, radius: f32 },
    RevealRect { x: f32, y: f32, width: f32, height: f32 },
    HideRect { x: f32, y: f32, width: f32, height: f32 },
    RevealAll,
    HideAll,
    Toggle { col: GridCoord, row: GridCoord },
    /// Full state, sent after vision passes and to late joiners
    Sync { snapshot: Snapshot },
}

impl FogAction {
    /// Applies the edit as a plain overwrite of the affected cells.
    pub fn apply(&self, grid: &mut FogGrid) -> FogChange {
        use FogAction::*;

        match self {
            &Reveal { x, y, radius } => grid.reveal_circle(x, y, radius),
            &Hide { x, y, radius } => grid.hide_circle(x, y, radius),
            &RevealRect { x, y, width, height } => grid.reveal_rect(x, y, width, height),
            &HideRect { x, y, width, height } => grid.hide_rect(x, y, width, height),
            RevealAll => grid.reveal_all(),
            HideAll => grid.hide_all(),
            &Toggle { col, row } => grid.toggle(col, row),
            Sync { snapshot } => {
                let before = grid.snapshot();
                grid.replace_with(snapshot);
                FogChange::from_bool(grid.snapshot() != before)
            }
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FogEvent {
    pub sender: String,
    pub timestamp_ms: u64,
    #[serde(flatten)]
    pub action: FogAction,
}

impl FogEvent {
    pub fn new(sender: impl Into<String>, timestamp_ms: u64, action: FogAction) -> Self {
        Self {
            sender: sender.into(),
            timestamp_ms,
            action,
        }
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}
