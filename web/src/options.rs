use fogwarden_core::GridConfig;
use fogwarden_protocol::SessionKey;
use fogwarden_sync::{FogConfig, Role, SyncError};
use serde::Deserialize;

const DEFAULT_CELL_SIZE: f32 = 40.0;

fn default_cell_size() -> f32 {
    DEFAULT_CELL_SIZE
}

/// Where fog rows are kept.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub(crate) enum StoreOptions {
    LocalStorage,
    Rest { base_url: String, api_key: String },
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self::LocalStorage
    }
}

/// Options passed from JavaScript when attaching to a map, as JSON.
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub(crate) struct JoinOptions {
    pub session_id: String,
    pub map_id: String,
    pub map_width: f32,
    pub map_height: f32,
    #[serde(default = "default_cell_size")]
    pub cell_size: f32,
    pub role: Role,
    #[serde(default)]
    pub participant: Option<String>,
    #[serde(default)]
    pub config: Option<FogConfig>,
    /// Takes precedence over `config`
    #[serde(default)]
    pub config_toml: Option<String>,
    #[serde(default)]
    pub store: StoreOptions,
}

impl JoinOptions {
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }

    pub fn key(&self) -> SessionKey {
        SessionKey::new(self.session_id.clone(), self.map_id.clone())
    }

    pub fn grid_config(&self) -> Result<GridConfig, SyncError> {
        Ok(GridConfig::for_map(self.map_width, self.map_height, self.cell_size)?)
    }

    pub fn fog_config(&self) -> Result<FogConfig, SyncError> {
        match &self.config_toml {
            Some(source) => FogConfig::from_toml_str(source),
            None => Ok(self.config.clone().unwrap_or_default()),
        }
    }
}
