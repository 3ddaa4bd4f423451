/// Settings store
///
/// A key-value configuration provider. Values are stored as JSON so any
/// serde type can be persisted. Two implementations:
/// - `SqliteSettings`: persistent, in the user's data directory
/// - `MemorySettings`: process-local, for tests and headless runs

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::Utc;
use rusqlite::{Connection, OptionalExtension};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::error::Result;

/// Known setting keys and their defaults
pub mod keys {
    use crate::astro::{Apertures, TransferFunction};
    use crate::state::marker::IndicatorStyle;

    pub const HISTOGRAM_BINS: &str = "histogram.bins";
    pub const DEFAULT_HISTOGRAM_BINS: usize = 128;

    pub const HISTOGRAM_MAX_THREADS: &str = "histogram.max_threads";
    pub const DEFAULT_HISTOGRAM_MAX_THREADS: usize = 2;

    pub const TRANSFER_FUNCTION: &str = "histogram.transfer_function";
    pub const DEFAULT_TRANSFER_FUNCTION: TransferFunction = TransferFunction::Linear;

    pub const GAMMA: &str = "histogram.gamma";
    pub const DEFAULT_GAMMA: f32 = 1.0;

    pub const CENTROID_RADIUS: &str = "centroid.search_radius";
    pub const DEFAULT_CENTROID_RADIUS: u32 = 20;

    pub const CENTROID_SENSITIVITY: &str = "centroid.sensitivity";
    pub const DEFAULT_CENTROID_SENSITIVITY: u32 = 3;

    pub const MARKER_PROXIMITY: &str = "marker.proximity_radius";
    pub const DEFAULT_MARKER_PROXIMITY: f64 = 5.0;

    pub const MARKER_STYLE: &str = "marker.style";
    pub const DEFAULT_MARKER_STYLE: IndicatorStyle = IndicatorStyle::Cross;

    pub const MARKER_SIZE: &str = "marker.size";
    pub const DEFAULT_MARKER_SIZE: f64 = 10.0;

    pub const MARKER_COLOR_NORMAL: &str = "marker.color.normal";
    pub const DEFAULT_MARKER_COLOR_NORMAL: [u8; 3] = [0, 255, 0];

    pub const MARKER_COLOR_HIGHLIGHT: &str = "marker.color.highlight";
    pub const DEFAULT_MARKER_COLOR_HIGHLIGHT: [u8; 3] = [255, 0, 0];

    pub const PHOTOMETRY_APERTURES: &str = "photometry.apertures";
    pub fn default_apertures() -> Apertures {
        Apertures::default()
    }

    pub const MAGNIFIER_ZOOM: &str = "magnifier.zoom";
    pub const DEFAULT_MAGNIFIER_ZOOM: f64 = 4.0;

    pub const LOG_LEVEL: &str = "log.level";
    pub const DEFAULT_LOG_LEVEL: &str = "info";
}

/// Key-value configuration provider
pub trait SettingsStore {
    /// Raw stored value, `None` when the key was never set
    fn get_value(&self, key: &str) -> Option<Value>;

    fn set_value(&mut self, key: &str, value: Value) -> Result<()>;
}

impl dyn SettingsStore + '_ {
    /// Typed read; a missing or unparsable value yields `default`
    pub fn get<T: DeserializeOwned>(&self, key: &str, default: T) -> T {
        match self.get_value(key) {
            Some(value) => serde_json::from_value(value).unwrap_or_else(|e| {
                log::warn!("Ignoring malformed setting {}: {}", key, e);
                default
            }),
            None => default,
        }
    }

    pub fn set<T: Serialize>(&mut self, key: &str, value: &T) -> Result<()> {
        let value = serde_json::to_value(value)?;
        self.set_value(key, value)
    }
}

/// Settings held in a `HashMap`
#[derive(Debug, Default)]
pub struct MemorySettings {
    values: HashMap<String, Value>,
}

impl MemorySettings {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SettingsStore for MemorySettings {
    fn get_value(&self, key: &str) -> Option<Value> {
        self.values.get(key).cloned()
    }

    fn set_value(&mut self, key: &str, value: Value) -> Result<()> {
        self.values.insert(key.to_string(), value);
        Ok(())
    }
}

/// Settings persisted in a SQLite database
pub struct SqliteSettings {
    conn: Connection,
    db_path: PathBuf,
}

impl SqliteSettings {
    /// Open the settings database in the user's data directory
    ///
    /// - Linux: ~/.local/share/astro-viewer/settings.db
    /// - macOS: ~/Library/Application Support/astro-viewer/settings.db
    /// - Windows: %APPDATA%\astro-viewer\settings.db
    pub fn open() -> Result<Self> {
        Self::open_in(&Self::default_path())
    }

    /// Open (or create) a settings database at an explicit location
    pub fn open_in(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(db_path)?;
        let settings = Self {
            conn,
            db_path: db_path.to_path_buf(),
        };
        settings.init_schema()?;

        log::info!("Settings database at {}", db_path.display());
        Ok(settings)
    }

    /// Directory holding the settings database and logs
    pub fn data_dir() -> PathBuf {
        let mut path = dirs::data_dir()
            .or_else(dirs::home_dir)
            .unwrap_or_else(|| PathBuf::from("."));
        path.push("astro-viewer");
        path
    }

    fn default_path() -> PathBuf {
        Self::data_dir().join("settings.db")
    }

    fn init_schema(&self) -> Result<()> {
        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS settings (
                key             TEXT PRIMARY KEY,
                value_json      TEXT NOT NULL,
                updated_at      INTEGER NOT NULL
            )",
            [],
        )?;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.db_path
    }
}

impl SettingsStore for SqliteSettings {
    fn get_value(&self, key: &str) -> Option<Value> {
        let stored: Option<String> = self
            .conn
            .query_row(
                "SELECT value_json FROM settings WHERE key = ?1",
                [key],
                |row| row.get(0),
            )
            .optional()
            .unwrap_or_else(|e| {
                log::warn!("Failed to read setting {}: {}", key, e);
                None
            });

        stored.and_then(|json| serde_json::from_str(&json).ok())
    }

    fn set_value(&mut self, key: &str, value: Value) -> Result<()> {
        self.conn.execute(
            "INSERT INTO settings (key, value_json, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET value_json = excluded.value_json,
                                            updated_at = excluded.updated_at",
            rusqlite::params![key, value.to_string(), Utc::now().timestamp()],
        )?;
        Ok(())
    }
}

impl std::fmt::Debug for SqliteSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteSettings")
            .field("db_path", &self.db_path)
            .finish()
    }
}
