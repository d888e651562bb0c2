//! The layered configuration store
//!
//! Cells live in one flat array indexed by [`ConfigKey`] discriminant.
//! Reads are O(1); all mutation goes through a single mutex.

use std::path::Path;

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::keys::{ConfigKey, ConfigLayer, ConfigValue, ValueKind};

/// Operator-supplied per-channel URL override
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelOverride {
    /// Channel name as it appears in the manifest/service list
    pub name: String,
    /// Replacement tune URL
    pub uri: String,
    /// Optional per-channel license server URL
    pub license_uri: Option<String>,
}

/// One entry of the operator custom-config array
///
/// An entry matches when every populated selector matches the caller's
/// context; its settings are then applied at the OPERATOR layer.
#[derive(Debug, Clone, Default)]
pub struct CustomConfigEntry {
    /// URL prefix selector
    pub url: Option<String>,
    /// Player id selector
    pub player_id: Option<i32>,
    /// Application name selector
    pub app_name: Option<String>,
    /// Settings applied on match
    pub settings: Vec<(ConfigKey, ConfigValue)>,
}

#[derive(Debug, Clone)]
struct Cell {
    value: ConfigValue,
    owner: ConfigLayer,
    last_value: ConfigValue,
    last_owner: ConfigLayer,
}

impl Cell {
    fn new(default: ConfigValue) -> Self {
        Self {
            value: default.clone(),
            owner: ConfigLayer::Default,
            last_value: default,
            last_owner: ConfigLayer::Default,
        }
    }
}

#[derive(Debug, Default)]
struct Extras {
    channel_overrides: Vec<ChannelOverride>,
    custom_entries: Vec<CustomConfigEntry>,
}

/// Layered typed configuration store
///
/// Created once at player construction and shared by reference; persists for
/// the process lifetime.
#[derive(Debug)]
pub struct ConfigStore {
    cells: Mutex<Vec<Cell>>,
    extras: Mutex<Extras>,
}

impl Default for ConfigStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigStore {
    /// Create a store populated with compiled-in defaults
    pub fn new() -> Self {
        let cells = ConfigKey::ALL
            .iter()
            .map(|k| Cell::new(k.default_value()))
            .collect();
        Self {
            cells: Mutex::new(cells),
            extras: Mutex::new(Extras::default()),
        }
    }

    /// Current value and owning layer of a key
    pub fn get(&self, key: ConfigKey) -> (ConfigValue, ConfigLayer) {
        let cells = self.cells.lock();
        let cell = &cells[key.index()];
        (cell.value.clone(), cell.owner)
    }

    /// Owning layer of a key
    pub fn owner(&self, key: ConfigKey) -> ConfigLayer {
        self.cells.lock()[key.index()].owner
    }

    /// Write a value under `layer`
    ///
    /// The write is dropped (not an error) when a higher-priority layer owns
    /// the cell, when the value kind does not match the key, or when a
    /// numeric value falls outside the key's range.
    pub fn set(&self, layer: ConfigLayer, key: ConfigKey, value: ConfigValue) {
        if value.kind() != key.kind() {
            warn!(key = key.name(), ?value, "config value type mismatch, dropped");
            return;
        }
        if let Some((min, max)) = key.range() {
            let numeric = match value {
                ConfigValue::Int(v) => Some(v as f64),
                ConfigValue::Long(v) => Some(v as f64),
                ConfigValue::Double(v) => Some(v),
                _ => None,
            };
            if let Some(v) = numeric {
                if v < min || v > max {
                    warn!(
                        key = key.name(),
                        value = v,
                        min,
                        max,
                        "config value out of range, dropped"
                    );
                    return;
                }
            }
        }

        let mut cells = self.cells.lock();
        let cell = &mut cells[key.index()];
        if layer < cell.owner {
            debug!(
                key = key.name(),
                writer = %layer,
                owner = %cell.owner,
                "config write shadowed by higher layer"
            );
            return;
        }
        // Consecutive writes by the owning layer keep the pre-layer snapshot
        // so restore() erases the layer completely.
        if cell.owner != layer {
            cell.last_value = cell.value.clone();
            cell.last_owner = cell.owner;
        }
        cell.value = value;
        cell.owner = layer;
    }

    /// Flip a boolean key under `layer`, following `set` rules
    pub fn toggle(&self, layer: ConfigLayer, key: ConfigKey) {
        if key.kind() != ValueKind::Bool {
            warn!(key = key.name(), "toggle on non-bool key ignored");
            return;
        }
        let current = self.bool(key);
        self.set(layer, key, ConfigValue::Bool(!current));
    }

    /// Revert every cell owned by `layer` to its saved previous state
    ///
    /// After this call the store is indistinguishable from one where `layer`
    /// never wrote anything.
    pub fn restore(&self, layer: ConfigLayer) {
        let mut cells = self.cells.lock();
        for (i, cell) in cells.iter_mut().enumerate() {
            if cell.owner == layer {
                debug!(
                    key = ConfigKey::ALL[i].name(),
                    from = %layer,
                    to = %cell.last_owner,
                    "restoring config cell"
                );
                cell.value = cell.last_value.clone();
                cell.owner = cell.last_owner;
            }
        }
    }

    // Typed accessors. Each key has a fixed kind, so the fallbacks only fire
    // on programmer error and return the compiled default.

    /// Boolean value of a key
    pub fn bool(&self, key: ConfigKey) -> bool {
        match self.get(key).0 {
            ConfigValue::Bool(v) => v,
            _ => false,
        }
    }

    /// Integer value of a key
    pub fn int(&self, key: ConfigKey) -> i32 {
        match self.get(key).0 {
            ConfigValue::Int(v) => v,
            _ => 0,
        }
    }

    /// Long value of a key
    pub fn long(&self, key: ConfigKey) -> i64 {
        match self.get(key).0 {
            ConfigValue::Long(v) => v,
            _ => 0,
        }
    }

    /// Double value of a key
    pub fn double(&self, key: ConfigKey) -> f64 {
        match self.get(key).0 {
            ConfigValue::Double(v) => v,
            _ => 0.0,
        }
    }

    /// String value of a key
    pub fn string(&self, key: ConfigKey) -> String {
        match self.get(key).0 {
            ConfigValue::String(v) => v,
            _ => String::new(),
        }
    }

    /// Convenience setters mirroring the typed accessors
    pub fn set_bool(&self, layer: ConfigLayer, key: ConfigKey, value: bool) {
        self.set(layer, key, ConfigValue::Bool(value));
    }

    /// Set an integer key
    pub fn set_int(&self, layer: ConfigLayer, key: ConfigKey, value: i32) {
        self.set(layer, key, ConfigValue::Int(value));
    }

    /// Set a long key
    pub fn set_long(&self, layer: ConfigLayer, key: ConfigKey, value: i64) {
        self.set(layer, key, ConfigValue::Long(value));
    }

    /// Set a double key
    pub fn set_double(&self, layer: ConfigLayer, key: ConfigKey, value: f64) {
        self.set(layer, key, ConfigValue::Double(value));
    }

    /// Set a string key
    pub fn set_string(&self, layer: ConfigLayer, key: ConfigKey, value: impl Into<String>) {
        self.set(layer, key, ConfigValue::String(value.into()));
    }

    /// Parse a line-oriented `key value` payload under `layer`
    ///
    /// `#` starts a comment. Lines beginning with `*` declare channel
    /// overrides: `* <name> <uri> [<licenseUri>]`. Malformed lines are
    /// skipped with a warning; parsing never fails as a whole.
    pub fn load_from_text(&self, payload: &str, layer: ConfigLayer) {
        for raw in payload.lines() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            if let Some(rest) = line.strip_prefix('*') {
                let mut parts = rest.split_whitespace();
                match (parts.next(), parts.next()) {
                    (Some(name), Some(uri)) => {
                        let license_uri = parts.next().map(str::to_string);
                        self.extras.lock().channel_overrides.push(ChannelOverride {
                            name: name.to_string(),
                            uri: uri.to_string(),
                            license_uri,
                        });
                    }
                    _ => warn!(line = raw, "malformed channel override, skipped"),
                }
                continue;
            }
            let mut parts = line.splitn(2, char::is_whitespace);
            let name = parts.next().unwrap_or_default();
            let value = parts.next().map(str::trim);
            let Some(key) = ConfigKey::from_name(name) else {
                warn!(name, "unknown config key, skipped");
                continue;
            };
            match Self::parse_value(key, value) {
                Some(parsed) => self.set(layer, key, parsed),
                None => warn!(name, value, "unparseable config value, skipped"),
            }
        }
        info!(layer = %layer, "text configuration applied");
    }

    /// Parse a JSON object payload under `layer`
    ///
    /// Recognized keys are applied; a `custom` array registers
    /// [`CustomConfigEntry`] records; everything else is skipped with a
    /// warning. Returns false only when the payload is not a JSON object.
    pub fn load_from_json(&self, payload: &str, layer: ConfigLayer) -> bool {
        let parsed: serde_json::Value = match serde_json::from_str(payload) {
            Ok(v) => v,
            Err(err) => {
                warn!(%err, "config JSON did not parse");
                return false;
            }
        };
        let Some(object) = parsed.as_object() else {
            warn!("config JSON root is not an object");
            return false;
        };
        for (name, value) in object {
            if name == "custom" {
                if let Some(entries) = value.as_array() {
                    self.read_custom_array(entries);
                }
                continue;
            }
            let Some(key) = ConfigKey::from_name(name) else {
                warn!(name, "unknown config key, skipped");
                continue;
            };
            match Self::json_value(key, value) {
                Some(v) => self.set(layer, key, v),
                None => warn!(name, "config JSON value has wrong type, skipped"),
            }
        }
        info!(layer = %layer, "JSON configuration applied");
        true
    }

    /// Load the operator config files when present
    ///
    /// Reads the line-oriented file then the JSON file, both under the
    /// OPERATOR layer. A missing or malformed file is not fatal.
    pub fn load_operator_files(&self, cfg_path: &Path, json_path: &Path) {
        if let Ok(text) = std::fs::read_to_string(cfg_path) {
            self.load_from_text(&text, ConfigLayer::Operator);
        }
        if let Ok(json) = std::fs::read_to_string(json_path) {
            self.load_from_json(&json, ConfigLayer::Operator);
        }
    }

    /// Operator tune-URL override for a channel name
    pub fn channel_override(&self, name: &str) -> Option<String> {
        self.extras
            .lock()
            .channel_overrides
            .iter()
            .find(|c| c.name == name)
            .map(|c| c.uri.clone())
    }

    /// Operator license-URL override for a channel name
    pub fn channel_license_override(&self, name: &str) -> Option<String> {
        self.extras
            .lock()
            .channel_overrides
            .iter()
            .find(|c| c.name == name)
            .and_then(|c| c.license_uri.clone())
    }

    /// Register a custom-config entry programmatically
    pub fn add_custom_entry(&self, entry: CustomConfigEntry) {
        self.extras.lock().custom_entries.push(entry);
    }

    /// Match the playback context against registered custom entries
    ///
    /// The first matching entry's settings are applied at the OPERATOR layer.
    /// Returns whether anything matched.
    pub fn custom_search(&self, url: &str, player_id: i32, app_name: &str) -> bool {
        let matched = {
            let extras = self.extras.lock();
            extras
                .custom_entries
                .iter()
                .find(|e| {
                    e.url.as_deref().is_none_or(|u| url.starts_with(u))
                        && e.player_id.is_none_or(|id| id == player_id)
                        && e.app_name.as_deref().is_none_or(|a| a == app_name)
                })
                .cloned()
        };
        match matched {
            Some(entry) => {
                info!(url, player_id, app_name, "custom config entry matched");
                for (key, value) in entry.settings {
                    self.set(ConfigLayer::Operator, key, value);
                }
                true
            }
            None => false,
        }
    }

    /// Log every cell not owned by the DEFAULT layer
    pub fn show_configuration(&self) {
        let cells = self.cells.lock();
        for (i, cell) in cells.iter().enumerate() {
            if cell.owner != ConfigLayer::Default {
                info!(
                    key = ConfigKey::ALL[i].name(),
                    owner = %cell.owner,
                    value = ?cell.value,
                    "config"
                );
            }
        }
    }

    fn parse_value(key: ConfigKey, raw: Option<&str>) -> Option<ConfigValue> {
        match key.kind() {
            // A bare boolean key means true
            ValueKind::Bool => match raw {
                None | Some("") => Some(ConfigValue::Bool(true)),
                Some(s) => match s {
                    "true" | "1" => Some(ConfigValue::Bool(true)),
                    "false" | "0" => Some(ConfigValue::Bool(false)),
                    _ => None,
                },
            },
            ValueKind::Int => raw?.parse().ok().map(ConfigValue::Int),
            ValueKind::Long => raw?.parse().ok().map(ConfigValue::Long),
            ValueKind::Double => raw?.parse().ok().map(ConfigValue::Double),
            ValueKind::String => Some(ConfigValue::String(raw?.to_string())),
        }
    }

    fn json_value(key: ConfigKey, value: &serde_json::Value) -> Option<ConfigValue> {
        match key.kind() {
            ValueKind::Bool => value.as_bool().map(ConfigValue::Bool),
            ValueKind::Int => value.as_i64().map(|v| ConfigValue::Int(v as i32)),
            ValueKind::Long => value.as_i64().map(ConfigValue::Long),
            ValueKind::Double => value.as_f64().map(ConfigValue::Double),
            ValueKind::String => value.as_str().map(|s| ConfigValue::String(s.to_string())),
        }
    }

    fn read_custom_array(&self, entries: &[serde_json::Value]) {
        for item in entries {
            let Some(obj) = item.as_object() else {
                warn!("custom config entry is not an object, skipped");
                continue;
            };
            let mut entry = CustomConfigEntry::default();
            for (name, value) in obj {
                match name.as_str() {
                    "url" => entry.url = value.as_str().map(str::to_string),
                    "playerId" => entry.player_id = value.as_i64().map(|v| v as i32),
                    "appName" => entry.app_name = value.as_str().map(str::to_string),
                    _ => {
                        if let Some(key) = ConfigKey::from_name(name) {
                            if let Some(v) = Self::json_value(key, value) {
                                entry.settings.push((key, v));
                            }
                        } else {
                            warn!(name, "unknown key in custom config entry, skipped");
                        }
                    }
                }
            }
            self.extras.lock().custom_entries.push(entry);
        }
    }
}
