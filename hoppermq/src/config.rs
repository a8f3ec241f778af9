//! Layered configuration loader (C7, `[AMBIENT]`).
//!
//! Grounded in `original_source/internal/config/config.go`'s koanf-based
//! merge (embedded TOML file, environment variables, dotted keys, last
//! source wins) and in `monocoque-core`'s options-record pattern
//! (`SocketOptions`, `BufferConfig`): every field has a default so the
//! broker is runnable with zero configuration. The merge itself is
//! hand-rolled over `toml::Value` rather than pulled in from a
//! koanf-equivalent crate: the original's own config layer is a thin
//! wrapper over three sources, simple enough that `serde` + `toml`
//! (already part of this stack) cover it without a heavier dependency.

use hoppermq_core::error::{HopperError, Result};

use serde::Deserialize;
use std::net::SocketAddr;
use std::time::Duration;

const ENV_VAR: &str = "APP_ENV";
const DEFAULT_TOML: &str = include_str!("../hoppermq.toml");

/// Embedded per-environment overlays, selected by `APP_ENV`. An unset or
/// unrecognized value is not an error; it just means no overlay applies.
fn embedded_env_toml(env: &str) -> Option<&'static str> {
    match env {
        "dev" | "development" => Some(include_str!("../config.dev.toml")),
        "prod" | "production" => Some(include_str!("../config.prod.toml")),
        _ => None,
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub name: String,
    pub version: String,
    pub id: String,
    pub description: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            name: "hoppermq".into(),
            version: env!("CARGO_PKG_VERSION").into(),
            id: uuid::Uuid::new_v4().to_string(),
            description: String::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    pub listen_addr: String,
    pub read_timeout_secs: u64,
    pub write_timeout_secs: u64,
    pub accept_grace_secs: u64,
    pub max_consecutive_timeouts: u32,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:9091".into(),
            read_timeout_secs: 50,
            write_timeout_secs: 5,
            accept_grace_secs: 10,
            max_consecutive_timeouts: 1,
        }
    }
}

impl TransportConfig {
    /// Parses `listen_addr`, falling back to the documented default on a
    /// malformed override rather than failing startup outright.
    #[must_use]
    pub fn listen_socket_addr(&self) -> SocketAddr {
        self.listen_addr.parse().unwrap_or_else(|err| {
            tracing::warn!(addr = %self.listen_addr, %err, "invalid transport.listen_addr, using default");
            "0.0.0.0:9091".parse().expect("valid fallback listen addr")
        })
    }

    #[must_use]
    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout_secs)
    }

    #[must_use]
    pub fn write_timeout(&self) -> Duration {
        Duration::from_secs(self.write_timeout_secs)
    }

    #[must_use]
    pub fn accept_grace(&self) -> Duration {
        Duration::from_secs(self.accept_grace_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BusConfig {
    pub subscriber_buffer: usize,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            subscriber_buffer: hoppermq_core::bus::DEFAULT_SUBSCRIBER_BUFFER,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BrokerConfig {
    pub shutdown_grace_secs: u64,
    pub auto_create_channel_on_publish: bool,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            shutdown_grace_secs: 30,
            auto_create_channel_on_publish: false,
        }
    }
}

impl BrokerConfig {
    #[must_use]
    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub app: AppConfig,
    pub transport: TransportConfig,
    pub bus: BusConfig,
    pub broker: BrokerConfig,
}

impl Config {
    /// Load order (§6): embedded `hoppermq.toml` default, an embedded
    /// `config.<APP_ENV>.toml` overlay if `APP_ENV` names a known
    /// environment, then process environment variables. Each source wins
    /// over the previous one field-by-field.
    pub fn load() -> Result<Self> {
        let mut merged = parse_toml(DEFAULT_TOML)?;

        if let Ok(env) = std::env::var(ENV_VAR) {
            if let Some(overlay) = embedded_env_toml(&env) {
                merge_table(&mut merged, parse_toml(overlay)?);
            }
        }

        merge_table(&mut merged, env_overlay());

        Config::deserialize(toml::Value::Table(merged))
            .map_err(|err| HopperError::Config(format!("failed to deserialize configuration: {err}")))
    }
}

fn parse_toml(src: &str) -> Result<toml::value::Table> {
    match toml::from_str::<toml::Value>(src) {
        Ok(toml::Value::Table(table)) => Ok(table),
        Ok(_) => Err(HopperError::Config("configuration root must be a table".into())),
        Err(err) => Err(HopperError::Config(format!("invalid TOML: {err}"))),
    }
}

/// Merges `overlay` onto `base` recursively: tables merge key by key,
/// anything else in `overlay` replaces the value in `base` outright.
fn merge_table(base: &mut toml::value::Table, overlay: toml::value::Table) {
    for (key, value) in overlay {
        match (base.get_mut(&key), value) {
            (Some(toml::Value::Table(base_table)), toml::Value::Table(overlay_table)) => {
                merge_table(base_table, overlay_table);
            }
            (_, value) => {
                base.insert(key, value);
            }
        }
    }
}

/// Builds a nested table out of process environment variables, mapping
/// `X_Y` to `x.y` (case-folded), per §6's literal env-mapping rule.
fn env_overlay() -> toml::value::Table {
    let mut table = toml::value::Table::new();
    for (key, value) in std::env::vars() {
        let dotted = key.to_lowercase().replace('_', ".");
        let path: Vec<&str> = dotted.split('.').collect();
        if path.len() < 2 {
            continue;
        }
        insert_path(&mut table, &path, parse_env_value(&value));
    }
    table
}

fn insert_path(table: &mut toml::value::Table, path: &[&str], value: toml::Value) {
    let [head, rest @ ..] = path else { return };
    if rest.is_empty() {
        table.insert((*head).to_string(), value);
        return;
    }

    let entry = table
        .entry((*head).to_string())
        .or_insert_with(|| toml::Value::Table(toml::value::Table::new()));
    if let toml::Value::Table(nested) = entry {
        insert_path(nested, rest, value);
    }
}

fn parse_env_value(raw: &str) -> toml::Value {
    if let Ok(b) = raw.parse::<bool>() {
        return toml::Value::Boolean(b);
    }
    if let Ok(i) = raw.parse::<i64>() {
        return toml::Value::Integer(i);
    }
    if let Ok(f) = raw.parse::<f64>() {
        return toml::Value::Float(f);
    }
    toml::Value::String(raw.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_parse_without_any_env_or_files() {
        let config = Config::default();
        assert_eq!(config.app.name, "hoppermq");
        assert_eq!(config.transport.listen_socket_addr().port(), 9091);
        assert_eq!(config.bus.subscriber_buffer, 1000);
        assert_eq!(config.broker.shutdown_grace_secs, 30);
    }

    #[test]
    fn merge_table_overlay_wins_field_by_field() {
        let mut base = parse_toml("[transport]\nlisten_addr = \"0.0.0.0:9091\"\nread_timeout_secs = 50\n").unwrap();
        let overlay = parse_toml("[transport]\nread_timeout_secs = 5\n").unwrap();
        merge_table(&mut base, overlay);

        let transport = base.get("transport").unwrap().as_table().unwrap();
        assert_eq!(transport.get("listen_addr").unwrap().as_str().unwrap(), "0.0.0.0:9091");
        assert_eq!(transport.get("read_timeout_secs").unwrap().as_integer().unwrap(), 5);
    }

    #[test]
    fn insert_path_builds_nested_tables_from_dotted_keys() {
        let mut table = toml::value::Table::new();
        insert_path(&mut table, &["transport", "listen_addr"], toml::Value::String("127.0.0.1:0".into()));
        let transport = table.get("transport").unwrap().as_table().unwrap();
        assert_eq!(transport.get("listen_addr").unwrap().as_str().unwrap(), "127.0.0.1:0");
    }

    #[test]
    fn parse_env_value_prefers_typed_forms() {
        assert_eq!(parse_env_value("true"), toml::Value::Boolean(true));
        assert_eq!(parse_env_value("50"), toml::Value::Integer(50));
        assert_eq!(parse_env_value("0.0.0.0:9091"), toml::Value::String("0.0.0.0:9091".into()));
    }
}
