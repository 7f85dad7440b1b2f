use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use slot_session::BridgeSettings;
use std::path::{Path, PathBuf};
use tracing::info;

// =============================================================================
// Tunable config (figment-deserialized from defaults / config.toml / env vars)
// =============================================================================
//
//   config.toml:     [bridge]
//                    max_clients = 8
//
//   env var:         WOB_BRIDGE__MAX_CLIENTS=8   (double underscore = nesting)

/// Top-level tunable configuration, deserialized by figment.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct FileConfig {
    #[serde(default)]
    pub server: ServerFileConfig,
    /// Settings pushed to clients in the `config` message, plus slot capacity.
    #[serde(default)]
    pub bridge: BridgeSettings,
    #[serde(default)]
    pub store: StoreFileConfig,
}

/// Listener and transport knobs (lives under `[server]` in config.toml).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerFileConfig {
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default)]
    pub port: Option<u16>,
    /// URL advertised to phones. Defaults to `http://<host>:<port>`.
    #[serde(default)]
    pub public_url: Option<String>,
    /// Outbound frames buffered per connection before new ones are dropped
    #[serde(default = "default_send_channel_capacity")]
    pub send_channel_capacity: usize,
}

impl Default for ServerFileConfig {
    fn default() -> Self {
        Self {
            host: None,
            port: None,
            public_url: None,
            send_channel_capacity: default_send_channel_capacity(),
        }
    }
}

/// Session state persistence (lives under `[store]` in config.toml).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StoreFileConfig {
    /// Mirror session state to `state/session.json`
    #[serde(default = "default_persist")]
    pub persist: bool,
}

impl Default for StoreFileConfig {
    fn default() -> Self {
        Self {
            persist: default_persist(),
        }
    }
}

fn default_send_channel_capacity() -> usize {
    100
}
fn default_persist() -> bool {
    true
}

pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 9980;

/// Build a figment that layers: defaults → config.toml → WOB_* env vars.
///
/// Env vars use double-underscore for nesting into sections:
///   `WOB_BRIDGE__SAMPLE_RATE=60`  →  `bridge.sample_rate = 60`
///   `WOB_SERVER__PORT=8080`  →  `server.port = 8080`
pub fn load_config(data_dir: &Path) -> figment::Figment {
    use figment::{
        Figment,
        providers::{Env, Format, Serialized, Toml},
    };

    Figment::from(Serialized::defaults(FileConfig::default()))
        .merge(Toml::file(data_dir.join("config.toml")))
        .merge(Env::prefixed("WOB_").split("__"))
}

/// Extract the layered config, with the figment error as context.
pub fn read_file_config(data_dir: &Path) -> Result<FileConfig> {
    load_config(data_dir)
        .extract()
        .with_context(|| format!("Failed to load config from {}", data_dir.display()))
}

// =============================================================================
// Runtime config (resolved from FileConfig + CLI flags)
// =============================================================================

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub public_url: Option<String>,
    pub send_channel_capacity: usize,
}

impl ServerConfig {
    /// CLI flags win over the file.
    pub fn resolve(fc: &ServerFileConfig, cli_host: Option<String>, cli_port: Option<u16>) -> Self {
        Self {
            host: cli_host
                .or_else(|| fc.host.clone())
                .unwrap_or_else(|| DEFAULT_HOST.to_string()),
            port: cli_port.or(fc.port).unwrap_or(DEFAULT_PORT),
            public_url: fc.public_url.clone().filter(|u| !u.is_empty()),
            send_channel_capacity: fc.send_channel_capacity.max(1),
        }
    }

    /// Discovery URL for phones, given the port actually bound.
    pub fn discovery_url(&self, bound_port: u16) -> String {
        match &self.public_url {
            Some(url) => url.clone(),
            None => format!("http://{}:{}", self.host, bound_port),
        }
    }
}

// =============================================================================
// Directory layout (not tunable via figment, derived from --data-dir)
// =============================================================================

#[derive(Clone, Debug)]
pub struct WobConfig {
    pub data_dir: PathBuf,
}

impl WobConfig {
    pub fn new(custom_dir: Option<PathBuf>) -> Result<Self> {
        let data_dir = match custom_dir {
            Some(dir) => dir,
            None => dirs::home_dir()
                .context("Could not find home directory")?
                .join(".wob"),
        };

        std::fs::create_dir_all(&data_dir)
            .with_context(|| format!("Failed to create data directory: {:?}", data_dir))?;

        let state_dir = data_dir.join("state");
        std::fs::create_dir_all(&state_dir)
            .with_context(|| format!("Failed to create state directory: {:?}", state_dir))?;

        info!("Data directory: {}", data_dir.display());

        Ok(Self { data_dir })
    }

    pub fn state_dir(&self) -> PathBuf {
        self.data_dir.join("state")
    }

    pub fn session_store_path(&self) -> PathBuf {
        self.state_dir().join("session.json")
    }

    pub fn config_toml_path(&self) -> PathBuf {
        self.data_dir.join("config.toml")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ── defaults ────────────────────────────────────────────────────────

    #[test]
    fn test_server_file_config_defaults() {
        let d = ServerFileConfig::default();
        assert!(d.host.is_none());
        assert!(d.port.is_none());
        assert!(d.public_url.is_none());
        assert_eq!(d.send_channel_capacity, 100);
    }

    #[test]
    fn test_store_defaults_to_persist() {
        assert!(StoreFileConfig::default().persist);
    }

    // ── ServerConfig::resolve ───────────────────────────────────────────

    #[test]
    fn test_resolve_falls_back_to_defaults() {
        let sc = ServerConfig::resolve(&ServerFileConfig::default(), None, None);
        assert_eq!(sc.host, DEFAULT_HOST);
        assert_eq!(sc.port, DEFAULT_PORT);
        assert_eq!(sc.discovery_url(9980), "http://0.0.0.0:9980");
    }

    #[test]
    fn test_resolve_cli_overrides_file() {
        let fc = ServerFileConfig {
            host: Some("10.0.0.2".to_string()),
            port: Some(7000),
            ..Default::default()
        };
        let sc = ServerConfig::resolve(&fc, None, Some(8000));
        assert_eq!(sc.host, "10.0.0.2");
        assert_eq!(sc.port, 8000);
    }

    #[test]
    fn test_public_url_wins_for_discovery() {
        let fc = ServerFileConfig {
            public_url: Some("https://wob.example.net".to_string()),
            ..Default::default()
        };
        let sc = ServerConfig::resolve(&fc, None, None);
        assert_eq!(sc.discovery_url(1234), "https://wob.example.net");

        // Empty string means unset
        let fc = ServerFileConfig {
            public_url: Some(String::new()),
            ..Default::default()
        };
        let sc = ServerConfig::resolve(&fc, Some("192.168.1.5".into()), None);
        assert_eq!(sc.discovery_url(4321), "http://192.168.1.5:4321");
    }

    // ── WobConfig ───────────────────────────────────────────────────────

    #[test]
    fn test_wob_config_with_custom_dir() {
        let tmp = tempfile::tempdir().unwrap();
        let config = WobConfig::new(Some(tmp.path().to_path_buf())).unwrap();

        assert_eq!(config.data_dir, tmp.path());
        assert!(tmp.path().join("state").exists());
        assert_eq!(
            config.session_store_path(),
            tmp.path().join("state/session.json")
        );
        assert_eq!(config.config_toml_path(), tmp.path().join("config.toml"));
    }

    // ── load_config ─────────────────────────────────────────────────────

    #[test]
    fn test_load_config_defaults() {
        let tmp = tempfile::tempdir().unwrap();
        let fc: FileConfig = load_config(tmp.path()).extract().unwrap();
        assert_eq!(fc.bridge, BridgeSettings::default());
        assert!(fc.store.persist);
        assert!(fc.server.host.is_none());
    }

    #[test]
    fn test_load_config_toml_sets_values() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(
            tmp.path().join("config.toml"),
            "[server]\nport = 8080\n\n[bridge]\nsample_rate = 60\ncamera = true\nmax_clients = 4\n\n[store]\npersist = false\n",
        )
        .unwrap();
        let fc = read_file_config(tmp.path()).unwrap();
        assert_eq!(fc.server.port, Some(8080));
        assert_eq!(fc.bridge.sample_rate, 60);
        assert!(fc.bridge.camera);
        assert_eq!(fc.bridge.max_clients, 4);
        // Untouched bridge fields keep their defaults
        assert!(fc.bridge.wake_lock);
        assert!(!fc.store.persist);
    }

    #[test]
    fn test_load_config_rejects_bad_types() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(
            tmp.path().join("config.toml"),
            "[bridge]\nmax_clients = \"lots\"\n",
        )
        .unwrap();
        assert!(read_file_config(tmp.path()).is_err());
    }
}
