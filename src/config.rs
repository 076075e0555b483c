//! Process configuration: `~/.agentsdk/config.json`, mode `0600` on Unix.
//!
//! A flat `serde`-derived tree loaded from disk: which model/MCP servers to
//! talk to, and the tuning parameters the WAL/EventBus/SSE/sandbox
//! components expose.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use agentsdk_domain::error::{Error, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub default_model: String,
    pub api_key: String,
    pub base_url: String,
    pub mcp_servers: Vec<String>,

    pub wal_segment_cap_bytes: u64,
    pub event_bus_buffer_size: usize,
    pub sse_heartbeat_secs: u64,
    pub mcp_reconnect_initial_ms: u64,
    pub mcp_reconnect_max_ms: u64,

    pub sandbox_fs_allow: Vec<PathBuf>,
    pub sandbox_domain_allow: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_model: String::new(),
            api_key: String::new(),
            base_url: String::new(),
            mcp_servers: Vec::new(),
            wal_segment_cap_bytes: 64 * 1024 * 1024,
            event_bus_buffer_size: 64,
            sse_heartbeat_secs: 15,
            mcp_reconnect_initial_ms: 200,
            mcp_reconnect_max_ms: 10_000,
            sandbox_fs_allow: Vec::new(),
            sandbox_domain_allow: Vec::new(),
        }
    }
}

impl Config {
    /// `~/.agentsdk/config.json`.
    pub fn default_path() -> Result<PathBuf> {
        let home = dirs::home_dir()
            .ok_or_else(|| Error::Config("unable to determine home directory".into()))?;
        Ok(home.join(".agentsdk").join("config.json"))
    }

    /// Loads the config at `path`, or the default config if the file does
    /// not exist yet. A malformed file is a hard error, not silently
    /// replaced, so a corrupt config is never mistaken for an empty one.
    pub fn load(path: &Path) -> Result<Self> {
        match std::fs::read_to_string(path) {
            Ok(raw) => serde_json::from_str(&raw)
                .map_err(|e| Error::Config(format!("malformed config at {}: {e}", path.display()))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Config::default()),
            Err(e) => Err(Error::Io(e)),
        }
    }

    /// Writes the config to `path`, creating parent directories and
    /// restricting the file to owner read/write on Unix.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(Error::Io)?;
        }
        let json = serde_json::to_string_pretty(self).map_err(Error::Json)?;
        std::fs::write(path, json).map_err(Error::Io)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = std::fs::Permissions::from_mode(0o600);
            std::fs::set_permissions(path, perms).map_err(Error::Io)?;
        }

        Ok(())
    }

    /// `agentctl config get <key>`.
    pub fn get(&self, key: &str) -> Result<String> {
        Ok(match key {
            "default_model" => self.default_model.clone(),
            "api_key" => self.api_key.clone(),
            "base_url" => self.base_url.clone(),
            "mcp_servers" => self.mcp_servers.join(","),
            other => return Err(Error::Validation(format!("unknown config key `{other}`"))),
        })
    }

    /// `agentctl config set <key> <value>`.
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        match key {
            "default_model" => self.default_model = value.to_string(),
            "api_key" => self.api_key = value.to_string(),
            "base_url" => self.base_url = value.to_string(),
            "mcp_servers" => {
                self.mcp_servers = value.split(',').map(str::trim).filter(|s| !s.is_empty()).map(String::from).collect()
            }
            other => return Err(Error::Validation(format!("unknown config key `{other}`"))),
        }
        Ok(())
    }

    /// All known key/value pairs, for `agentctl config list`.
    pub fn list(&self) -> Vec<(&'static str, String)> {
        vec![
            ("default_model", self.default_model.clone()),
            ("api_key", self.api_key.clone()),
            ("base_url", self.base_url.clone()),
            ("mcp_servers", self.mcp_servers.join(",")),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_loads_default() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load(&dir.path().join("missing.json")).unwrap();
        assert_eq!(config.default_model, "");
        assert_eq!(config.event_bus_buffer_size, 64);
    }

    #[test]
    fn save_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        let mut config = Config::default();
        config.set("default_model", "my-model").unwrap();
        config.set("mcp_servers", "a, b ,c").unwrap();
        config.save(&path).unwrap();

        let reloaded = Config::load(&path).unwrap();
        assert_eq!(reloaded.default_model, "my-model");
        assert_eq!(reloaded.mcp_servers, vec!["a", "b", "c"]);
    }

    #[test]
    fn malformed_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "not json").unwrap();
        assert!(Config::load(&path).is_err());
    }

    #[test]
    fn unknown_key_rejected() {
        let mut config = Config::default();
        assert!(config.set("nope", "x").is_err());
        assert!(config.get("nope").is_err());
    }

    #[cfg(unix)]
    #[test]
    fn saved_file_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        Config::default().save(&path).unwrap();
        let mode = std::fs::metadata(&path).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o600);
    }
}
