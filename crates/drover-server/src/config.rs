//! Configuration for the drover server.
//!
//! Provides a TOML-based config file at `~/.config/drover/config.toml` and a
//! resolution chain: CLI flag > env var > config file > default.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use drover_core::registry::DEFAULT_SHUTDOWN_GRACE;
use serde::{Deserialize, Serialize};

pub const DEFAULT_BIND: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_AGENT_BIN: &str = "/entrypoint.sh";
pub const DEFAULT_AGENT_HOME: &str = "/home/node";
pub const DEFAULT_SHUTDOWN_GRACE_SECS: u64 = DEFAULT_SHUTDOWN_GRACE.as_secs();

// -----------------------------------------------------------------------
// Config file types
// -----------------------------------------------------------------------

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigFile {
    pub server: ServerSection,
    pub agent: AgentSection,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSection {
    pub bind: Option<String>,
    pub port: Option<u16>,
    /// Seconds each agent process gets between SIGTERM and SIGKILL during
    /// shutdown.
    pub shutdown_grace_secs: Option<u64>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentSection {
    pub binary_path: Option<String>,
    pub home_dir: Option<String>,
}

// -----------------------------------------------------------------------
// Paths
// -----------------------------------------------------------------------

/// Return the drover config directory.
///
/// Always uses XDG layout: `$XDG_CONFIG_HOME/drover` or `~/.config/drover`.
/// We intentionally ignore the platform-specific `dirs::config_dir()`
/// (which returns `~/Library/Application Support` on macOS).
pub fn config_dir() -> PathBuf {
    if let Ok(xdg) = std::env::var("XDG_CONFIG_HOME") {
        return PathBuf::from(xdg).join("drover");
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config")
        .join("drover")
}

/// Return the path to the drover config file.
pub fn config_path() -> PathBuf {
    config_dir().join("config.toml")
}

// -----------------------------------------------------------------------
// Read
// -----------------------------------------------------------------------

/// Load and parse the config file. Returns an error if it does not exist.
pub fn load_config() -> Result<ConfigFile> {
    let path = config_path();
    let contents = std::fs::read_to_string(&path)
        .with_context(|| format!("failed to read config file at {}", path.display()))?;
    let config: ConfigFile = toml::from_str(&contents).context("failed to parse config file")?;
    Ok(config)
}

// -----------------------------------------------------------------------
// Resolved config
// -----------------------------------------------------------------------

/// CLI-flag overrides, the highest-precedence link in the chain.
#[derive(Debug, Default)]
pub struct CliOverrides {
    pub bind: Option<String>,
    pub port: Option<u16>,
    pub agent_bin: Option<String>,
}

/// Fully resolved configuration, ready for use.
#[derive(Debug, Clone)]
pub struct DroverConfig {
    pub bind: String,
    pub port: u16,
    /// Path of the agent entrypoint binary to spawn per request.
    pub agent_bin: String,
    /// Home directory of the user the agent runs as; the credential file
    /// and auxiliary directories live under it.
    pub agent_home: PathBuf,
    pub shutdown_grace: Duration,
    /// Server-level API key applied to requests that do not carry one.
    pub fallback_api_key: Option<String>,
}

impl DroverConfig {
    /// Resolve configuration using the chain: CLI flag > env var > config file > default.
    ///
    /// - bind: `--bind` > `DROVER_BIND` > `[server].bind` > `0.0.0.0`
    /// - port: `--port` > `PORT` > `[server].port` > `8080`
    /// - agent binary: `--agent-bin` > `DROVER_AGENT_BIN` > `[agent].binary_path` > `/entrypoint.sh`
    /// - agent home: `DROVER_AGENT_HOME` > `[agent].home_dir` > `/home/node`
    /// - shutdown grace: `[server].shutdown_grace_secs` > 30
    /// - fallback API key: `ANTHROPIC_API_KEY` env only
    pub fn resolve(overrides: &CliOverrides) -> Result<Self> {
        let file = load_config().unwrap_or_default();

        let bind = overrides
            .bind
            .clone()
            .or_else(|| std::env::var("DROVER_BIND").ok())
            .or_else(|| file.server.bind.clone())
            .unwrap_or_else(|| DEFAULT_BIND.to_string());

        let port = match overrides.port {
            Some(port) => port,
            None => match std::env::var("PORT") {
                Ok(raw) => raw
                    .parse::<u16>()
                    .with_context(|| format!("PORT env var {raw:?} is not a valid port"))?,
                Err(_) => file.server.port.unwrap_or(DEFAULT_PORT),
            },
        };

        let agent_bin = overrides
            .agent_bin
            .clone()
            .or_else(|| std::env::var("DROVER_AGENT_BIN").ok())
            .or_else(|| file.agent.binary_path.clone())
            .unwrap_or_else(|| DEFAULT_AGENT_BIN.to_string());

        let agent_home = std::env::var("DROVER_AGENT_HOME")
            .ok()
            .or_else(|| file.agent.home_dir.clone())
            .unwrap_or_else(|| DEFAULT_AGENT_HOME.to_string());

        let shutdown_grace = Duration::from_secs(
            file.server
                .shutdown_grace_secs
                .unwrap_or(DEFAULT_SHUTDOWN_GRACE_SECS),
        );

        let fallback_api_key = std::env::var("ANTHROPIC_API_KEY")
            .ok()
            .filter(|key| !key.is_empty());

        Ok(Self {
            bind,
            port,
            agent_bin,
            agent_home: PathBuf::from(agent_home),
            shutdown_grace,
            fallback_api_key,
        })
    }
}

// -----------------------------------------------------------------------
// Tests
// -----------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn lock_env() -> std::sync::MutexGuard<'static, ()> {
        crate::test_util::lock_env()
    }

    /// Clear every variable the resolution chain reads.
    fn clear_resolve_env() {
        for var in [
            "DROVER_BIND",
            "PORT",
            "DROVER_AGENT_BIN",
            "DROVER_AGENT_HOME",
            "ANTHROPIC_API_KEY",
        ] {
            unsafe { std::env::remove_var(var) };
        }
    }

    #[test]
    fn config_path_ends_with_expected_filename() {
        let _lock = lock_env();
        let path = config_path();
        assert!(
            path.ends_with("drover/config.toml"),
            "unexpected config path: {}",
            path.display()
        );
    }

    #[test]
    fn config_file_roundtrip() {
        let original = ConfigFile {
            server: ServerSection {
                bind: Some("127.0.0.1".to_string()),
                port: Some(9000),
                shutdown_grace_secs: Some(10),
            },
            agent: AgentSection {
                binary_path: Some("/opt/agent/run.sh".to_string()),
                home_dir: Some("/home/agent".to_string()),
            },
        };

        let contents = toml::to_string_pretty(&original).unwrap();
        let loaded: ConfigFile = toml::from_str(&contents).unwrap();

        assert_eq!(loaded.server.bind, original.server.bind);
        assert_eq!(loaded.server.port, original.server.port);
        assert_eq!(
            loaded.server.shutdown_grace_secs,
            original.server.shutdown_grace_secs
        );
        assert_eq!(loaded.agent.binary_path, original.agent.binary_path);
        assert_eq!(loaded.agent.home_dir, original.agent.home_dir);
    }

    #[test]
    fn config_file_tolerates_missing_sections() {
        let loaded: ConfigFile = toml::from_str("[server]\nport = 9000\n").unwrap();
        assert_eq!(loaded.server.port, Some(9000));
        assert_eq!(loaded.server.bind, None);
        assert_eq!(loaded.agent.binary_path, None);

        let empty: ConfigFile = toml::from_str("").unwrap();
        assert_eq!(empty.server.port, None);
    }

    #[test]
    fn resolve_with_cli_flags_overrides_all() {
        let _lock = lock_env();
        clear_resolve_env();

        unsafe { std::env::set_var("DROVER_BIND", "10.0.0.1") };
        unsafe { std::env::set_var("PORT", "9999") };
        unsafe { std::env::set_var("DROVER_AGENT_BIN", "/env/agent.sh") };

        let config = DroverConfig::resolve(&CliOverrides {
            bind: Some("127.0.0.1".to_string()),
            port: Some(3000),
            agent_bin: Some("/cli/agent.sh".to_string()),
        })
        .unwrap();

        assert_eq!(config.bind, "127.0.0.1");
        assert_eq!(config.port, 3000);
        assert_eq!(config.agent_bin, "/cli/agent.sh");

        clear_resolve_env();
    }

    #[test]
    fn resolve_reads_env_vars_when_no_flags() {
        let _lock = lock_env();
        clear_resolve_env();

        unsafe { std::env::set_var("DROVER_BIND", "192.168.1.5") };
        unsafe { std::env::set_var("PORT", "8500") };
        unsafe { std::env::set_var("DROVER_AGENT_HOME", "/srv/agent") };
        unsafe { std::env::set_var("ANTHROPIC_API_KEY", "sk-ant-env") };

        let config = DroverConfig::resolve(&CliOverrides::default()).unwrap();

        assert_eq!(config.bind, "192.168.1.5");
        assert_eq!(config.port, 8500);
        assert_eq!(config.agent_home, PathBuf::from("/srv/agent"));
        assert_eq!(config.fallback_api_key.as_deref(), Some("sk-ant-env"));

        clear_resolve_env();
    }

    #[test]
    fn resolve_rejects_unparseable_port() {
        let _lock = lock_env();
        clear_resolve_env();

        unsafe { std::env::set_var("PORT", "not-a-port") };

        let result = DroverConfig::resolve(&CliOverrides::default());

        clear_resolve_env();

        let err = result.expect_err("invalid PORT should fail resolution");
        assert!(
            err.to_string().contains("not a valid port"),
            "unexpected error: {err:#}"
        );
    }

    #[test]
    fn resolve_defaults_when_nothing_is_set() {
        let _lock = lock_env();
        clear_resolve_env();

        // Point XDG_CONFIG_HOME at an empty temp dir so a developer's real
        // config file cannot leak into the test.
        let tmp = tempfile::TempDir::new().unwrap();
        let orig_xdg = std::env::var("XDG_CONFIG_HOME").ok();
        unsafe { std::env::set_var("XDG_CONFIG_HOME", tmp.path()) };

        let result = DroverConfig::resolve(&CliOverrides::default());

        // Restore env before asserting, to avoid poisoning the mutex on failure.
        match orig_xdg {
            Some(x) => unsafe { std::env::set_var("XDG_CONFIG_HOME", x) },
            None => unsafe { std::env::remove_var("XDG_CONFIG_HOME") },
        }

        let config = result.unwrap();
        assert_eq!(config.bind, DEFAULT_BIND);
        assert_eq!(config.port, DEFAULT_PORT);
        assert_eq!(config.agent_bin, DEFAULT_AGENT_BIN);
        assert_eq!(config.agent_home, PathBuf::from(DEFAULT_AGENT_HOME));
        assert_eq!(
            config.shutdown_grace,
            Duration::from_secs(DEFAULT_SHUTDOWN_GRACE_SECS)
        );
        assert_eq!(config.fallback_api_key, None);
    }

    #[test]
    fn resolve_reads_the_config_file() {
        let _lock = lock_env();
        clear_resolve_env();

        let tmp = tempfile::TempDir::new().unwrap();
        let dir = tmp.path().join("drover");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(
            dir.join("config.toml"),
            "[server]\nbind = \"127.0.0.1\"\nport = 9100\nshutdown_grace_secs = 5\n\n\
             [agent]\nbinary_path = \"/opt/run.sh\"\nhome_dir = \"/opt/home\"\n",
        )
        .unwrap();

        let orig_xdg = std::env::var("XDG_CONFIG_HOME").ok();
        unsafe { std::env::set_var("XDG_CONFIG_HOME", tmp.path()) };

        let result = DroverConfig::resolve(&CliOverrides::default());

        match orig_xdg {
            Some(x) => unsafe { std::env::set_var("XDG_CONFIG_HOME", x) },
            None => unsafe { std::env::remove_var("XDG_CONFIG_HOME") },
        }

        let config = result.unwrap();
        assert_eq!(config.bind, "127.0.0.1");
        assert_eq!(config.port, 9100);
        assert_eq!(config.agent_bin, "/opt/run.sh");
        assert_eq!(config.agent_home, PathBuf::from("/opt/home"));
        assert_eq!(config.shutdown_grace, Duration::from_secs(5));
    }

    #[test]
    fn env_vars_beat_the_config_file() {
        let _lock = lock_env();
        clear_resolve_env();

        let tmp = tempfile::TempDir::new().unwrap();
        let dir = tmp.path().join("drover");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("config.toml"), "[server]\nport = 9100\n").unwrap();

        let orig_xdg = std::env::var("XDG_CONFIG_HOME").ok();
        unsafe { std::env::set_var("XDG_CONFIG_HOME", tmp.path()) };
        unsafe { std::env::set_var("PORT", "8200") };

        let result = DroverConfig::resolve(&CliOverrides::default());

        match orig_xdg {
            Some(x) => unsafe { std::env::set_var("XDG_CONFIG_HOME", x) },
            None => unsafe { std::env::remove_var("XDG_CONFIG_HOME") },
        }
        clear_resolve_env();

        assert_eq!(result.unwrap().port, 8200);
    }
}
