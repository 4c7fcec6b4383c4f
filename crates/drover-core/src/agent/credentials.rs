//! Credential injection and directory preparation for the agent CLI.
//!
//! The agent reads its API key from `{home}/.claude/config.json`. Keys
//! arrive per request (with a server-level fallback), so the file is
//! rewritten before each launch, preserving whatever other settings it
//! already holds. The write is plain last-writer-wins: the deployment is
//! single-tenant with one credential per instance, so concurrent requests
//! carry the same key and the race is benign.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde_json::{Map, Value};
use tracing::debug;

/// Location of the agent's config file under `agent_home`.
pub fn config_path(agent_home: &Path) -> PathBuf {
    agent_home.join(".claude").join("config.json")
}

/// Write `api_key` into the agent config file as `primaryApiKey`.
///
/// Creates the config directory if needed. An existing file that fails to
/// parse is replaced with a fresh one rather than failing the launch. The
/// file holds a credential, so its mode is tightened to 0600.
pub fn apply_credential(agent_home: &Path, api_key: &str) -> Result<()> {
    let dir = agent_home.join(".claude");
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("failed to create agent config directory {}", dir.display()))?;

    let path = config_path(agent_home);
    let mut config: Map<String, Value> = match std::fs::read_to_string(&path) {
        Ok(contents) => serde_json::from_str(&contents).unwrap_or_default(),
        Err(_) => Map::new(),
    };
    config.insert(
        "primaryApiKey".to_string(),
        Value::String(api_key.to_string()),
    );

    let contents = serde_json::to_string_pretty(&Value::Object(config))
        .context("failed to serialize agent config")?;
    std::fs::write(&path, contents)
        .with_context(|| format!("failed to write agent config {}", path.display()))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o600))
            .with_context(|| format!("failed to restrict permissions on {}", path.display()))?;
    }

    debug!(path = %path.display(), "applied agent credential");
    Ok(())
}

/// Create the auxiliary directories the agent expects to exist before it
/// starts: `.claude/statsig` for its telemetry cache and `.ssh` for keys
/// the entrypoint may install.
pub fn prepare_dirs(agent_home: &Path) -> Result<()> {
    for dir in [
        agent_home.join(".claude").join("statsig"),
        agent_home.join(".ssh"),
    ] {
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("failed to create agent directory {}", dir.display()))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    use tempfile::TempDir;

    #[test]
    fn writes_key_into_fresh_config() {
        let home = TempDir::new().expect("create temp home");
        apply_credential(home.path(), "sk-ant-test-123").expect("apply credential");

        let contents =
            std::fs::read_to_string(config_path(home.path())).expect("config file exists");
        let config: Value = serde_json::from_str(&contents).expect("config is valid JSON");
        assert_eq!(config["primaryApiKey"], "sk-ant-test-123");
    }

    #[test]
    fn preserves_existing_settings() {
        let home = TempDir::new().expect("create temp home");
        let dir = home.path().join(".claude");
        std::fs::create_dir_all(&dir).expect("create config dir");
        std::fs::write(
            dir.join("config.json"),
            r#"{"theme": "dark", "primaryApiKey": "old-key"}"#,
        )
        .expect("seed config");

        apply_credential(home.path(), "new-key").expect("apply credential");

        let contents =
            std::fs::read_to_string(config_path(home.path())).expect("config file exists");
        let config: Value = serde_json::from_str(&contents).expect("config is valid JSON");
        assert_eq!(config["primaryApiKey"], "new-key");
        assert_eq!(config["theme"], "dark");
    }

    #[test]
    fn replaces_corrupt_config() {
        let home = TempDir::new().expect("create temp home");
        let dir = home.path().join(".claude");
        std::fs::create_dir_all(&dir).expect("create config dir");
        std::fs::write(dir.join("config.json"), "not json {{{").expect("seed corrupt config");

        apply_credential(home.path(), "recovered-key").expect("apply credential");

        let contents =
            std::fs::read_to_string(config_path(home.path())).expect("config file exists");
        let config: Value = serde_json::from_str(&contents).expect("config is valid JSON");
        assert_eq!(config["primaryApiKey"], "recovered-key");
    }

    #[cfg(unix)]
    #[test]
    fn config_file_is_owner_readable_only() {
        use std::os::unix::fs::PermissionsExt;

        let home = TempDir::new().expect("create temp home");
        apply_credential(home.path(), "secret").expect("apply credential");

        let mode = std::fs::metadata(config_path(home.path()))
            .expect("config metadata")
            .permissions()
            .mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn prepare_dirs_creates_expected_layout() {
        let home = TempDir::new().expect("create temp home");
        prepare_dirs(home.path()).expect("prepare dirs");

        assert!(home.path().join(".claude/statsig").is_dir());
        assert!(home.path().join(".ssh").is_dir());

        // Idempotent when everything already exists.
        prepare_dirs(home.path()).expect("prepare dirs again");
    }
}
