//! Configuration loader.
//!
//! Reads `config.toml` from an explicit path, the `CRMPILOT_CONFIG`
//! environment variable, or the working directory, in that order. A missing
//! or malformed file falls back to [`AppConfig::default()`] with a warning
//! so the service always starts (mock adapter, keyword provider).

use std::path::{Path, PathBuf};

use crmpilot_types::config::AppConfig;

/// Resolve the config file path from CLI flag or environment.
pub fn resolve_config_path(explicit: Option<&Path>) -> PathBuf {
    if let Some(path) = explicit {
        return path.to_path_buf();
    }
    if let Ok(path) = std::env::var("CRMPILOT_CONFIG") {
        return PathBuf::from(path);
    }
    PathBuf::from("config.toml")
}

/// Load configuration from `path`, falling back to defaults.
pub async fn load_config(path: &Path) -> AppConfig {
    let content = match tokio::fs::read_to_string(path).await {
        Ok(content) => content,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!("no config file at {}, using defaults", path.display());
            return AppConfig::default();
        }
        Err(err) => {
            tracing::warn!("failed to read {}: {err}, using defaults", path.display());
            return AppConfig::default();
        }
    };

    match toml::from_str::<AppConfig>(&content) {
        Ok(config) => config,
        Err(err) => {
            tracing::warn!("failed to parse {}: {err}, using defaults", path.display());
            AppConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn missing_file_returns_defaults() {
        let tmp = TempDir::new().unwrap();
        let config = load_config(&tmp.path().join("config.toml")).await;
        assert_eq!(config.crm.adapter, "mock");
        assert_eq!(config.server.bind_addr, "127.0.0.1:8080");
    }

    #[tokio::test]
    async fn valid_file_is_parsed() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("config.toml");
        tokio::fs::write(
            &path,
            r#"
[server]
bind_addr = "0.0.0.0:3100"

[conversation]
window_turns = 8

[inference]
provider = "openai"
model = "gpt-4o"
"#,
        )
        .await
        .unwrap();

        let config = load_config(&path).await;
        assert_eq!(config.server.bind_addr, "0.0.0.0:3100");
        assert_eq!(config.conversation.window_turns, 8);
        assert_eq!(config.inference.provider, "openai");
        // Unspecified sections keep defaults.
        assert_eq!(config.dispatch.retry_limit, 2);
    }

    #[tokio::test]
    async fn invalid_file_returns_defaults() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("config.toml");
        tokio::fs::write(&path, "not [ valid { toml").await.unwrap();

        let config = load_config(&path).await;
        assert_eq!(config.crm.adapter, "mock");
    }

    #[test]
    fn explicit_path_wins() {
        let path = resolve_config_path(Some(Path::new("/etc/crmpilot/config.toml")));
        assert_eq!(path, PathBuf::from("/etc/crmpilot/config.toml"));
    }
}
