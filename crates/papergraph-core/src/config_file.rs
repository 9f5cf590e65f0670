use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// On-disk TOML configuration structure.
/// All fields are optional so partial configs work (merge with defaults).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfigFile {
    pub database: Option<DatabaseConfig>,
    pub llm: Option<LlmConfig>,
    pub batch: Option<BatchConfig>,
    pub web: Option<WebConfig>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub path: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LlmConfig {
    pub api_key: Option<String>,
    pub endpoint: Option<String>,
    pub model: Option<String>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    pub max_attempts: Option<u32>,
    pub backoff_step_secs: Option<u64>,
    pub max_prompt_chars: Option<usize>,
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchConfig {
    pub pacing_secs: Option<u64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WebConfig {
    pub bind: Option<String>,
}

/// Platform config directory path: `<config_dir>/papergraph/config.toml`.
pub fn config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("papergraph").join("config.toml"))
}

/// Load config by cascading CWD `.papergraph.toml` over platform config.
/// CWD values override platform values.
pub fn load_config() -> ConfigFile {
    let platform = config_path().and_then(|p| load_from_path(&p));
    let cwd = load_from_path(Path::new(".papergraph.toml"));

    match (platform, cwd) {
        (None, None) => ConfigFile::default(),
        (Some(p), None) => p,
        (None, Some(c)) => c,
        (Some(p), Some(c)) => merge(p, c),
    }
}

/// Load a config from a specific path. Returns `None` if the file doesn't
/// exist or can't be parsed.
pub fn load_from_path(path: &Path) -> Option<ConfigFile> {
    let content = std::fs::read_to_string(path).ok()?;
    match toml::from_str(&content) {
        Ok(config) => Some(config),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "ignoring unparseable config file");
            None
        }
    }
}

/// Merge two configs: `overlay` values take precedence over `base`.
pub fn merge(base: ConfigFile, overlay: ConfigFile) -> ConfigFile {
    let base_llm = base.llm.unwrap_or_default();
    let overlay_llm = overlay.llm.unwrap_or_default();

    ConfigFile {
        database: Some(DatabaseConfig {
            path: overlay
                .database
                .as_ref()
                .and_then(|d| d.path.clone())
                .or_else(|| base.database.as_ref().and_then(|d| d.path.clone())),
        }),
        llm: Some(LlmConfig {
            api_key: overlay_llm.api_key.or(base_llm.api_key),
            endpoint: overlay_llm.endpoint.or(base_llm.endpoint),
            model: overlay_llm.model.or(base_llm.model),
            temperature: overlay_llm.temperature.or(base_llm.temperature),
            max_tokens: overlay_llm.max_tokens.or(base_llm.max_tokens),
            max_attempts: overlay_llm.max_attempts.or(base_llm.max_attempts),
            backoff_step_secs: overlay_llm
                .backoff_step_secs
                .or(base_llm.backoff_step_secs),
            max_prompt_chars: overlay_llm.max_prompt_chars.or(base_llm.max_prompt_chars),
            timeout_secs: overlay_llm.timeout_secs.or(base_llm.timeout_secs),
        }),
        batch: Some(BatchConfig {
            pacing_secs: overlay
                .batch
                .as_ref()
                .and_then(|b| b.pacing_secs)
                .or_else(|| base.batch.as_ref().and_then(|b| b.pacing_secs)),
        }),
        web: Some(WebConfig {
            bind: overlay
                .web
                .as_ref()
                .and_then(|w| w.bind.clone())
                .or_else(|| base.web.as_ref().and_then(|w| w.bind.clone())),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_toml_parses() {
        let toml_str = "[llm]\nmodel = \"llama-3.1-8b-instant\"\nmax_attempts = 4\n";
        let parsed: ConfigFile = toml::from_str(toml_str).unwrap();
        let llm = parsed.llm.unwrap();
        assert_eq!(llm.model.as_deref(), Some("llama-3.1-8b-instant"));
        assert_eq!(llm.max_attempts, Some(4));
        assert!(llm.api_key.is_none());
        assert!(parsed.database.is_none());
    }

    #[test]
    fn merge_overlay_wins() {
        let base = ConfigFile {
            database: Some(DatabaseConfig {
                path: Some("/base/graph.db".to_string()),
            }),
            ..Default::default()
        };
        let overlay = ConfigFile {
            database: Some(DatabaseConfig {
                path: Some("/overlay/graph.db".to_string()),
            }),
            ..Default::default()
        };
        let merged = merge(base, overlay);
        assert_eq!(merged.database.unwrap().path.unwrap(), "/overlay/graph.db");
    }

    #[test]
    fn merge_base_preserved_when_overlay_absent() {
        let base = ConfigFile {
            llm: Some(LlmConfig {
                endpoint: Some("http://localhost:8080/v1/chat/completions".to_string()),
                ..Default::default()
            }),
            batch: Some(BatchConfig {
                pacing_secs: Some(7),
            }),
            ..Default::default()
        };
        let merged = merge(base, ConfigFile::default());
        assert_eq!(
            merged.llm.unwrap().endpoint.unwrap(),
            "http://localhost:8080/v1/chat/completions"
        );
        assert_eq!(merged.batch.unwrap().pacing_secs, Some(7));
    }

    #[test]
    fn unreadable_path_is_none() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_from_path(&dir.path().join("missing.toml")).is_none());

        let bad = dir.path().join("bad.toml");
        std::fs::write(&bad, "this is [not toml").unwrap();
        assert!(load_from_path(&bad).is_none());
    }
}
