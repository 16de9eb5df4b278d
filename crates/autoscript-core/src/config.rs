//! Layered `RunnerConfig` (§4.8): defaults < global file < project file <
//! environment < explicit overrides, deep-merged as partial/`Option`
//! representations. Modeled directly on `tandem-core::ConfigStore`'s
//! global/project/managed/env/runtime/cli layering, trimmed to the layers
//! this runtime actually needs.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::RunnerError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunnerConfig {
    pub log_level: String,
    pub snapshot_dir: PathBuf,
    pub default_throttle_ms: u64,
    pub mock_feed_base_delay_ms: u64,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            snapshot_dir: PathBuf::from(".autoscript/snapshots"),
            default_throttle_ms: 250,
            mock_feed_base_delay_ms: 50,
        }
    }
}

/// The partial view of `RunnerConfig` each layer contributes before merging.
/// Mirrors `ConfigStore`'s practice of treating every layer as an all-`Option`
/// overlay on top of the previous one.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PartialRunnerConfig {
    #[serde(default)]
    pub log_level: Option<String>,
    #[serde(default)]
    pub snapshot_dir: Option<PathBuf>,
    #[serde(default)]
    pub default_throttle_ms: Option<u64>,
    #[serde(default)]
    pub mock_feed_base_delay_ms: Option<u64>,
}

impl PartialRunnerConfig {
    fn merge_onto(self, base: RunnerConfig) -> RunnerConfig {
        RunnerConfig {
            log_level: self.log_level.unwrap_or(base.log_level),
            snapshot_dir: self.snapshot_dir.unwrap_or(base.snapshot_dir),
            default_throttle_ms: self
                .default_throttle_ms
                .map(|v| v.max(100))
                .unwrap_or(base.default_throttle_ms),
            mock_feed_base_delay_ms: self.mock_feed_base_delay_ms.unwrap_or(base.mock_feed_base_delay_ms),
        }
    }
}

/// Which layer last set each field — the detail `autoscript config show`
/// prints so layering issues are debuggable.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ConfigProvenance {
    pub log_level: &'static str,
    pub snapshot_dir: &'static str,
    pub default_throttle_ms: &'static str,
    pub mock_feed_base_delay_ms: &'static str,
}

fn track(provenance: &mut ConfigProvenance, layer: &PartialRunnerConfig, name: &'static str) {
    if layer.log_level.is_some() {
        provenance.log_level = name;
    }
    if layer.snapshot_dir.is_some() {
        provenance.snapshot_dir = name;
    }
    if layer.default_throttle_ms.is_some() {
        provenance.default_throttle_ms = name;
    }
    if layer.mock_feed_base_delay_ms.is_some() {
        provenance.mock_feed_base_delay_ms = name;
    }
}

/// Resolves `RunnerConfig` by layering, lowest to highest precedence:
/// built-in defaults, a global TOML file, a project TOML file, `AUTOSCRIPT_*`
/// environment variables, and explicit overrides (e.g. CLI flags). A missing
/// or unreadable file is an empty layer, not an error; a present-but-malformed
/// file surfaces as [`RunnerError::Config`].
pub fn resolve_config(
    project_dir: &Path,
    explicit: PartialRunnerConfig,
) -> Result<(RunnerConfig, ConfigProvenance), RunnerError> {
    let mut config = RunnerConfig::default();
    let mut provenance = ConfigProvenance {
        log_level: "default",
        snapshot_dir: "default",
        default_throttle_ms: "default",
        mock_feed_base_delay_ms: "default",
    };

    let global_path = global_config_path();
    let global = read_toml_layer(&global_path)?;
    track(&mut provenance, &global, "global");
    config = global.merge_onto(config);

    let project_path = project_dir.join("autoscript.toml");
    let project = read_toml_layer(&project_path)?;
    track(&mut provenance, &project, "project");
    config = project.merge_onto(config);

    let env = env_layer();
    track(&mut provenance, &env, "env");
    config = env.merge_onto(config);

    track(&mut provenance, &explicit, "cli");
    config = explicit.merge_onto(config);

    Ok((config, provenance))
}

fn global_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("autoscript")
        .join("config.toml")
}

fn read_toml_layer(path: &Path) -> Result<PartialRunnerConfig, RunnerError> {
    if !path.exists() {
        return Ok(PartialRunnerConfig::default());
    }
    let raw = std::fs::read_to_string(path)
        .map_err(|e| RunnerError::Config(anyhow::anyhow!("reading {}: {e}", path.display())))?;
    toml::from_str(&raw)
        .map_err(|e| RunnerError::Config(anyhow::anyhow!("parsing {}: {e}", path.display())))
}

fn env_layer() -> PartialRunnerConfig {
    let mut layer = PartialRunnerConfig::default();
    if let Ok(v) = std::env::var("AUTOSCRIPT_LOG_LEVEL") {
        if !v.trim().is_empty() {
            layer.log_level = Some(v);
        }
    }
    if let Ok(v) = std::env::var("AUTOSCRIPT_SNAPSHOT_DIR") {
        if !v.trim().is_empty() {
            layer.snapshot_dir = Some(PathBuf::from(v));
        }
    }
    if let Ok(v) = std::env::var("AUTOSCRIPT_DEFAULT_THROTTLE_MS") {
        if let Ok(parsed) = v.parse::<u64>() {
            layer.default_throttle_ms = Some(parsed);
        }
    }
    if let Ok(v) = std::env::var("AUTOSCRIPT_MOCK_FEED_BASE_DELAY_MS") {
        if let Ok(parsed) = v.parse::<u64>() {
            layer.mock_feed_base_delay_ms = Some(parsed);
        }
    }
    layer
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn project_file_overrides_default_but_env_overrides_project() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("autoscript.toml"), "log_level = \"debug\"\n").unwrap();
        std::env::set_var("AUTOSCRIPT_LOG_LEVEL", "trace");

        let (config, provenance) = resolve_config(dir.path(), PartialRunnerConfig::default()).unwrap();
        assert_eq!(config.log_level, "trace");
        assert_eq!(provenance.log_level, "env");

        std::env::remove_var("AUTOSCRIPT_LOG_LEVEL");
    }

    #[test]
    fn absent_files_behave_like_empty_layers() {
        let dir = tempfile::tempdir().unwrap();
        let (config, provenance) = resolve_config(dir.path(), PartialRunnerConfig::default()).unwrap();
        assert_eq!(config.log_level, "info");
        assert_eq!(provenance.log_level, "default");
    }

    #[test]
    fn malformed_present_file_is_a_config_error() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("autoscript.toml"), "not = [valid").unwrap();
        let result = resolve_config(dir.path(), PartialRunnerConfig::default());
        assert!(matches!(result, Err(RunnerError::Config(_))));
    }

    #[test]
    fn explicit_overrides_win_over_everything() {
        let dir = tempfile::tempdir().unwrap();
        let explicit = PartialRunnerConfig {
            log_level: Some("warn".to_string()),
            ..Default::default()
        };
        let (config, provenance) = resolve_config(dir.path(), explicit).unwrap();
        assert_eq!(config.log_level, "warn");
        assert_eq!(provenance.log_level, "cli");
    }
}
