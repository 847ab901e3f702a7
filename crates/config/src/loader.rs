use std::path::{Path, PathBuf};

use {
    secrecy::Secret,
    tracing::{debug, warn},
};

use crate::{env_subst::substitute_env, schema::DeskgramConfig};

/// Standard config file names, checked in order.
pub(crate) const CONFIG_FILENAMES: &[&str] = &[
    "deskgram.toml",
    "deskgram.yaml",
    "deskgram.yml",
    "deskgram.json",
];

/// Environment variable overriding `gateway.bot_token`.
pub const ENV_BOT_TOKEN: &str = "DESKGRAM_BOT_TOKEN";

/// Environment variable overriding `gateway.allowed_user_ids`.
pub const ENV_ALLOWED_USER_IDS: &str = "DESKGRAM_ALLOWED_USER_IDS";

/// Load config from the given path (any supported format).
pub fn load_config(path: &Path) -> anyhow::Result<DeskgramConfig> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("failed to read {}: {e}", path.display()))?;
    let raw = substitute_env(&raw);
    parse_config(&raw, path)
}

/// Discover and load config from standard locations.
///
/// Search order:
/// 1. `./deskgram.{toml,yaml,yml,json}` (project-local)
/// 2. `~/.config/deskgram/deskgram.{toml,yaml,yml,json}` (user-global)
///
/// Returns `DeskgramConfig::default()` if no config file is found or the
/// file fails to parse.
pub fn discover_and_load() -> DeskgramConfig {
    if let Some(path) = find_config_file() {
        debug!(path = %path.display(), "loading config");
        match load_config(&path) {
            Ok(cfg) => return cfg,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to load config, using defaults");
            },
        }
    } else {
        debug!("no config file found, using defaults");
    }
    DeskgramConfig::default()
}

/// Find the first config file in standard locations.
pub fn find_config_file() -> Option<PathBuf> {
    CONFIG_FILENAMES
        .iter()
        .map(PathBuf::from)
        .find(|p| p.exists())
        .or_else(|| {
            let dir = config_dir()?;
            CONFIG_FILENAMES
                .iter()
                .map(|name| dir.join(name))
                .find(|p| p.exists())
        })
}

/// Returns the user-global config directory (`~/.config/deskgram/`).
pub fn config_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "deskgram").map(|d| d.config_dir().to_path_buf())
}

/// Apply `DESKGRAM_*` environment overrides on top of a loaded config.
pub fn apply_env_overrides(config: &mut DeskgramConfig) {
    apply_env_overrides_with(config, |name| std::env::var(name).ok());
}

fn apply_env_overrides_with(config: &mut DeskgramConfig, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(token) = lookup(ENV_BOT_TOKEN).filter(|t| !t.trim().is_empty()) {
        debug!("bot token taken from {ENV_BOT_TOKEN}");
        config.gateway.bot_token = Secret::new(token.trim().to_string());
    }
    if let Some(ids) = lookup(ENV_ALLOWED_USER_IDS) {
        config.gateway.allowed_user_ids = ids;
    }
}

fn parse_config(raw: &str, path: &Path) -> anyhow::Result<DeskgramConfig> {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("toml");

    match ext {
        "toml" => Ok(toml::from_str(raw)?),
        "yaml" | "yml" => Ok(serde_yaml::from_str(raw)?),
        "json" => Ok(serde_json::from_str(raw)?),
        _ => anyhow::bail!("unsupported config format: .{ext}"),
    }
}
