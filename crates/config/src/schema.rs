//! Config schema types for the gateway plugin and the bundled local host.

use std::{collections::HashMap, path::PathBuf, time::Duration};

use {
    secrecy::{ExposeSecret, Secret},
    serde::{Deserialize, Serialize},
};

/// Responses are never awaited for less than this, whatever the config says.
pub const MIN_RESPONSE_TIMEOUT_SECS: u64 = 60;

/// Lower bound for the idle window after the last observed reply fragment.
pub const MIN_IDLE_WINDOW_SECS: f64 = 2.0;

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DeskgramConfig {
    pub gateway: GatewayConfig,
    pub host: LocalHostConfig,
}

/// Settings of the Telegram gateway plugin, as edited in the host's plugin
/// settings panel.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Bot token from @BotFather.
    #[serde(serialize_with = "serialize_secret")]
    pub bot_token: Secret<String>,

    /// Comma-separated numeric Telegram user IDs. Blank allows anyone.
    pub allowed_user_ids: String,

    /// Maximum time to wait for a host reply, in seconds.
    pub response_timeout: u64,

    /// Quiet time after the last reply fragment before the exchange is
    /// considered finished, in seconds.
    pub idle_window: f64,

    /// Bounded wait for calls marshalled onto the host main thread, in seconds.
    pub main_thread_timeout: u64,

    /// Bounded wait for the bot thread on stop, in seconds.
    pub shutdown_timeout: u64,
}

impl GatewayConfig {
    /// Response timeout with the enforced minimum applied.
    #[must_use]
    pub fn effective_response_timeout(&self) -> Duration {
        Duration::from_secs(self.response_timeout.max(MIN_RESPONSE_TIMEOUT_SECS))
    }

    /// Idle window with the enforced minimum applied.
    #[must_use]
    pub fn effective_idle_window(&self) -> Duration {
        let secs = if self.idle_window.is_finite() {
            self.idle_window.max(MIN_IDLE_WINDOW_SECS)
        } else {
            MIN_IDLE_WINDOW_SECS
        };
        Duration::from_secs_f64(secs)
    }

    #[must_use]
    pub fn main_thread_timeout(&self) -> Duration {
        Duration::from_secs(self.main_thread_timeout.max(1))
    }

    #[must_use]
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout.max(1))
    }

    #[must_use]
    pub fn has_token(&self) -> bool {
        !self.bot_token.expose_secret().trim().is_empty()
    }
}

impl std::fmt::Debug for GatewayConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayConfig")
            .field("bot_token", &"[REDACTED]")
            .field("allowed_user_ids", &self.allowed_user_ids)
            .field("response_timeout", &self.response_timeout)
            .field("idle_window", &self.idle_window)
            .finish_non_exhaustive()
    }
}

fn serialize_secret<S: serde::Serializer>(
    secret: &Secret<String>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(secret.expose_secret())
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            bot_token: Secret::new(String::new()),
            allowed_user_ids: String::new(),
            response_timeout: MIN_RESPONSE_TIMEOUT_SECS,
            idle_window: MIN_IDLE_WINDOW_SECS,
            main_thread_timeout: 15,
            shutdown_timeout: 10,
        }
    }
}

/// Seed data for the in-memory host used by the standalone binary.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LocalHostConfig {
    /// Available modes, in display order.
    pub modes: Vec<String>,
    /// Mode selected at startup.
    pub mode: String,
    /// Models offered per mode.
    pub models: HashMap<String, Vec<String>>,
    /// Registered plugin IDs besides the gateway itself.
    pub plugins: Vec<String>,
    /// Agent providers selectable in `agent_llama` mode.
    pub llama_agents: Vec<String>,
    /// Agent providers selectable in `agent_openai` mode.
    pub openai_agents: Vec<String>,
    /// Directory relative image paths are resolved against.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workdir: Option<PathBuf>,
}

impl Default for LocalHostConfig {
    fn default() -> Self {
        Self {
            modes: vec![
                "chat".into(),
                "agent_llama".into(),
                "agent_openai".into(),
            ],
            mode: "chat".into(),
            models: HashMap::from([(
                "chat".to_string(),
                vec!["echo-small".to_string(), "echo-large".to_string()],
            )]),
            plugins: Vec::new(),
            llama_agents: vec!["react".into(), "planner".into()],
            openai_agents: vec!["assistant".into()],
            workdir: None,
        }
    }
}
