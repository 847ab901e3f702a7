use std::path::PathBuf;

use serde_json::Value;

use crate::{Result, turn::Turn};

pub const MODE_AGENT_LLAMA: &str = "agent_llama";
pub const MODE_AGENT_OPENAI: &str = "agent_openai";

/// Whether the host's model backend is currently producing output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum KernelState {
    #[default]
    Idle,
    Busy,
    Error,
}

impl KernelState {
    #[must_use]
    pub fn is_busy(self) -> bool {
        self == Self::Busy
    }
}

/// Agent families whose provider can be switched from chat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AgentType {
    Llama,
    OpenAi,
}

impl AgentType {
    /// Agent family served by `mode`, if `mode` is an agent mode.
    #[must_use]
    pub fn for_mode(mode: &str) -> Option<Self> {
        match mode {
            MODE_AGENT_LLAMA => Some(Self::Llama),
            MODE_AGENT_OPENAI => Some(Self::OpenAi),
            _ => None,
        }
    }

    /// Config key holding the active provider for this family.
    #[must_use]
    pub fn provider_key(self) -> &'static str {
        match self {
            Self::Llama => "agent.llama.provider",
            Self::OpenAi => "agent.openai.provider",
        }
    }
}

/// Application events plugins can receive or the gateway can emit.
#[derive(Debug, Clone, PartialEq)]
pub enum HostEvent {
    Enable { plugin_id: String },
    Disable { plugin_id: String },
    PluginSettingsChanged,
    ForceStop,
    /// User text entered from outside the host UI.
    UserSend { text: String },
}

/// Operations the host exposes to plugins.
///
/// Implementations are not thread-safe; call only from the host's main
/// thread (see [`crate::main_thread`]).
pub trait HostApp {
    /// Submit text into the chat pipeline as if typed by the user.
    fn send_text(&mut self, text: &str, internal: bool) -> Result<()>;

    /// Snapshot of the most recent turn across all conversations.
    fn last_turn(&self) -> Option<Turn>;

    fn kernel_state(&self) -> KernelState;

    fn dispatch(&mut self, event: HostEvent);

    /// Start a fresh conversation context.
    fn new_context(&mut self) -> Result<()>;

    fn modes(&self) -> Vec<String>;
    fn current_mode(&self) -> String;
    fn select_mode(&mut self, mode: &str) -> Result<()>;

    fn models_for_mode(&self, mode: &str) -> Vec<String>;
    fn select_model(&mut self, model: &str) -> Result<()>;

    fn plugin_ids(&self) -> Vec<String>;

    fn is_plugin_registered(&self, id: &str) -> bool {
        self.plugin_ids().iter().any(|p| p == id)
    }

    fn enable_plugin(&mut self, id: &str) -> Result<()>;
    fn disable_plugin(&mut self, id: &str) -> Result<()>;
    fn is_plugin_enabled(&self, id: &str) -> bool;

    fn agent_choices(&self, agent_type: AgentType) -> Vec<String>;

    /// Whether any agent family knows the provider `id`.
    fn has_agent(&self, id: &str) -> bool;

    fn set_config(&mut self, key: &str, value: Value) -> Result<()>;

    /// Resolve a host-reported image path against the working directory.
    fn to_workdir(&self, path: &str) -> PathBuf;

    /// Settings object for the given plugin.
    fn plugin_options(&self, plugin_id: &str) -> Value;
}
