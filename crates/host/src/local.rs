//! In-memory [`HostApp`] used by the standalone binary and by tests.

use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    sync::{Arc, Mutex, MutexGuard},
};

use {
    deskgram_config::LocalHostConfig,
    serde_json::{Map, Value},
    tracing::{debug, info},
};

use crate::{
    Error, Result,
    app::{AgentType, HostApp, HostEvent, KernelState},
    error::Context,
    turn::Turn,
};

/// Produces the reply turn for submitted text. `id` and `input` are filled
/// in by the host.
pub type Responder = Arc<dyn Fn(&str) -> Turn + Send + Sync>;

struct LocalState {
    modes: Vec<String>,
    mode: String,
    models: HashMap<String, Vec<String>>,
    model: Option<String>,
    plugins: Vec<(String, bool)>,
    agents: HashMap<AgentType, Vec<String>>,
    config: Map<String, Value>,
    plugin_options: HashMap<String, Value>,
    turns: Vec<Turn>,
    next_id: u64,
    contexts: u64,
    kernel: KernelState,
    workdir: PathBuf,
    dispatched: Vec<HostEvent>,
    pending: Vec<HostEvent>,
}

/// Cloneable handle to shared host state.
#[derive(Clone)]
pub struct LocalHost {
    state: Arc<Mutex<LocalState>>,
    responder: Responder,
}

impl Default for LocalHost {
    fn default() -> Self {
        Self::from_config(&LocalHostConfig::default())
    }
}

impl LocalHost {
    #[must_use]
    pub fn from_config(config: &LocalHostConfig) -> Self {
        let workdir = config
            .workdir
            .clone()
            .or_else(|| std::env::current_dir().ok())
            .unwrap_or_else(|| PathBuf::from("."));
        let state = LocalState {
            modes: config.modes.clone(),
            mode: config.mode.clone(),
            models: config.models.clone(),
            model: None,
            plugins: config.plugins.iter().map(|p| (p.clone(), false)).collect(),
            agents: HashMap::from([
                (AgentType::Llama, config.llama_agents.clone()),
                (AgentType::OpenAi, config.openai_agents.clone()),
            ]),
            config: Map::new(),
            plugin_options: HashMap::new(),
            turns: Vec::new(),
            next_id: 1,
            contexts: 1,
            kernel: KernelState::Idle,
            workdir,
            dispatched: Vec::new(),
            pending: Vec::new(),
        };
        Self {
            state: Arc::new(Mutex::new(state)),
            responder: Arc::new(|text: &str| Turn {
                output: Some(text.to_string()),
                ..Turn::default()
            }),
        }
    }

    /// Replace the echo responder.
    #[must_use]
    pub fn with_responder(mut self, responder: impl Fn(&str) -> Turn + Send + Sync + 'static) -> Self {
        self.responder = Arc::new(responder);
        self
    }

    fn state(&self) -> MutexGuard<'_, LocalState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Add a plugin id to the registered set.
    pub fn register_plugin(&self, id: impl Into<String>, enabled: bool) {
        let id = id.into();
        let mut state = self.state();
        match state.plugins.iter_mut().find(|(p, _)| *p == id) {
            Some(entry) => entry.1 = enabled,
            None => state.plugins.push((id, enabled)),
        }
    }

    pub fn set_plugin_options(&self, id: impl Into<String>, options: Value) {
        self.state().plugin_options.insert(id.into(), options);
    }

    pub fn set_kernel_state(&self, kernel: KernelState) {
        self.state().kernel = kernel;
    }

    /// Append a turn as if produced by the host itself. Assigns and returns
    /// its id.
    pub fn push_turn(&self, mut turn: Turn) -> u64 {
        let mut state = self.state();
        turn.id = state.next_id;
        state.next_id += 1;
        let id = turn.id;
        state.turns.push(turn);
        id
    }

    /// Mutate the most recent turn in place.
    pub fn update_last_turn(&self, f: impl FnOnce(&mut Turn)) -> bool {
        match self.state().turns.last_mut() {
            Some(turn) => {
                f(turn);
                true
            },
            None => false,
        }
    }

    #[must_use]
    pub fn turns(&self) -> Vec<Turn> {
        self.state().turns.clone()
    }

    /// Every event passed to [`HostApp::dispatch`] or raised by a plugin
    /// toggle, in order.
    #[must_use]
    pub fn dispatched(&self) -> Vec<HostEvent> {
        self.state().dispatched.clone()
    }

    /// Events not yet forwarded to plugins.
    pub fn take_pending_events(&self) -> Vec<HostEvent> {
        std::mem::take(&mut self.state().pending)
    }

    #[must_use]
    pub fn config_value(&self, key: &str) -> Option<Value> {
        self.state().config.get(key).cloned()
    }

    #[must_use]
    pub fn current_model(&self) -> Option<String> {
        self.state().model.clone()
    }

    /// Number of contexts opened so far, including the initial one.
    #[must_use]
    pub fn contexts(&self) -> u64 {
        self.state().contexts
    }

    fn record(state: &mut LocalState, event: HostEvent) {
        state.dispatched.push(event.clone());
        state.pending.push(event);
    }

    fn set_plugin_enabled(&self, id: &str, enabled: bool) -> Result<()> {
        let mut state = self.state();
        let entry = state
            .plugins
            .iter_mut()
            .find(|(p, _)| p == id)
            .ok_or_else(|| Error::unknown("plugin", id))?;
        entry.1 = enabled;
        let plugin_id = id.to_string();
        let event = if enabled {
            HostEvent::Enable { plugin_id }
        } else {
            HostEvent::Disable { plugin_id }
        };
        Self::record(&mut state, event);
        info!(plugin_id = id, enabled, "plugin toggled");
        Ok(())
    }
}

impl HostApp for LocalHost {
    fn send_text(&mut self, text: &str, internal: bool) -> Result<()> {
        if text.trim().is_empty() {
            return Err(Error::message("empty input"));
        }
        debug!(internal, len = text.len(), "text submitted");

        let id = {
            let mut state = self.state();
            state.kernel = KernelState::Busy;
            let id = state.next_id;
            state.next_id += 1;
            state.turns.push(Turn {
                id,
                input: Some(text.to_string()),
                ..Turn::default()
            });
            id
        };

        // Run the responder without holding the lock.
        let reply = (self.responder)(text);

        let mut state = self.state();
        state.kernel = KernelState::Idle;
        let turn = state
            .turns
            .iter_mut()
            .find(|t| t.id == id)
            .with_context(|| format!("turn {id} disappeared while responding"))?;
        turn.output = reply.output;
        turn.results = reply.results;
        turn.images = reply.images;
        turn.extra = reply.extra;
        turn.stopped = reply.stopped;
        Ok(())
    }

    fn last_turn(&self) -> Option<Turn> {
        self.state().turns.last().cloned()
    }

    fn kernel_state(&self) -> KernelState {
        self.state().kernel
    }

    fn dispatch(&mut self, event: HostEvent) {
        Self::record(&mut self.state(), event);
    }

    fn new_context(&mut self) -> Result<()> {
        self.state().contexts += 1;
        Ok(())
    }

    fn modes(&self) -> Vec<String> {
        self.state().modes.clone()
    }

    fn current_mode(&self) -> String {
        self.state().mode.clone()
    }

    fn select_mode(&mut self, mode: &str) -> Result<()> {
        let mut state = self.state();
        if !state.modes.iter().any(|m| m == mode) {
            return Err(Error::unknown("mode", mode));
        }
        state.mode = mode.to_string();
        state.model = None;
        Ok(())
    }

    fn models_for_mode(&self, mode: &str) -> Vec<String> {
        self.state().models.get(mode).cloned().unwrap_or_default()
    }

    fn select_model(&mut self, model: &str) -> Result<()> {
        let mut state = self.state();
        let known = state
            .models
            .get(&state.mode)
            .is_some_and(|models| models.iter().any(|m| m == model));
        if !known {
            return Err(Error::unknown("model", model));
        }
        state.model = Some(model.to_string());
        Ok(())
    }

    fn plugin_ids(&self) -> Vec<String> {
        self.state().plugins.iter().map(|(p, _)| p.clone()).collect()
    }

    fn enable_plugin(&mut self, id: &str) -> Result<()> {
        self.set_plugin_enabled(id, true)
    }

    fn disable_plugin(&mut self, id: &str) -> Result<()> {
        self.set_plugin_enabled(id, false)
    }

    fn is_plugin_enabled(&self, id: &str) -> bool {
        self.state()
            .plugins
            .iter()
            .any(|(p, enabled)| p == id && *enabled)
    }

    fn agent_choices(&self, agent_type: AgentType) -> Vec<String> {
        self.state()
            .agents
            .get(&agent_type)
            .cloned()
            .unwrap_or_default()
    }

    fn has_agent(&self, id: &str) -> bool {
        self.state()
            .agents
            .values()
            .any(|ids| ids.iter().any(|a| a == id))
    }

    fn set_config(&mut self, key: &str, value: Value) -> Result<()> {
        self.state().config.insert(key.to_string(), value);
        Ok(())
    }

    fn to_workdir(&self, path: &str) -> PathBuf {
        let path = Path::new(path);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.state().workdir.join(path)
        }
    }

    fn plugin_options(&self, plugin_id: &str) -> Value {
        self.state()
            .plugin_options
            .get(plugin_id)
            .cloned()
            .unwrap_or_else(|| Value::Object(Map::new()))
    }
}
