use tracing::debug;

use crate::app::{HostApp, HostEvent};

/// A plugin the host notifies about application events.
pub trait HostPlugin: Send {
    fn id(&self) -> &str;
    fn name(&self) -> &str;

    /// React to `event`. Runs on the host's main thread.
    fn handle(&mut self, event: &HostEvent, host: &mut dyn HostApp);
}

/// Registered plugins, in registration order.
#[derive(Default)]
pub struct PluginRegistry {
    plugins: Vec<Box<dyn HostPlugin>>,
}

impl PluginRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `plugin`, replacing any plugin with the same id.
    pub fn register(&mut self, plugin: Box<dyn HostPlugin>) {
        self.plugins.retain(|p| p.id() != plugin.id());
        debug!(plugin_id = plugin.id(), "plugin registered");
        self.plugins.push(plugin);
    }

    #[must_use]
    pub fn get(&self, id: &str) -> Option<&dyn HostPlugin> {
        self.plugins.iter().find(|p| p.id() == id).map(|p| &**p)
    }

    #[must_use]
    pub fn ids(&self) -> Vec<String> {
        self.plugins.iter().map(|p| p.id().to_string()).collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }

    /// Forward `event` to every plugin.
    pub fn dispatch(&mut self, event: &HostEvent, host: &mut dyn HostApp) {
        for plugin in &mut self.plugins {
            plugin.handle(event, host);
        }
    }
}
