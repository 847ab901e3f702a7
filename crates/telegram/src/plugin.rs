use {
    deskgram_host::{HostApp, HostEvent, HostPlugin, MainThreadHandle},
    tracing::{error, info, warn},
};

use crate::{access::Allowlist, config, runtime::BotRuntime};

pub const PLUGIN_ID: &str = "telegram_gateway";

/// Host plugin running a Telegram bot that forwards chats into the host.
pub struct TelegramGatewayPlugin {
    host: MainThreadHandle,
    api_url: Option<reqwest::Url>,
    runtime: Option<BotRuntime>,
    allowlist: Allowlist,
}

impl TelegramGatewayPlugin {
    /// `host` is the handle the bot uses to reach the host's main thread.
    #[must_use]
    pub fn new(host: MainThreadHandle) -> Self {
        Self {
            host,
            api_url: None,
            runtime: None,
            allowlist: Allowlist::default(),
        }
    }

    /// Talk to a Bot API server other than `api.telegram.org`.
    #[must_use]
    pub fn with_api_url(mut self, url: reqwest::Url) -> Self {
        self.api_url = Some(url);
        self
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.runtime.as_ref().is_some_and(BotRuntime::is_running)
    }

    /// Allowlist applied by the most recent start.
    #[must_use]
    pub fn allowlist(&self) -> &Allowlist {
        &self.allowlist
    }

    fn start(&mut self, host: &dyn HostApp) {
        self.stop();

        let options = host.plugin_options(PLUGIN_ID);
        let gateway = match config::from_options(&options) {
            Ok(gateway) => gateway,
            Err(e) => {
                error!(plugin_id = PLUGIN_ID, error = %e, "invalid gateway settings");
                return;
            },
        };
        self.allowlist = config::allowlist(&gateway);

        if !gateway.has_token() {
            warn!(plugin_id = PLUGIN_ID, "bot token is empty; not starting");
            return;
        }

        match BotRuntime::start(gateway, self.host.clone(), self.api_url.as_ref()) {
            Ok(runtime) => {
                info!(
                    plugin_id = PLUGIN_ID,
                    allowlist = self.allowlist.len(),
                    "telegram bot started"
                );
                self.runtime = Some(runtime);
            },
            Err(e) => error!(plugin_id = PLUGIN_ID, error = %e, "failed to start telegram bot"),
        }
    }

    fn stop(&mut self) {
        if let Some(mut runtime) = self.runtime.take() {
            runtime.stop();
            info!(plugin_id = PLUGIN_ID, "telegram bot stopped");
        }
    }
}

impl HostPlugin for TelegramGatewayPlugin {
    fn id(&self) -> &str {
        PLUGIN_ID
    }

    fn name(&self) -> &str {
        "Telegram Gateway"
    }

    fn handle(&mut self, event: &HostEvent, host: &mut dyn HostApp) {
        match event {
            HostEvent::Enable { plugin_id } if plugin_id == PLUGIN_ID => {
                info!(plugin_id = PLUGIN_ID, "enable received; starting bot");
                self.start(host);
            },
            HostEvent::Disable { plugin_id } if plugin_id == PLUGIN_ID => {
                info!(plugin_id = PLUGIN_ID, "disable received; stopping bot");
                self.stop();
            },
            HostEvent::PluginSettingsChanged => {
                info!(plugin_id = PLUGIN_ID, "settings changed; restarting bot");
                self.start(host);
            },
            HostEvent::ForceStop => {
                info!(plugin_id = PLUGIN_ID, "force stop received; stopping bot");
                self.stop();
            },
            _ => {},
        }
    }
}

impl Drop for TelegramGatewayPlugin {
    fn drop(&mut self) {
        self.stop();
    }
}
