use std::sync::Arc;

use {deskgram_host::MainThreadHandle, tokio_util::sync::CancellationToken};

use crate::{access::Allowlist, outbound::ChatOutbound, poller::PollerSettings};

/// Everything a message handler needs, shared by the polling loop.
#[derive(Clone)]
pub struct BotContext {
    pub bot_username: Option<String>,
    pub outbound: Arc<dyn ChatOutbound>,
    pub host: MainThreadHandle,
    /// Rebuilt from the plugin options on every start.
    pub allowlist: Allowlist,
    pub poller: PollerSettings,
    pub cancel: CancellationToken,
}
