//! Background thread hosting the bot's tokio runtime.

use std::{
    sync::mpsc::{self, RecvTimeoutError},
    thread::JoinHandle,
    time::Duration,
};

use {
    deskgram_config::GatewayConfig,
    deskgram_host::MainThreadHandle,
    secrecy::ExposeSecret,
    teloxide::Bot,
    tokio_util::sync::CancellationToken,
    tracing::{error, info, warn},
};

use crate::{Result, bot};

/// Extra time granted to the thread on top of the runtime shutdown bound.
const JOIN_GRACE: Duration = Duration::from_secs(2);

/// A running bot. Dropping it stops the bot.
pub struct BotRuntime {
    cancel: CancellationToken,
    thread: Option<JoinHandle<()>>,
    done_rx: mpsc::Receiver<()>,
    shutdown_timeout: Duration,
}

impl BotRuntime {
    /// Start the bot against `api_url`, or the public Bot API when `None`.
    pub fn start(
        config: GatewayConfig,
        host: MainThreadHandle,
        api_url: Option<&reqwest::Url>,
    ) -> Result<Self> {
        let bot = bot::build_bot(config.bot_token.expose_secret(), api_url)?;
        Self::start_with_bot(bot, config, host)
    }

    fn start_with_bot(bot: Bot, config: GatewayConfig, host: MainThreadHandle) -> Result<Self> {
        let cancel = CancellationToken::new();
        let shutdown_timeout = config.shutdown_timeout();
        let (done_tx, done_rx) = mpsc::channel();

        let token = cancel.clone();
        let thread = std::thread::Builder::new()
            .name("deskgram-telegram".into())
            .spawn(move || {
                let runtime = match tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                {
                    Ok(runtime) => runtime,
                    Err(e) => {
                        error!(error = %e, "failed to build telegram runtime");
                        let _ = done_tx.send(());
                        return;
                    },
                };

                info!("telegram bot thread started");
                let result = runtime.block_on(async {
                    tokio::select! {
                        () = token.cancelled() => Ok(()),
                        result = bot::run_with_bot(bot, config, host, token.clone()) => result,
                    }
                });
                if let Err(e) = result {
                    error!(error = %e, "telegram bot stopped with error");
                }

                token.cancel();
                runtime.shutdown_timeout(shutdown_timeout);
                info!("telegram bot thread stopped");
                let _ = done_tx.send(());
            })?;

        Ok(Self {
            cancel,
            thread: Some(thread),
            done_rx,
            shutdown_timeout,
        })
    }

    /// Whether the bot thread is still alive.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.thread.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Signal the bot to stop and wait a bounded time for its thread.
    ///
    /// Never blocks past the configured shutdown timeout plus a short grace;
    /// a thread that overruns is detached and logged.
    pub fn stop(&mut self) {
        self.cancel.cancel();
        let Some(thread) = self.thread.take() else {
            return;
        };

        let wait = self.shutdown_timeout + JOIN_GRACE;
        match self.done_rx.recv_timeout(wait) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                if thread.join().is_err() {
                    warn!("telegram bot thread panicked");
                }
            },
            Err(RecvTimeoutError::Timeout) => {
                warn!(?wait, "telegram bot thread did not stop in time; detaching");
            },
        }
    }
}

impl Drop for BotRuntime {
    fn drop(&mut self) {
        self.stop();
    }
}
