//! Incremental reply collection from the host's conversation state.
//!
//! The host exposes no completion callback, so after text is submitted the
//! poller samples the globally last turn on a fixed interval and yields
//! whatever output, results and images appeared since the previous sample.
//! Because it follows the global last turn, replies to a concurrent
//! conversation can be picked up as well.

use std::{collections::HashSet, time::Duration};

use {
    async_trait::async_trait,
    deskgram_config::GatewayConfig,
    deskgram_host::{KernelState, MainThreadHandle, Turn},
    futures::Stream,
    tokio::time::Instant,
    tracing::{debug, info, warn},
};

use crate::{Error, Result};

/// Read access to the host's conversation state.
#[async_trait]
pub trait TurnSource: Send + Sync {
    async fn last_turn(&self) -> deskgram_host::Result<Option<Turn>>;
    async fn kernel_state(&self) -> deskgram_host::Result<KernelState>;
}

#[async_trait]
impl TurnSource for MainThreadHandle {
    async fn last_turn(&self) -> deskgram_host::Result<Option<Turn>> {
        self.call(|host| host.last_turn()).await
    }

    async fn kernel_state(&self) -> deskgram_host::Result<KernelState> {
        self.call(|host| host.kernel_state()).await
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PollerSettings {
    /// Overall bound on one exchange.
    pub timeout: Duration,
    /// Quiet time after the last delta before an idle kernel counts as done.
    pub idle_window: Duration,
    pub interval: Duration,
    /// Consecutive unchanged samples that end the exchange.
    pub max_idle_ticks: u32,
}

impl Default for PollerSettings {
    fn default() -> Self {
        Self::from_config(&GatewayConfig::default())
    }
}

impl PollerSettings {
    /// Settings with the configured minimums enforced.
    #[must_use]
    pub fn from_config(config: &GatewayConfig) -> Self {
        Self {
            timeout: config.effective_response_timeout(),
            idle_window: config.effective_idle_window(),
            interval: Duration::from_millis(250),
            max_idle_ticks: 8,
        }
    }
}

/// New content observed in one sample.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReplyDelta {
    pub texts: Vec<String>,
    pub images: Vec<String>,
}

impl ReplyDelta {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.texts.is_empty() && self.images.is_empty()
    }
}

/// What has already been delivered from the tracked turn.
#[derive(Debug, Default)]
struct Tracker {
    turn_id: Option<u64>,
    seen_outputs: HashSet<String>,
    results_seen: usize,
    images_seen: usize,
}

struct Observation {
    delta: ReplyDelta,
    changed: bool,
}

impl Tracker {
    /// Treat everything in `turn` as already delivered.
    fn baseline(turn: Option<&Turn>) -> Self {
        let Some(turn) = turn else {
            return Self::default();
        };
        let mut seen_outputs = HashSet::new();
        if let Some(output) = turn.output.as_deref().map(str::trim)
            && !output.is_empty()
        {
            seen_outputs.insert(output.to_string());
        }
        Self {
            turn_id: Some(turn.id),
            seen_outputs,
            results_seen: turn.results.len(),
            images_seen: turn.images.len(),
        }
    }

    fn should_switch(&self, turn: &Turn) -> bool {
        match self.turn_id {
            None => true,
            Some(id) if id == turn.id => false,
            Some(id) => turn.is_sub_reply() || turn.is_agent_output() || turn.id > id,
        }
    }

    fn observe(&mut self, turn: &Turn) -> Observation {
        if self.should_switch(turn) {
            debug!(from = ?self.turn_id, to = turn.id, "tracking new turn");
            *self = Self {
                turn_id: Some(turn.id),
                ..Self::default()
            };
        } else if self.turn_id != Some(turn.id) {
            // An older turn resurfaced; nothing to report from it.
            return Observation {
                delta: ReplyDelta::default(),
                changed: false,
            };
        }

        let mut delta = ReplyDelta::default();
        let mut changed = false;

        if let Some(output) = turn.output.as_deref().map(str::trim)
            && !output.is_empty()
            && self.seen_outputs.insert(output.to_string())
        {
            delta.texts.push(output.to_string());
            changed = true;
        }

        if turn.results.len() > self.results_seen {
            delta
                .texts
                .extend(turn.results[self.results_seen..].iter().map(Turn::result_text));
            self.results_seen = turn.results.len();
            changed = true;
        }

        if turn.images.len() > self.images_seen {
            delta
                .images
                .extend_from_slice(&turn.images[self.images_seen..]);
            self.images_seen = turn.images.len();
            changed = true;
        }

        Observation { delta, changed }
    }
}

/// Samples a [`TurnSource`] until the reply looks complete.
pub struct ReplyPoller<S> {
    source: S,
    settings: PollerSettings,
}

impl<S: TurnSource> ReplyPoller<S> {
    pub fn new(source: S, settings: PollerSettings) -> Self {
        Self { source, settings }
    }

    /// Stream reply deltas, treating `baseline` (the last turn observed
    /// before the text was submitted) as already delivered.
    ///
    /// Ends once a delta was seen and the agent finished, the turn was
    /// stopped, the kernel went idle for the idle window, or nothing changed
    /// for `max_idle_ticks` samples. Yields [`Error::Timeout`] if nothing at
    /// all arrived before the deadline.
    pub fn into_stream(self, baseline: Option<Turn>) -> impl Stream<Item = Result<ReplyDelta>> {
        let Self { source, settings } = self;
        async_stream::try_stream! {
            let start = Instant::now();
            let deadline = start + settings.timeout;
            let mut tracker = Tracker::baseline(baseline.as_ref());
            let mut got_any = false;
            let mut last_seen = start;
            let mut idle_ticks = 0u32;

            while Instant::now() < deadline {
                let turn = match source.last_turn().await {
                    Ok(Some(turn)) => turn,
                    Ok(None) => {
                        tokio::time::sleep(settings.interval).await;
                        continue;
                    },
                    Err(e) => {
                        warn!(error = %e, "reply poll failed, retrying");
                        tokio::time::sleep(settings.interval).await;
                        continue;
                    },
                };

                let Observation { delta, changed } = tracker.observe(&turn);
                if !delta.is_empty() {
                    debug!(
                        turn_id = turn.id,
                        texts = delta.texts.len(),
                        images = delta.images.len(),
                        "reply delta"
                    );
                    got_any = true;
                    last_seen = Instant::now();
                    idle_ticks = 0;
                    yield delta;
                } else if changed {
                    last_seen = Instant::now();
                    idle_ticks = 0;
                } else {
                    idle_ticks += 1;
                }

                if got_any {
                    if turn.agent_finished() {
                        info!(turn_id = turn.id, "agent signalled finish");
                        break;
                    }
                    if turn.stopped {
                        info!(turn_id = turn.id, "turn stopped");
                        break;
                    }
                    let kernel_idle = source
                        .kernel_state()
                        .await
                        .is_ok_and(|state| !state.is_busy());
                    if kernel_idle && last_seen.elapsed() > settings.idle_window {
                        debug!("kernel idle and idle window elapsed");
                        break;
                    }
                    if idle_ticks >= settings.max_idle_ticks {
                        debug!(idle_ticks, "no changes, assuming reply complete");
                        break;
                    }
                }

                tokio::time::sleep(settings.interval).await;
            }

            info!(got_any, elapsed = ?start.elapsed(), "reply polling done");
            if !got_any {
                Err(Error::Timeout {
                    elapsed: start.elapsed(),
                })?;
            }
        }
    }
}
