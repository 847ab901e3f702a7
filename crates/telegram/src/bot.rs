use std::{sync::Arc, time::Duration};

use {
    deskgram_config::GatewayConfig,
    deskgram_host::MainThreadHandle,
    teloxide::{
        ApiError, RequestError,
        prelude::*,
        types::{AllowedUpdate, UpdateKind},
    },
    tokio_util::sync::CancellationToken,
    tracing::{debug, error, info, warn},
};

use crate::{
    Error, Result, commands, config, handlers, outbound::TelegramOutbound, poller::PollerSettings,
    state::BotContext,
};

/// Long-poll duration requested from `getUpdates`, in seconds.
const LONG_POLL_SECS: u32 = 30;

/// Must stay above the long poll so the client doesn't abort the request
/// before Telegram responds.
const HTTP_TIMEOUT: Duration = Duration::from_secs(45);

const POLL_ERROR_BACKOFF: Duration = Duration::from_secs(5);

/// Build a bot client for `token`, optionally against a custom API server.
pub fn build_bot(token: &str, api_url: Option<&reqwest::Url>) -> Result<Bot> {
    let client = teloxide::net::default_reqwest_settings()
        .timeout(HTTP_TIMEOUT)
        .build()
        .map_err(|e| Error::external("build telegram http client", e))?;
    let bot = Bot::with_client(token, client);
    Ok(match api_url {
        Some(url) => bot.set_api_url(url.clone()),
        None => bot,
    })
}

/// Verify credentials, clear any webhook and register the command list.
/// Returns the bot's username.
pub async fn connect(bot: &Bot) -> Result<Option<String>> {
    let me = bot.get_me().await?;
    let bot_username = me.username.clone();

    // Long polling does not work while a webhook is set.
    bot.delete_webhook().send().await?;

    if let Err(e) = bot.set_my_commands(commands::bot_commands()).await {
        warn!("failed to register bot commands: {e}");
    }

    info!(username = ?bot_username, "telegram bot connected (webhook cleared)");
    Ok(bot_username)
}

pub async fn run_with_bot(
    bot: Bot,
    config: GatewayConfig,
    host: MainThreadHandle,
    cancel: CancellationToken,
) -> Result<()> {
    let bot_username = connect(&bot).await?;

    let ctx = BotContext {
        bot_username,
        outbound: Arc::new(TelegramOutbound::new(bot.clone())),
        host: host.with_timeout(config.main_thread_timeout()),
        allowlist: config::allowlist(&config),
        poller: PollerSettings::from_config(&config),
        cancel,
    };
    info!(
        allowlist = ctx.allowlist.len(),
        timeout = ?ctx.poller.timeout,
        "telegram gateway ready"
    );

    poll_updates(&bot, &ctx).await;
    Ok(())
}

/// Manual `getUpdates` loop. Messages are handled one at a time; a pending
/// cancellation interrupts both the long poll and the current handler.
pub async fn poll_updates(bot: &Bot, ctx: &BotContext) {
    info!("starting telegram manual polling loop");
    let mut offset: i32 = 0;

    loop {
        let result = tokio::select! {
            () = ctx.cancel.cancelled() => break,
            result = bot
                .get_updates()
                .offset(offset)
                .timeout(LONG_POLL_SECS)
                .allowed_updates(vec![AllowedUpdate::Message])
                .send() => result,
        };

        match result {
            Ok(updates) => {
                debug!(count = updates.len(), "got telegram updates");
                for update in updates {
                    offset = update.id.as_offset();
                    let UpdateKind::Message(msg) = update.kind else {
                        debug!("ignoring non-message update");
                        continue;
                    };
                    let chat_id = msg.chat.id.0;
                    debug!(chat_id, "received telegram message");

                    tokio::select! {
                        () = ctx.cancel.cancelled() => {
                            info!(chat_id, "stop requested while handling message");
                            break;
                        },
                        handled = handlers::handle_message_direct(msg, ctx) => {
                            if let Err(e) = handled {
                                error!(chat_id, error = %e, "error handling telegram message");
                            }
                        },
                    }
                }
            },
            Err(RequestError::Api(ApiError::TerminatedByOtherGetUpdates)) => {
                warn!("telegram bot stopped: another instance is already running with this token");
                ctx.cancel.cancel();
                break;
            },
            Err(e) => {
                warn!(error = %e, "telegram getUpdates failed");
                tokio::select! {
                    () = ctx.cancel.cancelled() => break,
                    () = tokio::time::sleep(POLL_ERROR_BACKOFF) => {},
                }
            },
        }
    }

    info!("telegram polling stopped");
}
