use std::{collections::HashSet, path::PathBuf};

use {
    deskgram_host::{HostEvent, MainThreadHandle},
    futures::{Stream, StreamExt},
    teloxide::types::ChatId,
    tracing::{debug, info, warn},
};

use crate::{
    Result,
    outbound::{ChatOutbound, PhotoDelivery},
    poller::{PollerSettings, ReplyDelta, ReplyPoller},
    state::BotContext,
};

pub const NO_RESPONSE: &str = "(no response)";
pub const IMAGE_PLACEHOLDER: &str = "image generated";

/// Submit `text` to the host and stream the reply.
///
/// The baseline turn is captured before submission so output produced
/// synchronously by the host is still reported.
pub async fn ask_host(
    host: MainThreadHandle,
    text: String,
    settings: PollerSettings,
) -> Result<impl Stream<Item = Result<ReplyDelta>>> {
    let baseline = host.call(|h| h.last_turn()).await?;

    let event_text = text.clone();
    if let Err(e) = host.post(move |h| h.dispatch(HostEvent::UserSend { text: event_text })) {
        info!(error = %e, "failed to dispatch user-send event");
    }

    host.call(move |h| h.send_text(&text, true)).await??;

    Ok(ReplyPoller::new(host, settings).into_stream(baseline))
}

/// Answer a plain chat message with the host's reply.
pub async fn relay_reply(ctx: &BotContext, chat_id: ChatId, text: &str) -> Result<()> {
    let text = text.trim();
    if text.is_empty() {
        return Ok(());
    }
    let outbound = ctx.outbound.as_ref();

    if let Err(e) = outbound.send_typing(chat_id).await {
        debug!(chat_id = chat_id.0, error = %e, "typing action failed");
    }

    let mut relay = Relay {
        outbound,
        host: &ctx.host,
        chat_id,
        sent_any: false,
        sent_images: HashSet::new(),
    };

    let outcome = async {
        let stream = ask_host(ctx.host.clone(), text.to_string(), ctx.poller).await?;
        futures::pin_mut!(stream);
        while let Some(delta) = stream.next().await {
            relay.deliver(delta?).await?;
        }
        Ok::<_, crate::Error>(())
    }
    .await;

    if let Err(e) = outcome {
        warn!(chat_id = chat_id.0, error = %e, "asking the host failed");
        outbound
            .send_text(chat_id, &format!("⚠️ Error while asking the host: {e}"))
            .await?;
        return Ok(());
    }

    if !relay.sent_any {
        outbound.send_text(chat_id, NO_RESPONSE).await?;
    }
    Ok(())
}

struct Relay<'a> {
    outbound: &'a dyn ChatOutbound,
    host: &'a MainThreadHandle,
    chat_id: ChatId,
    sent_any: bool,
    /// Resolved paths already sent during this exchange.
    sent_images: HashSet<PathBuf>,
}

impl Relay<'_> {
    async fn deliver(&mut self, delta: ReplyDelta) -> Result<()> {
        let chat_id = self.chat_id;
        info!(
            chat_id = chat_id.0,
            texts = delta.texts.len(),
            images = delta.images.len(),
            "relaying reply"
        );

        if delta.texts.is_empty() && !delta.images.is_empty() && !self.sent_any {
            self.outbound.send_text(chat_id, IMAGE_PLACEHOLDER).await?;
        }

        for text in &delta.texts {
            let cleaned = text.trim();
            if cleaned.is_empty() {
                continue;
            }
            self.sent_any = true;
            self.outbound.send_text(chat_id, cleaned).await?;
        }

        if delta.images.is_empty() {
            return Ok(());
        }
        let images = delta.images;
        let paths = self
            .host
            .call(move |h| images.iter().map(|i| h.to_workdir(i)).collect::<Vec<_>>())
            .await?;

        for path in paths {
            if !self.sent_images.insert(path.clone()) {
                continue;
            }
            self.sent_any = true;
            match self.outbound.send_photo(chat_id, &path).await {
                Ok(PhotoDelivery::Sent) => {},
                Ok(PhotoDelivery::AssumedSent) => {
                    debug!(chat_id = chat_id.0, path = %path.display(), "photo assumed sent");
                },
                Err(e) => {
                    warn!(
                        chat_id = chat_id.0,
                        path = %path.display(),
                        error = %e,
                        "failed to send image"
                    );
                },
            }
        }
        Ok(())
    }
}
