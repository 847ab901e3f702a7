use std::{future::Future, path::Path, time::Duration};

use {
    async_trait::async_trait,
    teloxide::{
        RequestError,
        payloads::SendMessageSetters,
        prelude::*,
        types::{ChatAction, ChatId, InputFile, LinkPreviewOptions, ParseMode},
    },
    tracing::{debug, info, warn},
};

use crate::{
    Result,
    markdown::{self, TELEGRAM_MAX_MESSAGE_LEN},
};

const TELEGRAM_RETRY_AFTER_MAX_RETRIES: usize = 4;

/// How long a photo upload may take before it is assumed delivered.
const PHOTO_SEND_TIMEOUT: Duration = Duration::from_secs(30);

/// Outcome of a photo upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhotoDelivery {
    Sent,
    /// The upload timed out on our side; Telegram usually still delivers it.
    AssumedSent,
}

/// Everything the command handlers and the reply relay send to a chat.
#[async_trait]
pub trait ChatOutbound: Send + Sync {
    /// Send `text` as MarkdownV2 with link previews off, escaping it and
    /// splitting oversized replies.
    async fn send_text(&self, chat_id: ChatId, text: &str) -> Result<()>;

    /// Send `text` without any parse mode.
    async fn send_plain(&self, chat_id: ChatId, text: &str) -> Result<()>;

    async fn send_typing(&self, chat_id: ChatId) -> Result<()>;

    /// Upload a local image file.
    async fn send_photo(&self, chat_id: ChatId, path: &Path) -> Result<PhotoDelivery>;
}

/// Outbound message sender for Telegram.
#[derive(Clone)]
pub struct TelegramOutbound {
    bot: Bot,
}

impl TelegramOutbound {
    #[must_use]
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }

    async fn send_chunk_with_fallback(&self, chat_id: ChatId, raw: &str) -> Result<()> {
        let escaped = markdown::escape_markdown_v2(raw);
        match run_telegram_request_with_retry(chat_id, "send message (markdown)", || {
            let req = self
                .bot
                .send_message(chat_id, escaped.as_str())
                .parse_mode(ParseMode::MarkdownV2)
                .link_preview_options(no_link_preview());
            async move { req.await }
        })
        .await
        {
            Ok(_) => Ok(()),
            Err(e) => {
                warn!(
                    chat_id = chat_id.0,
                    error = %e,
                    "telegram MarkdownV2 send failed, retrying as plain text"
                );
                run_telegram_request_with_retry(chat_id, "send message (plain)", || {
                    let req = self
                        .bot
                        .send_message(chat_id, raw)
                        .link_preview_options(no_link_preview());
                    async move { req.await }
                })
                .await?;
                Ok(())
            },
        }
    }
}

#[async_trait]
impl ChatOutbound for TelegramOutbound {
    async fn send_text(&self, chat_id: ChatId, text: &str) -> Result<()> {
        let pieces = markdown::split_for_escaping(text, TELEGRAM_MAX_MESSAGE_LEN);
        debug!(
            chat_id = chat_id.0,
            chunks = pieces.len(),
            "telegram outbound text send"
        );
        for piece in pieces {
            self.send_chunk_with_fallback(chat_id, piece).await?;
        }
        Ok(())
    }

    async fn send_plain(&self, chat_id: ChatId, text: &str) -> Result<()> {
        for chunk in markdown::chunk_message(text, TELEGRAM_MAX_MESSAGE_LEN) {
            run_telegram_request_with_retry(chat_id, "send message (plain)", || {
                let req = self.bot.send_message(chat_id, chunk.as_str());
                async move { req.await }
            })
            .await?;
        }
        Ok(())
    }

    async fn send_typing(&self, chat_id: ChatId) -> Result<()> {
        self.bot.send_chat_action(chat_id, ChatAction::Typing).await?;
        Ok(())
    }

    async fn send_photo(&self, chat_id: ChatId, path: &Path) -> Result<PhotoDelivery> {
        if !tokio::fs::try_exists(path).await? {
            return Err(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("missing image: {}", path.display()),
            )
            .into());
        }

        let upload = run_telegram_request_with_retry(chat_id, "send photo", || {
            let req = self
                .bot
                .send_photo(chat_id, InputFile::file(path.to_path_buf()));
            async move { req.await }
        });

        match tokio::time::timeout(PHOTO_SEND_TIMEOUT, upload).await {
            Ok(Ok(_)) => {
                info!(chat_id = chat_id.0, path = %path.display(), "telegram photo sent");
                Ok(PhotoDelivery::Sent)
            },
            Ok(Err(e)) if is_timeout_error(&e) => {
                warn!(
                    chat_id = chat_id.0,
                    path = %path.display(),
                    "timed out while sending image; treating as sent"
                );
                Ok(PhotoDelivery::AssumedSent)
            },
            Ok(Err(e)) => Err(e.into()),
            Err(_) => {
                warn!(
                    chat_id = chat_id.0,
                    path = %path.display(),
                    timeout = ?PHOTO_SEND_TIMEOUT,
                    "image upload exceeded timeout; treating as sent"
                );
                Ok(PhotoDelivery::AssumedSent)
            },
        }
    }
}

fn no_link_preview() -> LinkPreviewOptions {
    LinkPreviewOptions {
        is_disabled: true,
        url: None,
        prefer_small_media: false,
        prefer_large_media: false,
        show_above_text: false,
    }
}

async fn run_telegram_request_with_retry<T, F, Fut>(
    chat_id: ChatId,
    operation: &'static str,
    mut request: F,
) -> std::result::Result<T, RequestError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = std::result::Result<T, RequestError>>,
{
    let mut retries = 0usize;

    loop {
        match request().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                let Some(wait) = retry_after_duration(&err) else {
                    return Err(err);
                };

                if retries >= TELEGRAM_RETRY_AFTER_MAX_RETRIES {
                    warn!(
                        chat_id = chat_id.0,
                        operation,
                        retries,
                        max_retries = TELEGRAM_RETRY_AFTER_MAX_RETRIES,
                        retry_after_secs = wait.as_secs(),
                        "telegram rate limit persisted after retries"
                    );
                    return Err(err);
                }

                retries += 1;
                warn!(
                    chat_id = chat_id.0,
                    operation,
                    retries,
                    max_retries = TELEGRAM_RETRY_AFTER_MAX_RETRIES,
                    retry_after_secs = wait.as_secs(),
                    "telegram rate limited, waiting before retry"
                );
                tokio::time::sleep(wait).await;
            },
        }
    }
}

fn retry_after_duration(error: &RequestError) -> Option<Duration> {
    match error {
        RequestError::RetryAfter(wait) => Some(wait.duration()),
        _ => None,
    }
}

fn is_timeout_error(error: &RequestError) -> bool {
    matches!(error, RequestError::Network(e) if e.is_timeout())
}
