//! In-process fakes shared by the gateway's tests.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::{
    collections::VecDeque,
    net::SocketAddr,
    path::{Path, PathBuf},
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, Ordering},
    },
    thread::JoinHandle,
    time::Duration,
};

use {
    async_trait::async_trait,
    axum::{Json, Router, body::Bytes, extract::State, http::Uri, routing::post},
    deskgram_host::{LocalHost, MainThreadHandle, main_thread},
    serde::Deserialize,
    serde_json::{Value, json},
    teloxide::types::ChatId,
    tokio::sync::oneshot,
    tokio_util::sync::CancellationToken,
};

use crate::{
    Result,
    access::Allowlist,
    outbound::{ChatOutbound, PhotoDelivery},
    poller::PollerSettings,
    state::BotContext,
};

/// One request received by [`MockTelegramApi`].
#[derive(Debug, Clone)]
pub struct CapturedTelegramRequest {
    method: String,
    /// `Null` for multipart uploads.
    pub body: Value,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SendMessageRequest {
    pub chat_id: i64,
    pub text: String,
    #[serde(default)]
    pub parse_mode: Option<String>,
    #[serde(default)]
    pub link_preview_options: Option<Value>,
}

impl CapturedTelegramRequest {
    pub fn method_name(&self) -> &str {
        &self.method
    }

    pub fn as_send_message(&self) -> Option<SendMessageRequest> {
        if self.method != "SendMessage" {
            return None;
        }
        serde_json::from_value(self.body.clone()).ok()
    }
}

#[derive(Clone, Default)]
struct MockState {
    requests: Arc<Mutex<Vec<CapturedTelegramRequest>>>,
    updates: Arc<Mutex<VecDeque<Value>>>,
    conflict: Arc<AtomicBool>,
}

/// Minimal Bot API server. Every method succeeds; `GetUpdates` drains the
/// queued updates.
pub struct MockTelegramApi {
    state: MockState,
    addr: SocketAddr,
    shutdown_tx: oneshot::Sender<()>,
    server: tokio::task::JoinHandle<()>,
}

impl MockTelegramApi {
    pub async fn start() -> Self {
        let state = MockState::default();
        let app = Router::new()
            .route("/{*path}", post(telegram_api_handler))
            .with_state(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind test listener");
        let addr = listener.local_addr().expect("local addr");
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let server = tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await
                .expect("serve mock telegram api");
        });

        Self {
            state,
            addr,
            shutdown_tx,
            server,
        }
    }

    pub fn api_url(&self) -> reqwest::Url {
        reqwest::Url::parse(&format!("http://{}/", self.addr)).expect("parse api url")
    }

    pub fn bot(&self) -> teloxide::Bot {
        teloxide::Bot::new("test-token").set_api_url(self.api_url())
    }

    pub fn requests(&self) -> Vec<CapturedTelegramRequest> {
        self.state.requests.lock().unwrap().clone()
    }

    pub fn sent_texts(&self) -> Vec<String> {
        self.requests()
            .iter()
            .filter_map(CapturedTelegramRequest::as_send_message)
            .map(|m| m.text)
            .collect()
    }

    /// Queue a private-chat text message from `user_id`.
    pub fn push_text(&self, update_id: i64, user_id: u64, text: &str) {
        self.state.updates.lock().unwrap().push_back(json!({
            "update_id": update_id,
            "message": text_message_json(user_id, text),
        }));
    }

    /// Answer the next `GetUpdates` with a 409 conflict.
    pub fn fail_next_poll_with_conflict(&self) {
        self.state.conflict.store(true, Ordering::SeqCst);
    }

    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(());
        self.server.await.expect("server join");
    }
}

async fn telegram_api_handler(
    State(state): State<MockState>,
    uri: Uri,
    body: Bytes,
) -> Json<Value> {
    let method = uri
        .path()
        .rsplit('/')
        .next()
        .unwrap_or_default()
        .to_string();
    let parsed = serde_json::from_slice(&body).unwrap_or(Value::Null);

    if method == "GetUpdates" {
        if state.conflict.swap(false, Ordering::SeqCst) {
            return Json(json!({
                "ok": false,
                "error_code": 409,
                "description": "Conflict: terminated by other getUpdates request; make sure that only one bot instance is running",
            }));
        }
        let batch: Vec<Value> = state.updates.lock().unwrap().drain(..).collect();
        if batch.is_empty() {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        return Json(json!({ "ok": true, "result": batch }));
    }

    state
        .requests
        .lock()
        .unwrap()
        .push(CapturedTelegramRequest {
            method: method.clone(),
            body: parsed,
        });

    let result = match method.as_str() {
        "GetMe" => json!({
            "id": 4242,
            "is_bot": true,
            "first_name": "Desk",
            "username": "desk_bot",
            "can_join_groups": true,
            "can_read_all_group_messages": false,
            "supports_inline_queries": false,
            "can_connect_to_business": false,
        }),
        "SendMessage" | "SendPhoto" => json!({
            "message_id": 1,
            "date": 0,
            "chat": { "id": 42, "type": "private" },
            "text": "ok",
        }),
        _ => json!(true),
    };
    Json(json!({ "ok": true, "result": result }))
}

/// A private-chat text message as the Bot API would deliver it.
pub fn text_message_json(user_id: u64, text: &str) -> Value {
    json!({
        "message_id": 1,
        "date": 1,
        "chat": { "id": 42, "type": "private", "first_name": "Alice" },
        "from": {
            "id": user_id,
            "is_bot": false,
            "first_name": "Alice",
            "username": "alice"
        },
        "text": text,
    })
}

pub fn text_message(user_id: u64, text: &str) -> teloxide::types::Message {
    serde_json::from_value(text_message_json(user_id, text)).expect("deserialize message")
}

/// Something an outbound fake was asked to send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Sent {
    Text(String),
    Plain(String),
    Typing,
    Photo(PathBuf),
}

/// [`ChatOutbound`] that records instead of talking to Telegram.
#[derive(Clone, Default)]
pub struct RecordingOutbound {
    sent: Arc<Mutex<Vec<Sent>>>,
}

impl RecordingOutbound {
    pub fn sent(&self) -> Vec<Sent> {
        self.sent.lock().unwrap().clone()
    }

    /// Bodies of `send_text` calls only.
    pub fn texts(&self) -> Vec<String> {
        self.sent()
            .into_iter()
            .filter_map(|s| match s {
                Sent::Text(t) => Some(t),
                _ => None,
            })
            .collect()
    }

    fn push(&self, item: Sent) {
        self.sent.lock().unwrap().push(item);
    }
}

#[async_trait]
impl ChatOutbound for RecordingOutbound {
    async fn send_text(&self, _chat_id: ChatId, text: &str) -> Result<()> {
        self.push(Sent::Text(text.to_string()));
        Ok(())
    }

    async fn send_plain(&self, _chat_id: ChatId, text: &str) -> Result<()> {
        self.push(Sent::Plain(text.to_string()));
        Ok(())
    }

    async fn send_typing(&self, _chat_id: ChatId) -> Result<()> {
        self.push(Sent::Typing);
        Ok(())
    }

    async fn send_photo(&self, _chat_id: ChatId, path: &Path) -> Result<PhotoDelivery> {
        if !path.exists() {
            return Err(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("missing image: {}", path.display()),
            )
            .into());
        }
        self.push(Sent::Photo(path.to_path_buf()));
        Ok(PhotoDelivery::Sent)
    }
}

pub fn context(
    host: MainThreadHandle,
    outbound: impl ChatOutbound + 'static,
    poller: PollerSettings,
) -> BotContext {
    BotContext {
        bot_username: Some("desk_bot".into()),
        outbound: Arc::new(outbound),
        host,
        allowlist: Allowlist::default(),
        poller,
        cancel: CancellationToken::new(),
    }
}

/// Serve `host` from its own main thread and build a context around it.
/// The thread exits once the context and its clones are dropped.
pub fn context_with_host(
    host: LocalHost,
    outbound: impl ChatOutbound + 'static,
    poller: PollerSettings,
) -> (BotContext, JoinHandle<LocalHost>) {
    let (handle, queue) = main_thread::channel();
    let thread = queue.spawn(host).expect("spawn host main thread");
    (context(handle, outbound, poller), thread)
}
