use std::time::Duration;

use {
    deskgram_host::{AgentType, MainThreadHandle},
    serde_json::Value,
    teloxide::types::Message,
    tracing::{debug, info, warn},
};

use crate::{
    Result,
    access::LOCKED_MESSAGE,
    commands::{Command, HELP_TEXT},
    relay,
    state::BotContext,
};

/// How long `/plugin` waits to read back the plugin state.
const PLUGIN_STATE_WAIT: Duration = Duration::from_secs(5);

const PLUGIN_USAGE: &str = "Usage: /plugin <enable|disable> <plugin_id>";

/// Handle a single inbound Telegram message (called from the polling loop).
pub async fn handle_message_direct(msg: Message, ctx: &BotContext) -> Result<()> {
    let chat_id = msg.chat.id;
    let Some(text) = msg.text() else {
        debug!(chat_id = chat_id.0, "ignoring non-text message");
        return Ok(());
    };
    let Some(user) = msg.from.as_ref() else {
        debug!(chat_id = chat_id.0, "ignoring message without sender");
        return Ok(());
    };
    let user_id = user.id.0;

    let command = Command::parse(text, ctx.bot_username.as_deref());
    if let Command::Unknown(name) = &command {
        debug!(chat_id = chat_id.0, user_id, command = %name, "ignoring unknown command");
        return Ok(());
    }

    if let Err(reason) = ctx.allowlist.check(user_id) {
        warn!(chat_id = chat_id.0, user_id, %reason, "telegram access denied");
        ctx.outbound.send_plain(chat_id, LOCKED_MESSAGE).await?;
        return Ok(());
    }

    info!(
        chat_id = chat_id.0,
        user_id,
        command = command.name(),
        "telegram inbound message"
    );

    let reply = match command {
        Command::Text(text) => return relay::relay_reply(ctx, chat_id, &text).await,
        command => run_command(&ctx.host, command).await.unwrap_or_else(|e| {
            warn!(chat_id = chat_id.0, user_id, error = %e, "command failed");
            format!("⚠️ Error: {e}")
        }),
    };
    ctx.outbound.send_text(chat_id, &reply).await
}

/// Execute a slash command against the host and build the reply text.
async fn run_command(host: &MainThreadHandle, command: Command) -> Result<String> {
    match command {
        Command::New => {
            host.call(|h| h.new_context()).await??;
            Ok("New context created.".into())
        },
        Command::Mode(args) => switch_mode(host, args.into_iter().next()).await,
        Command::Model(args) => switch_model(host, args.into_iter().next()).await,
        Command::Plugin(args) => toggle_plugin(host, &args).await,
        Command::Agent(args) => switch_agent(host, args.into_iter().next()).await,
        Command::Help => Ok(HELP_TEXT.into()),
        Command::Unknown(_) | Command::Text(_) => Ok(String::new()),
    }
}

async fn switch_mode(host: &MainThreadHandle, target: Option<String>) -> Result<String> {
    let modes = host.call(|h| h.modes()).await?;
    let Some(target) = target else {
        return Ok(format!(
            "Usage: /mode <name>\nAvailable modes: {}",
            modes.join(", ")
        ));
    };
    if !modes.contains(&target) {
        return Ok(format!(
            "⚠️ Unknown mode: {target}\nAvailable modes: {}",
            modes.join(", ")
        ));
    }

    let mode = target.clone();
    host.call(move |h| h.select_mode(&mode)).await??;
    Ok(format!("Mode switched to {target}"))
}

async fn switch_model(host: &MainThreadHandle, target: Option<String>) -> Result<String> {
    let models = host
        .call(|h| {
            let mode = h.current_mode();
            h.models_for_mode(&mode)
        })
        .await?;
    let Some(target) = target else {
        return Ok(format!(
            "Usage: /model <name>\nAvailable models: {}",
            models.join(", ")
        ));
    };
    if !models.contains(&target) {
        return Ok(format!(
            "⚠️ Unknown model: {target}\nAvailable models: {}",
            models.join(", ")
        ));
    }

    let model = target.clone();
    host.call(move |h| h.select_model(&model)).await??;
    Ok(format!("Model switched to {target}"))
}

async fn toggle_plugin(host: &MainThreadHandle, args: &[String]) -> Result<String> {
    let plugins = host.call(|h| h.plugin_ids()).await?;
    let [action, plugin_id, ..] = args else {
        return Ok(format!(
            "{PLUGIN_USAGE}\nAvailable plugins: {}",
            plugins.join(", ")
        ));
    };

    let id = plugin_id.clone();
    if !host.call(move |h| h.is_plugin_registered(&id)).await? {
        return Ok(format!(
            "⚠️ Unknown plugin: {plugin_id}\nAvailable plugins: {}",
            plugins.join(", ")
        ));
    }

    let id = plugin_id.clone();
    match action.to_ascii_lowercase().as_str() {
        "enable" => host.call(move |h| h.enable_plugin(&id)).await??,
        "disable" => host.call(move |h| h.disable_plugin(&id)).await??,
        _ => return Ok(PLUGIN_USAGE.into()),
    }

    // Toggling may be applied asynchronously by the host; read the state
    // back instead of trusting the request.
    let id = plugin_id.clone();
    let enabled = host
        .call_with_timeout(PLUGIN_STATE_WAIT, move |h| h.is_plugin_enabled(&id))
        .await
        .unwrap_or_else(|e| {
            warn!(plugin_id = %plugin_id, error = %e, "could not read plugin state");
            false
        });
    let state = if enabled {
        "enabled"
    } else {
        "disabled"
    };
    Ok(format!("Plugin {plugin_id} {state}."))
}

async fn switch_agent(host: &MainThreadHandle, target: Option<String>) -> Result<String> {
    let mode = host.call(|h| h.current_mode()).await?;
    let Some(agent_type) = AgentType::for_mode(&mode) else {
        return Ok("⚠️ Agent provider can be changed only in agent modes.".into());
    };

    let choices = host.call(move |h| h.agent_choices(agent_type)).await?;
    let Some(target) = target else {
        return Ok(format!(
            "Usage: /agent <id>\nAvailable agents: {}",
            choices.join(", ")
        ));
    };

    let id = target.clone();
    if !host.call(move |h| h.has_agent(&id)).await? {
        return Ok(format!(
            "⚠️ Unknown agent: {target}\nAvailable agents: {}",
            choices.join(", ")
        ));
    }

    let value = Value::String(target.clone());
    host.call(move |h| h.set_config(agent_type.provider_key(), value))
        .await??;
    Ok(format!("Agent provider switched to {target}"))
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::{
            access::Allowlist,
            outbound::TelegramOutbound,
            poller::PollerSettings,
            test_support::{
                MockTelegramApi, RecordingOutbound, Sent, context_with_host, text_message,
            },
        },
        deskgram_host::{HostApp, HostEvent, LocalHost},
        rstest::rstest,
        serde_json::json,
    };

    fn settings() -> PollerSettings {
        PollerSettings {
            timeout: Duration::from_millis(800),
            idle_window: Duration::from_millis(40),
            interval: Duration::from_millis(10),
            max_idle_ticks: 3,
        }
    }

    async fn reply_to(host: &LocalHost, text: &str) -> Vec<Sent> {
        let outbound = RecordingOutbound::default();
        let (ctx, _thread) = context_with_host(host.clone(), outbound.clone(), settings());
        handle_message_direct(text_message(1001, text), &ctx)
            .await
            .unwrap();
        outbound.sent()
    }

    fn text(s: &str) -> Vec<Sent> {
        vec![Sent::Text(s.to_string())]
    }

    #[tokio::test]
    async fn new_creates_context() {
        let host = LocalHost::default();
        assert_eq!(reply_to(&host, "/new").await, text("New context created."));
        assert_eq!(host.contexts(), 2);
    }

    #[tokio::test]
    async fn help_lists_commands() {
        assert_eq!(reply_to(&LocalHost::default(), "/help").await, text(HELP_TEXT));
    }

    #[rstest]
    #[case("/mode", "Usage: /mode <name>\nAvailable modes: chat, agent_llama, agent_openai")]
    #[case(
        "/mode nope",
        "⚠️ Unknown mode: nope\nAvailable modes: chat, agent_llama, agent_openai"
    )]
    #[case("/mode agent_llama", "Mode switched to agent_llama")]
    #[case("/model", "Usage: /model <name>\nAvailable models: echo-small, echo-large")]
    #[case(
        "/model gpt",
        "⚠️ Unknown model: gpt\nAvailable models: echo-small, echo-large"
    )]
    #[case("/model echo-large", "Model switched to echo-large")]
    #[case("/agent react", "⚠️ Agent provider can be changed only in agent modes.")]
    #[tokio::test]
    async fn command_replies(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(reply_to(&LocalHost::default(), input).await, text(expected));
    }

    #[tokio::test]
    async fn mode_and_model_reach_the_host() {
        let host = LocalHost::default();
        reply_to(&host, "/mode chat").await;
        reply_to(&host, "/model echo-small").await;
        assert_eq!(host.current_model().as_deref(), Some("echo-small"));
    }

    #[tokio::test]
    async fn agent_switch_sets_provider_key() {
        let host = LocalHost::default();
        reply_to(&host, "/mode agent_llama").await;

        assert_eq!(
            reply_to(&host, "/agent").await,
            text("Usage: /agent <id>\nAvailable agents: react, planner")
        );
        assert_eq!(
            reply_to(&host, "/agent ghost").await,
            text("⚠️ Unknown agent: ghost\nAvailable agents: react, planner")
        );
        assert_eq!(
            reply_to(&host, "/agent planner").await,
            text("Agent provider switched to planner")
        );
        assert_eq!(
            host.config_value("agent.llama.provider"),
            Some(json!("planner"))
        );
    }

    #[tokio::test]
    async fn plugin_toggle_reports_host_state() {
        let host = LocalHost::default();
        host.register_plugin("cmd_web", false);

        assert_eq!(
            reply_to(&host, "/plugin enable").await,
            text("Usage: /plugin <enable|disable> <plugin_id>\nAvailable plugins: cmd_web")
        );
        assert_eq!(
            reply_to(&host, "/plugin enable ghost").await,
            text("⚠️ Unknown plugin: ghost\nAvailable plugins: cmd_web")
        );
        assert_eq!(
            reply_to(&host, "/plugin toggle cmd_web").await,
            text("Usage: /plugin <enable|disable> <plugin_id>")
        );
        assert_eq!(
            reply_to(&host, "/plugin ENABLE cmd_web").await,
            text("Plugin cmd_web enabled.")
        );
        assert!(host.is_plugin_enabled("cmd_web"));
        assert_eq!(
            reply_to(&host, "/plugin disable cmd_web").await,
            text("Plugin cmd_web disabled.")
        );
        assert_eq!(host.take_pending_events(), vec![
            HostEvent::Enable {
                plugin_id: "cmd_web".into()
            },
            HostEvent::Disable {
                plugin_id: "cmd_web".into()
            },
        ]);
    }

    #[tokio::test]
    async fn host_failure_becomes_error_reply() {
        let outbound = RecordingOutbound::default();
        let (handle, queue) = deskgram_host::main_thread::channel();
        drop(queue);
        let ctx = crate::test_support::context(handle, outbound.clone(), settings());

        handle_message_direct(text_message(1001, "/new"), &ctx)
            .await
            .unwrap();
        assert_eq!(outbound.sent(), text("⚠️ Error: main thread is gone"));
    }

    #[tokio::test]
    async fn unknown_commands_are_ignored() {
        assert!(reply_to(&LocalHost::default(), "/start").await.is_empty());
    }

    #[tokio::test]
    async fn plain_text_is_relayed() {
        let sent = reply_to(&LocalHost::default(), "ping").await;
        assert_eq!(sent, vec![Sent::Typing, Sent::Text("ping".into())]);
    }

    #[tokio::test]
    async fn locked_bot_rejects_strangers_without_touching_host() {
        let host = LocalHost::default();
        let outbound = RecordingOutbound::default();
        let (mut ctx, _thread) = context_with_host(host.clone(), outbound.clone(), settings());
        ctx.allowlist = Allowlist::parse("7, 8");

        handle_message_direct(text_message(1001, "/new"), &ctx)
            .await
            .unwrap();
        handle_message_direct(text_message(1001, "hello"), &ctx)
            .await
            .unwrap();

        assert_eq!(outbound.sent(), vec![
            Sent::Plain(LOCKED_MESSAGE.into()),
            Sent::Plain(LOCKED_MESSAGE.into()),
        ]);
        assert_eq!(host.contexts(), 1);
        assert!(host.turns().is_empty());
    }

    #[tokio::test]
    async fn replies_go_out_as_markdown_and_lock_as_plain() {
        let api = MockTelegramApi::start().await;
        let host = LocalHost::default();
        let outbound = TelegramOutbound::new(api.bot());
        let (mut ctx, _thread) = context_with_host(host, outbound, settings());

        handle_message_direct(text_message(1001, "/new"), &ctx)
            .await
            .unwrap();
        ctx.allowlist = Allowlist::parse("7");
        handle_message_direct(text_message(1001, "/new"), &ctx)
            .await
            .unwrap();

        let sends: Vec<_> = api
            .requests()
            .iter()
            .filter_map(crate::test_support::CapturedTelegramRequest::as_send_message)
            .collect();
        assert_eq!(sends.len(), 2);
        assert_eq!(sends[0].chat_id, 42);
        assert_eq!(sends[0].text, r"New context created\.");
        assert_eq!(sends[0].parse_mode.as_deref(), Some("MarkdownV2"));
        assert_eq!(sends[1].text, LOCKED_MESSAGE);
        assert!(sends[1].parse_mode.is_none());
        api.shutdown().await;
    }
}
