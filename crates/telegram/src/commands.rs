//! Slash command parsing.

use teloxide::types::BotCommand;

pub const HELP_TEXT: &str = "Supported commands:\n\
/new - start new context\n\
/mode <name> - switch mode\n\
/plugin <enable|disable> <plugin_id> - manage plugins\n\
/model <name> - switch model\n\
/agent <id> - switch agent\n\
/help - show this message";

/// An inbound message, classified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    New,
    Mode(Vec<String>),
    Model(Vec<String>),
    Plugin(Vec<String>),
    Agent(Vec<String>),
    Help,
    /// A slash command this bot does not handle, or one addressed to a
    /// different bot. Ignored without reply.
    Unknown(String),
    /// Plain chat text, trimmed.
    Text(String),
}

impl Command {
    /// Classify `text`. `/name@bot` forms are accepted when `bot` matches
    /// `bot_username` (or the username is unknown).
    #[must_use]
    pub fn parse(text: &str, bot_username: Option<&str>) -> Self {
        let text = text.trim();
        let Some(rest) = text.strip_prefix('/') else {
            return Self::Text(text.to_string());
        };

        let mut parts = rest.split_whitespace();
        let head = parts.next().unwrap_or_default();
        let args: Vec<String> = parts.map(str::to_string).collect();

        let (name, mention) = match head.split_once('@') {
            Some((name, mention)) => (name, Some(mention)),
            None => (head, None),
        };
        if let (Some(mention), Some(me)) = (mention, bot_username)
            && !mention.eq_ignore_ascii_case(me)
        {
            return Self::Unknown(head.to_string());
        }

        match name.to_ascii_lowercase().as_str() {
            "new" => Self::New,
            "mode" => Self::Mode(args),
            "model" => Self::Model(args),
            "plugin" => Self::Plugin(args),
            "agent" => Self::Agent(args),
            "help" => Self::Help,
            _ => Self::Unknown(name.to_string()),
        }
    }

    /// Name used in logs.
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::New => "new",
            Self::Mode(_) => "mode",
            Self::Model(_) => "model",
            Self::Plugin(_) => "plugin",
            Self::Agent(_) => "agent",
            Self::Help => "help",
            Self::Unknown(name) => name,
            Self::Text(_) => "text",
        }
    }
}

/// Commands registered with Telegram for client autocomplete.
#[must_use]
pub fn bot_commands() -> Vec<BotCommand> {
    vec![
        BotCommand::new("new", "Start new context"),
        BotCommand::new("mode", "Switch mode"),
        BotCommand::new("model", "Switch model"),
        BotCommand::new("plugin", "Enable or disable a plugin"),
        BotCommand::new("agent", "Switch agent provider"),
        BotCommand::new("help", "Show available commands"),
    ]
}

#[cfg(test)]
mod tests {
    use {super::*, rstest::rstest};

    fn args(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[rstest]
    #[case("/new", Command::New)]
    #[case("/help", Command::Help)]
    #[case("/HELP", Command::Help)]
    #[case("/mode", Command::Mode(vec![]))]
    #[case("/mode chat", Command::Mode(args(&["chat"])))]
    #[case("/model  gpt-4o   extra", Command::Model(args(&["gpt-4o", "extra"])))]
    #[case("/plugin enable cmd_web", Command::Plugin(args(&["enable", "cmd_web"])))]
    #[case("/agent react", Command::Agent(args(&["react"])))]
    #[case("/start", Command::Unknown("start".into()))]
    #[case("  hello there ", Command::Text("hello there".into()))]
    #[case("", Command::Text(String::new()))]
    fn parses(#[case] input: &str, #[case] expected: Command) {
        assert_eq!(Command::parse(input, None), expected);
    }

    #[test]
    fn mention_must_match_this_bot() {
        assert_eq!(
            Command::parse("/mode@DeskBot chat", Some("deskbot")),
            Command::Mode(args(&["chat"]))
        );
        assert!(matches!(
            Command::parse("/mode@other_bot chat", Some("deskbot")),
            Command::Unknown(_)
        ));
        // Without a known username any mention is accepted.
        assert_eq!(Command::parse("/new@whoever", None), Command::New);
    }

    #[test]
    fn help_lists_every_command() {
        for cmd in bot_commands() {
            assert!(
                HELP_TEXT.contains(&format!("/{}", cmd.command)),
                "help text misses /{}",
                cmd.command
            );
        }
    }
}
