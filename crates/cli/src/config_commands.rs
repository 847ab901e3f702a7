use std::path::Path;

use {
    anyhow::Result,
    clap::Subcommand,
    deskgram_config::{DeskgramConfig, validate::{self, Severity}},
    serde_json::Value,
};

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Validate the configuration file and report errors/warnings.
    Check {
        /// Show informational diagnostics in addition to errors and warnings.
        #[arg(long)]
        verbose: bool,
    },
    /// Print the effective configuration with the bot token redacted.
    Show,
}

pub fn handle_config(action: ConfigAction, config_path: Option<&Path>) -> Result<()> {
    match action {
        ConfigAction::Check { verbose } => check(config_path, verbose),
        ConfigAction::Show => show(config_path),
    }
}

/// ANSI color codes.
const RED: &str = "\x1b[31m";
const YELLOW: &str = "\x1b[33m";
const CYAN: &str = "\x1b[36m";
const BOLD: &str = "\x1b[1m";
const RESET: &str = "\x1b[0m";

fn check(config_path: Option<&Path>, verbose: bool) -> Result<()> {
    let result = validate::validate(config_path);

    if let Some(ref path) = result.config_path {
        eprintln!("Checking {}\n", path.display());
    } else {
        eprintln!("No config file found; checking defaults.\n");
    }

    let mut shown = 0;
    for d in &result.diagnostics {
        if d.severity == Severity::Info && !verbose {
            continue;
        }

        let (color, label) = match d.severity {
            Severity::Error => (RED, "error"),
            Severity::Warning => (YELLOW, "warning"),
            Severity::Info => (CYAN, "info"),
        };

        if d.path.is_empty() {
            eprintln!("  {BOLD}{color}{label}{RESET} {}", d.message);
        } else {
            eprintln!("  {BOLD}{color}{label}{RESET} {}: {}", d.path, d.message);
        }
        shown += 1;
    }

    let errors = result.count(Severity::Error);
    let warnings = result.count(Severity::Warning);

    if shown > 0 {
        eprintln!();
    }

    if errors == 0 && warnings == 0 {
        eprintln!("No issues found.");
    } else {
        eprintln!("{errors} error(s), {warnings} warning(s)");
    }

    if errors > 0 {
        std::process::exit(1);
    }

    Ok(())
}

fn show(config_path: Option<&Path>) -> Result<()> {
    let config = crate::load(config_path)?;
    println!("{}", serde_json::to_string_pretty(&redacted(&config)?)?);
    Ok(())
}

/// Config as JSON with a non-empty bot token replaced.
fn redacted(config: &DeskgramConfig) -> Result<Value> {
    let mut value = serde_json::to_value(config)?;
    if config.gateway.has_token()
        && let Some(token) = value.pointer_mut("/gateway/bot_token")
    {
        *token = Value::String("[REDACTED]".into());
    }
    Ok(value)
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, secrecy::Secret};

    #[test]
    fn token_is_redacted() {
        let mut config = DeskgramConfig::default();
        config.gateway.bot_token = Secret::new("123:secret".into());
        config.gateway.allowed_user_ids = "1,2".into();

        let value = redacted(&config).unwrap();
        assert_eq!(value["gateway"]["bot_token"], "[REDACTED]");
        assert_eq!(value["gateway"]["allowed_user_ids"], "1,2");
        assert!(!value.to_string().contains("123:secret"));
    }

    #[test]
    fn empty_token_stays_visible_as_empty() {
        let value = redacted(&DeskgramConfig::default()).unwrap();
        assert_eq!(value["gateway"]["bot_token"], "");
    }
}
