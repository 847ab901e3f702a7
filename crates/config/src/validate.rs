//! Configuration validation.
//!
//! Checks a config file against the known schema, flags unknown or
//! misspelled keys and reports gateway settings that will be clamped or
//! ignored at runtime.

use std::{collections::HashMap, path::Path};

use secrecy::ExposeSecret;

use crate::{
    env_subst::substitute_env,
    schema::{DeskgramConfig, MIN_IDLE_WINDOW_SECS, MIN_RESPONSE_TIMEOUT_SECS},
};

/// Severity level for a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Error,
    Warning,
    Info,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Error => write!(f, "error"),
            Self::Warning => write!(f, "warning"),
            Self::Info => write!(f, "info"),
        }
    }
}

/// A single validation diagnostic.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub severity: Severity,
    /// Category: "syntax", "unknown-field", "type-error", "gateway", "file-ref"
    pub category: &'static str,
    /// Dotted path, e.g. "gateway.idle_window"
    pub path: String,
    pub message: String,
}

/// Result of validating a configuration file.
#[derive(Debug, Clone)]
pub struct ValidationResult {
    pub diagnostics: Vec<Diagnostic>,
    pub config_path: Option<std::path::PathBuf>,
}

impl ValidationResult {
    /// Returns `true` if any diagnostic is an error.
    #[must_use]
    pub fn has_errors(&self) -> bool {
        self.diagnostics
            .iter()
            .any(|d| d.severity == Severity::Error)
    }

    /// Count diagnostics by severity.
    #[must_use]
    pub fn count(&self, severity: Severity) -> usize {
        self.diagnostics
            .iter()
            .filter(|d| d.severity == severity)
            .count()
    }
}

/// Expected shape of the configuration tree.
enum KnownKeys {
    Struct(HashMap<&'static str, KnownKeys>),
    /// Dynamic keys (e.g. `host.models.<mode>`).
    Map,
    Leaf,
}

fn build_schema_map() -> KnownKeys {
    use KnownKeys::{Leaf, Map, Struct};

    Struct(HashMap::from([
        (
            "gateway",
            Struct(HashMap::from([
                ("bot_token", Leaf),
                ("allowed_user_ids", Leaf),
                ("response_timeout", Leaf),
                ("idle_window", Leaf),
                ("main_thread_timeout", Leaf),
                ("shutdown_timeout", Leaf),
            ])),
        ),
        (
            "host",
            Struct(HashMap::from([
                ("modes", Leaf),
                ("mode", Leaf),
                ("models", Map),
                ("plugins", Leaf),
                ("llama_agents", Leaf),
                ("openai_agents", Leaf),
                ("workdir", Leaf),
            ])),
        ),
    ]))
}

/// Compute the Levenshtein edit distance between two strings.
fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0; b.len() + 1];

    for (i, ca) in a.iter().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let cost = usize::from(ca != cb);
            curr[j + 1] = (prev[j] + cost).min(prev[j + 1] + 1).min(curr[j] + 1);
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b.len()]
}

/// Closest candidate within `max_distance`, if any.
fn suggest<'a>(needle: &str, candidates: &[&'a str], max_distance: usize) -> Option<&'a str> {
    let mut best: Option<(&'a str, usize)> = None;
    for &candidate in candidates {
        let d = levenshtein(needle, candidate);
        if d > 0 && d <= max_distance && best.as_ref().is_none_or(|(_, bd)| d < *bd) {
            best = Some((candidate, d));
        }
    }
    best.map(|(s, _)| s)
}

/// Validate a config file at the given path, or discover the default config
/// file location if `path` is `None`.
#[must_use]
pub fn validate(path: Option<&Path>) -> ValidationResult {
    let config_path = match path {
        Some(p) => Some(p.to_path_buf()),
        None => crate::loader::find_config_file(),
    };

    let Some(ref actual_path) = config_path else {
        return ValidationResult {
            diagnostics: vec![Diagnostic {
                severity: Severity::Info,
                category: "file-ref",
                path: String::new(),
                message: "no config file found; using defaults".into(),
            }],
            config_path: None,
        };
    };

    let content = match std::fs::read_to_string(actual_path) {
        Ok(content) => content,
        Err(e) => {
            return ValidationResult {
                diagnostics: vec![Diagnostic {
                    severity: Severity::Error,
                    category: "syntax",
                    path: String::new(),
                    message: format!("failed to read config file: {e}"),
                }],
                config_path: Some(actual_path.clone()),
            };
        },
    };

    let ext = actual_path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("toml");
    let mut result = validate_str(&substitute_env(&content), ext);
    result.config_path = Some(actual_path.clone());
    result
}

/// Validate a TOML string without touching the file system.
#[must_use]
pub fn validate_toml_str(toml_str: &str) -> ValidationResult {
    validate_str(toml_str, "toml")
}

fn validate_str(raw: &str, ext: &str) -> ValidationResult {
    let mut diagnostics = Vec::new();

    let parsed: Result<serde_json::Value, String> = match ext {
        "toml" => toml::from_str(raw).map_err(|e| format!("TOML syntax error: {e}")),
        "yaml" | "yml" => serde_yaml::from_str(raw).map_err(|e| format!("YAML syntax error: {e}")),
        "json" => serde_json::from_str(raw).map_err(|e| format!("JSON syntax error: {e}")),
        other => Err(format!("unsupported config format: .{other}")),
    };
    let value = match parsed {
        Ok(v) => v,
        Err(message) => {
            diagnostics.push(Diagnostic {
                severity: Severity::Error,
                category: "syntax",
                path: String::new(),
                message,
            });
            return ValidationResult {
                diagnostics,
                config_path: None,
            };
        },
    };

    check_unknown_fields(&value, &build_schema_map(), "", &mut diagnostics);

    match serde_json::from_value::<DeskgramConfig>(value) {
        Ok(config) => check_gateway(&config, &mut diagnostics),
        Err(e) => diagnostics.push(Diagnostic {
            severity: Severity::Error,
            category: "type-error",
            path: String::new(),
            message: format!("type error: {e}"),
        }),
    }

    ValidationResult {
        diagnostics,
        config_path: None,
    }
}

fn check_unknown_fields(
    value: &serde_json::Value,
    schema: &KnownKeys,
    prefix: &str,
    diagnostics: &mut Vec<Diagnostic>,
) {
    let (serde_json::Value::Object(table), KnownKeys::Struct(fields)) = (value, schema) else {
        return;
    };
    let known_keys: Vec<&str> = fields.keys().copied().collect();
    for (key, child_value) in table {
        let path = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{prefix}.{key}")
        };
        if let Some(child_schema) = fields.get(key.as_str()) {
            check_unknown_fields(child_value, child_schema, &path, diagnostics);
            continue;
        }
        let level = if prefix.is_empty() {
            "at top level "
        } else {
            ""
        };
        let msg = match suggest(key, &known_keys, 3) {
            Some(s) => format!("unknown field {level}(did you mean \"{s}\"?)"),
            None => format!("unknown field {level}"),
        };
        diagnostics.push(Diagnostic {
            severity: Severity::Error,
            category: "unknown-field",
            path,
            message: msg.trim().to_string(),
        });
    }
}

fn check_gateway(config: &DeskgramConfig, diagnostics: &mut Vec<Diagnostic>) {
    let gw = &config.gateway;
    let token = gw.bot_token.expose_secret();

    if token.contains("${") {
        diagnostics.push(Diagnostic {
            severity: Severity::Warning,
            category: "gateway",
            path: "gateway.bot_token".into(),
            message: "bot token references an unset environment variable".into(),
        });
    } else if token.trim().is_empty() {
        diagnostics.push(Diagnostic {
            severity: Severity::Warning,
            category: "gateway",
            path: "gateway.bot_token".into(),
            message: "bot token is empty; the gateway will not start".into(),
        });
    }

    let ignored: Vec<&str> = gw
        .allowed_user_ids
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty() && !s.chars().all(|c| c.is_ascii_digit()))
        .collect();
    if !ignored.is_empty() {
        diagnostics.push(Diagnostic {
            severity: Severity::Warning,
            category: "gateway",
            path: "gateway.allowed_user_ids".into(),
            message: format!("non-numeric entries are ignored: {}", ignored.join(", ")),
        });
    }

    if gw.response_timeout < MIN_RESPONSE_TIMEOUT_SECS {
        diagnostics.push(Diagnostic {
            severity: Severity::Info,
            category: "gateway",
            path: "gateway.response_timeout".into(),
            message: format!(
                "{} is below the minimum; {MIN_RESPONSE_TIMEOUT_SECS} will be used",
                gw.response_timeout
            ),
        });
    }

    if !(gw.idle_window >= MIN_IDLE_WINDOW_SECS) {
        diagnostics.push(Diagnostic {
            severity: Severity::Info,
            category: "gateway",
            path: "gateway.idle_window".into(),
            message: format!(
                "{} is below the minimum; {MIN_IDLE_WINDOW_SECS} will be used",
                gw.idle_window
            ),
        });
    }

    let host = &config.host;
    if !host.mode.is_empty() && !host.modes.iter().any(|m| *m == host.mode) {
        diagnostics.push(Diagnostic {
            severity: Severity::Warning,
            category: "unknown-field",
            path: "host.mode".into(),
            message: format!("\"{}\" is not listed in host.modes", host.mode),
        });
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, std::io::Write};

    fn find<'a>(result: &'a ValidationResult, path: &str) -> Option<&'a Diagnostic> {
        result.diagnostics.iter().find(|d| d.path == path)
    }

    #[test]
    fn levenshtein_basics() {
        assert_eq!(levenshtein("gateway", "gateway"), 0);
        assert_eq!(levenshtein("", "abc"), 3);
        assert_eq!(levenshtein("gatway", "gateway"), 1);
        assert_eq!(levenshtein("idle_windw", "idle_window"), 1);
    }

    #[test]
    fn suggest_finds_close_match() {
        let candidates = &["gateway", "host"];
        assert_eq!(suggest("gatewy", candidates, 3), Some("gateway"));
        assert_eq!(suggest("hots", candidates, 3), Some("host"));
        assert_eq!(suggest("completely_different", candidates, 3), None);
    }

    #[test]
    fn empty_config_only_warns_about_token() {
        let result = validate_toml_str("");
        assert!(!result.has_errors());
        let d = find(&result, "gateway.bot_token").unwrap();
        assert_eq!(d.severity, Severity::Warning);
    }

    #[test]
    fn full_valid_config_no_diagnostics() {
        let result = validate_toml_str(
            r#"
[gateway]
bot_token = "123:abc"
allowed_user_ids = "1, 2"
response_timeout = 90
idle_window = 2.5

[host]
modes = ["chat", "agent_llama"]
mode = "chat"
plugins = ["cmd_web"]

[host.models]
chat = ["a", "b"]
"#,
        );
        assert!(
            result.diagnostics.is_empty(),
            "unexpected diagnostics: {:?}",
            result.diagnostics
        );
    }

    #[test]
    fn unknown_nested_key_with_suggestion() {
        let result = validate_toml_str("[gateway]\nbot_token = \"x\"\nidle_windw = 3\n");
        let d = find(&result, "gateway.idle_windw").unwrap();
        assert_eq!(d.severity, Severity::Error);
        assert!(d.message.contains("idle_window"), "{}", d.message);
    }

    #[test]
    fn unknown_top_level_key() {
        let result = validate_toml_str("[gatway]\n");
        let d = find(&result, "gatway").unwrap();
        assert!(d.message.contains("at top level"));
        assert!(d.message.contains("gateway"));
    }

    #[test]
    fn syntax_error_detected() {
        let result = validate_toml_str("[gateway\n");
        assert!(result.has_errors());
        assert_eq!(result.diagnostics[0].category, "syntax");
    }

    #[test]
    fn type_error_detected() {
        let result = validate_toml_str("[gateway]\nresponse_timeout = \"soon\"\n");
        assert!(result.diagnostics.iter().any(|d| d.category == "type-error"));
    }

    #[test]
    fn non_numeric_allowlist_entries_warned() {
        let result =
            validate_toml_str("[gateway]\nbot_token = \"x\"\nallowed_user_ids = \"12, bob, 7\"\n");
        let d = find(&result, "gateway.allowed_user_ids").unwrap();
        assert_eq!(d.severity, Severity::Warning);
        assert!(d.message.contains("bob"));
        assert!(!d.message.contains("12"));
    }

    #[test]
    fn clamped_values_reported_as_info() {
        let result = validate_toml_str(
            "[gateway]\nbot_token = \"x\"\nresponse_timeout = 10\nidle_window = 0.5\n",
        );
        assert_eq!(result.count(Severity::Info), 2);
        assert!(!result.has_errors());
    }

    #[test]
    fn unresolved_env_token_warned() {
        let result = validate_toml_str("[gateway]\nbot_token = \"${NOT_SET_ANYWHERE}\"\n");
        let d = find(&result, "gateway.bot_token").unwrap();
        assert!(d.message.contains("environment variable"));
    }

    #[test]
    fn validates_yaml_file() {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        file.write_all(b"gateway:\n  bot_token: \"1:a\"\n  bogus: 1\n")
            .unwrap();
        let result = validate(Some(file.path()));
        assert_eq!(result.config_path.as_deref(), Some(file.path()));
        assert!(find(&result, "gateway.bogus").is_some());
    }

    #[test]
    fn missing_file_is_error() {
        let result = validate(Some(Path::new("/nonexistent/deskgram.toml")));
        assert!(result.has_errors());
    }

    #[test]
    fn schema_covers_default_config() {
        let value = serde_json::to_value(DeskgramConfig::default()).unwrap();
        let mut diagnostics = Vec::new();
        check_unknown_fields(&value, &build_schema_map(), "", &mut diagnostics);
        assert!(
            diagnostics.is_empty(),
            "schema map is missing keys present in DeskgramConfig::default(): {diagnostics:?}"
        );
    }
}
