use {
    deskgram_config::GatewayConfig,
    secrecy::{ExposeSecret, Secret},
    serde_json::{Map, Number, Value},
    tracing::warn,
};

use crate::{Error, Result, access::Allowlist};

/// Whole-second settings. Fractions are dropped.
const SECONDS_KEYS: [&str; 3] = ["response_timeout", "main_thread_timeout", "shutdown_timeout"];

const FRACTIONAL_KEYS: [&str; 1] = ["idle_window"];

/// Read the gateway settings stored under the plugin's options.
///
/// `null` yields defaults. Unknown keys are ignored so that hosts can keep
/// their own bookkeeping next to the gateway settings. Settings panels often
/// store numbers as text, so numeric settings also accept numeric strings;
/// a value that is not a number at all falls back to its default.
pub fn from_options(options: &Value) -> Result<GatewayConfig> {
    let mut options = match options {
        Value::Null => return Ok(GatewayConfig::default()),
        Value::Object(map) => map.clone(),
        other => {
            return Err(Error::external(
                "invalid telegram_gateway options",
                std::io::Error::other(format!("expected an object, got {other}")),
            ));
        },
    };
    coerce_numbers(&mut options);
    if let Some(Value::Number(ids)) = options.get("allowed_user_ids") {
        let ids = ids.to_string();
        options.insert("allowed_user_ids".into(), Value::String(ids));
    }

    let mut config: GatewayConfig = serde_json::from_value(Value::Object(options))
        .map_err(|e| Error::external("invalid telegram_gateway options", e))?;
    let token = config.bot_token.expose_secret().trim().to_string();
    config.bot_token = Secret::new(token);
    Ok(config)
}

fn coerce_numbers(options: &mut Map<String, Value>) {
    for key in SECONDS_KEYS {
        coerce(options, key, |n| {
            let secs = n.trunc().max(0.0);
            // Saturates at u64::MAX.
            Some(Number::from(secs as u64))
        });
    }
    for key in FRACTIONAL_KEYS {
        coerce(options, key, Number::from_f64);
    }
}

fn coerce(options: &mut Map<String, Value>, key: &str, convert: impl Fn(f64) -> Option<Number>) {
    let Some(value) = options.get(key) else {
        return;
    };
    let parsed = match value {
        Value::Null => None,
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    match parsed.filter(|n| n.is_finite()).and_then(convert) {
        Some(number) => {
            options.insert(key.into(), Value::Number(number));
        },
        None => {
            if !value.is_null() {
                warn!(key, value = %value, "ignoring non-numeric gateway setting");
            }
            options.remove(key);
        },
    }
}

/// Allowlist derived from the current settings.
#[must_use]
pub fn allowlist(config: &GatewayConfig) -> Allowlist {
    Allowlist::parse(&config.allowed_user_ids)
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, rstest::rstest, serde_json::json, std::time::Duration};

    #[test]
    fn null_options_yield_defaults() {
        let cfg = from_options(&Value::Null).unwrap();
        assert!(!cfg.has_token());
        assert!(allowlist(&cfg).is_empty());
    }

    #[test]
    fn token_is_trimmed() {
        let cfg = from_options(&json!({"bot_token": "  1:abc \n"})).unwrap();
        assert_eq!(cfg.bot_token.expose_secret(), "1:abc");
    }

    #[test]
    fn host_bookkeeping_keys_ignored() {
        let cfg = from_options(&json!({
            "bot_token": "1:abc",
            "allowed_user_ids": "5",
            "response_timeout": 10,
            "enabled": true
        }))
        .unwrap();
        assert_eq!(allowlist(&cfg).len(), 1);
        assert_eq!(cfg.effective_response_timeout(), Duration::from_secs(60));
    }

    #[rstest]
    #[case(json!(90), 90)]
    #[case(json!("90"), 90)]
    #[case(json!(" 90 "), 90)]
    #[case(json!(90.0), 90)]
    #[case(json!("90.7"), 90)]
    #[case(json!(-5), 0)]
    #[case(json!("soon"), 60)]
    #[case(json!(null), 60)]
    #[case(json!([90]), 60)]
    fn response_timeout_is_lenient(#[case] raw: Value, #[case] expected: u64) {
        let cfg = from_options(&json!({"bot_token": "1:abc", "response_timeout": raw})).unwrap();
        assert!(cfg.has_token());
        assert_eq!(cfg.response_timeout, expected);
    }

    #[rstest]
    #[case(json!("3.5"), 3.5)]
    #[case(json!(4), 4.0)]
    #[case(json!("later"), 2.0)]
    fn idle_window_is_lenient(#[case] raw: Value, #[case] expected: f64) {
        let cfg = from_options(&json!({"idle_window": raw})).unwrap();
        assert!((cfg.idle_window - expected).abs() < f64::EPSILON);
    }

    #[test]
    fn numeric_allowlist_is_accepted() {
        let cfg = from_options(&json!({"allowed_user_ids": 1001})).unwrap();
        assert!(allowlist(&cfg).check(1001).is_ok());
    }

    #[test]
    fn non_object_options_rejected() {
        let err = from_options(&json!("token")).unwrap_err();
        assert!(err.to_string().contains("invalid telegram_gateway options"));
    }
}
