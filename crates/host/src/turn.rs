use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One conversation exchange as the host records it.
///
/// Hosts append to `output`, `results` and `images` while a reply is being
/// produced, so a snapshot may be partial.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Turn {
    pub id: u64,
    pub input: Option<String>,
    pub output: Option<String>,
    pub results: Vec<Value>,
    pub images: Vec<String>,
    pub extra: Map<String, Value>,
    pub sub_reply: bool,
    pub agent_output: bool,
    pub stopped: bool,
}

impl Turn {
    #[must_use]
    pub fn new(id: u64) -> Self {
        Self {
            id,
            ..Default::default()
        }
    }

    /// Produced by a sub-agent or tool call rather than the user's prompt.
    #[must_use]
    pub fn is_sub_reply(&self) -> bool {
        self.sub_reply || self.extra_flag("sub_reply")
    }

    #[must_use]
    pub fn is_agent_output(&self) -> bool {
        self.agent_output || self.extra_flag("agent_output")
    }

    /// The agent signalled that it is done with this turn.
    #[must_use]
    pub fn agent_finished(&self) -> bool {
        self.extra_flag("agent_finish")
    }

    fn extra_flag(&self, key: &str) -> bool {
        self.extra.get(key).is_some_and(truthy)
    }

    /// Render a result entry as chat text.
    ///
    /// Objects carrying a non-null `result` key yield that value, strings
    /// are used as-is and anything else is rendered as JSON.
    #[must_use]
    pub fn result_text(entry: &Value) -> String {
        match entry {
            Value::Object(map) => match map.get("result") {
                Some(Value::String(s)) => s.clone(),
                Some(v) if !v.is_null() => v.to_string(),
                _ => entry.to_string(),
            },
            Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}
