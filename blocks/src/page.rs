use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub const DEFAULT_COUNT: u32 = 2;
pub const DEFAULT_START_INDEX: u32 = 0;

/// Offset/count request for the next batch of generated blocks.
///
/// Fields other than `count` and `startIndex` (topic, child id, ...) are
/// carried in `passthrough` and never interpreted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageRequest {
    pub count: u32,
    pub start_index: u32,
    #[serde(flatten)]
    pub passthrough: Map<String, Value>,
}

impl PageRequest {
    pub fn new(start_index: u32, count: u32) -> Self {
        Self {
            count,
            start_index,
            passthrough: Map::new(),
        }
    }

    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.passthrough.insert(key.to_owned(), value.into());
        self
    }

    /// Index of the first block after this page.
    pub fn next_index(&self) -> u32 {
        self.start_index.saturating_add(self.count)
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self::new(DEFAULT_START_INDEX, DEFAULT_COUNT)
    }
}

/// Loose truthiness as used by the callers of the generation proxy.
///
/// `null`, `false`, any numeric zero and the empty string are falsy.
/// Arrays and objects are always truthy.
pub fn is_falsy(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64().is_none_or(|n| n == 0.0),
        Value::String(s) => s.is_empty(),
        Value::Array(_) | Value::Object(_) => false,
    }
}

/// Fills in pagination defaults on a raw request body.
///
/// A missing or falsy `count` becomes 2 and a missing or falsy
/// `startIndex` becomes 0. An explicit `count: 0` is therefore
/// indistinguishable from an omitted one and yields the first small page.
pub fn apply_defaults(body: &mut Map<String, Value>) {
    if body.get("count").is_none_or(is_falsy) {
        body.insert("count".to_owned(), DEFAULT_COUNT.into());
    }
    if body.get("startIndex").is_none_or(is_falsy) {
        body.insert("startIndex".to_owned(), DEFAULT_START_INDEX.into());
    }
}
