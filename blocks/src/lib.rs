use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

pub mod page;

pub use page::{DEFAULT_COUNT, DEFAULT_START_INDEX, PageRequest, apply_defaults, is_falsy};

/// The closed set of content kinds a specialist can produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum BlockType {
    Fact,
    Quiz,
    Creative,
    Activity,
    News,
    FunFact,
    Mindfulness,
}

impl BlockType {
    pub fn as_str(&self) -> &'static str {
        match self {
            BlockType::Fact => "fact",
            BlockType::Quiz => "quiz",
            BlockType::Creative => "creative",
            BlockType::Activity => "activity",
            BlockType::News => "news",
            BlockType::FunFact => "funFact",
            BlockType::Mindfulness => "mindfulness",
        }
    }
}

impl std::fmt::Display for BlockType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for BlockType {
    type Err = UnknownBlockType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "fact" => Ok(BlockType::Fact),
            "quiz" => Ok(BlockType::Quiz),
            "creative" => Ok(BlockType::Creative),
            "activity" => Ok(BlockType::Activity),
            "news" => Ok(BlockType::News),
            "funFact" => Ok(BlockType::FunFact),
            "mindfulness" => Ok(BlockType::Mindfulness),
            other => Err(UnknownBlockType(other.to_owned())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownBlockType(pub String);

impl std::fmt::Display for UnknownBlockType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Unknown content block type: {}", self.0)
    }
}

impl std::error::Error for UnknownBlockType {}

/// A generated block that has not been persisted yet.
///
/// Before it is saved a draft has no `id`; it is identified by its
/// [idempotency key](ContentBlockDraft::idempotency_key) instead.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentBlockDraft {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub curio_id: Option<String>,
    pub specialist_id: String,
    #[serde(rename = "type")]
    pub block_type: BlockType,
    pub content: serde_json::Value,
    #[serde(default)]
    pub liked: bool,
    #[serde(default)]
    pub bookmarked: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub draft_key: Option<String>,
}

impl ContentBlockDraft {
    pub fn new(specialist_id: &str, block_type: BlockType, content: serde_json::Value) -> Self {
        Self {
            id: None,
            curio_id: None,
            specialist_id: specialist_id.to_owned(),
            block_type,
            content,
            liked: false,
            bookmarked: false,
            draft_key: None,
        }
    }

    /// Pins the draft to its position in a curio, so that saving it twice
    /// targets the same record.
    pub fn at_position(mut self, curio_id: &str, ordinal: u32) -> Self {
        self.draft_key = Some(format!("{}:{}:{}", curio_id, self.specialist_id, ordinal));
        self.curio_id = Some(curio_id.to_owned());
        self
    }

    /// Key the backend upserts on when the draft carries no `id`.
    ///
    /// Uses the client supplied `draftKey` when there is one, otherwise a
    /// SHA-256 fingerprint of the curio, specialist, type and content.
    pub fn idempotency_key(&self) -> String {
        if let Some(key) = &self.draft_key {
            return key.clone();
        }

        let canonical = serde_json::json!([
            self.curio_id,
            self.specialist_id,
            self.block_type,
            self.content,
        ]);
        hex::encode(Sha256::digest(canonical.to_string().as_bytes()))
    }
}

/// A block as stored by the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentBlock {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub curio_id: Option<String>,
    pub specialist_id: String,
    #[serde(rename = "type")]
    pub block_type: BlockType,
    pub content: serde_json::Value,
    #[serde(default)]
    pub liked: bool,
    #[serde(default)]
    pub bookmarked: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SaveBlockRequest {
    pub block: ContentBlockDraft,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SaveBlockResponse {
    pub block: ContentBlock,
}

/// Error body returned by backend functions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorMessage {
    pub message: String,
}

/// Error body returned by the generation proxy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProxyError {
    pub error: String,
}

/// Body the generation engine answers a page request with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedPage {
    #[serde(default)]
    pub blocks: Vec<ContentBlockDraft>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub has_more: Option<bool>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn block_types_use_wire_spelling() {
        let types: Vec<BlockType> = serde_json::from_value(json!([
            "fact",
            "quiz",
            "creative",
            "activity",
            "news",
            "funFact",
            "mindfulness"
        ]))
        .unwrap();
        assert_eq!(types.len(), 7);
        assert_eq!(types[5], BlockType::FunFact);
        for t in types {
            assert_eq!(t.as_str().parse::<BlockType>().unwrap(), t);
        }
        assert!(serde_json::from_value::<BlockType>(json!("poem")).is_err());
    }

    #[test]
    fn draft_defaults_flags_to_false() {
        let draft: ContentBlockDraft = serde_json::from_value(json!({
            "specialistId": "nova",
            "type": "fact",
            "content": { "fact": "Octopuses have three hearts" }
        }))
        .unwrap();
        assert!(!draft.liked);
        assert!(!draft.bookmarked);
        assert_eq!(draft.id, None);
        assert_eq!(draft.curio_id, None);
    }

    #[test]
    fn fingerprint_depends_on_content_only() {
        let a = ContentBlockDraft::new("nova", BlockType::Fact, json!({ "fact": "x" }));
        let mut b = a.clone();
        b.liked = true;
        assert_eq!(a.idempotency_key(), b.idempotency_key());

        let c = ContentBlockDraft::new("nova", BlockType::Fact, json!({ "fact": "y" }));
        assert_ne!(a.idempotency_key(), c.idempotency_key());
        assert_eq!(a.idempotency_key().len(), 64);
    }

    #[test]
    fn positioned_draft_uses_its_position_as_key() {
        let draft = ContentBlockDraft::new("spark", BlockType::Quiz, json!({}))
            .at_position("curio-7", 3);
        assert_eq!(draft.idempotency_key(), "curio-7:spark:3");
        assert_eq!(draft.curio_id.as_deref(), Some("curio-7"));
    }

    #[test]
    fn draft_serializes_camel_case() {
        let draft = ContentBlockDraft::new("nova", BlockType::FunFact, json!({ "a": 1 }))
            .at_position("c1", 0);
        let value = serde_json::to_value(&draft).unwrap();
        assert_eq!(value["specialistId"], "nova");
        assert_eq!(value["curioId"], "c1");
        assert_eq!(value["type"], "funFact");
        assert_eq!(value["draftKey"], "c1:nova:0");
        assert!(value.get("id").is_none());
    }
}
