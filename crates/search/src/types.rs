use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The slice of a web search response the bot reads.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct WebSearchApiResponse {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub summarizer: Option<Summarizer>,
}

impl WebSearchApiResponse {
    /// The summarizer key when the query was eligible for a summary.
    pub fn summarizer_key(&self) -> Option<&str> {
        self.summarizer
            .as_ref()
            .and_then(|summarizer| summarizer.key.as_deref())
            .filter(|key| !key.is_empty())
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Summarizer {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub key: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SummarizerSearchApiResponse {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub summary: Vec<SummaryMessage>,
    #[serde(default)]
    pub enrichments: SummaryEnrichments,
    #[serde(default)]
    pub followups: Vec<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SummaryMessage {
    #[serde(rename = "type", default)]
    pub kind: String,
    /// Text for `token` fragments; other fragment kinds carry structured data.
    #[serde(default)]
    pub data: Value,
}

impl SummaryMessage {
    pub fn token(text: impl Into<String>) -> Self {
        Self { kind: "token".to_owned(), data: Value::String(text.into()) }
    }

    pub fn text(&self) -> String {
        match &self.data {
            Value::String(text) => text.clone(),
            Value::Null => String::new(),
            other => other.to_string(),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SummaryEnrichments {
    #[serde(default)]
    pub raw: Option<String>,
    #[serde(default)]
    pub images: Vec<SummaryImage>,
    #[serde(default)]
    pub qa: Vec<SummaryAnswer>,
    #[serde(default)]
    pub entities: Vec<SummaryEntity>,
    #[serde(default)]
    pub context: Vec<SummaryContext>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummaryContext {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub meta_url: Option<MetaUrl>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummaryEntity {
    #[serde(default)]
    pub uuid: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub images: Vec<SummaryImage>,
    #[serde(default)]
    pub highlight: Vec<TextLocation>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SummaryAnswer {
    #[serde(default)]
    pub answer: String,
    #[serde(default)]
    pub score: Option<f64>,
    #[serde(default)]
    pub highlight: Option<TextLocation>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummaryImage {
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextLocation {
    pub start: u64,
    pub end: u64,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetaUrl {
    #[serde(default)]
    pub scheme: Option<String>,
    #[serde(default)]
    pub netloc: Option<String>,
    #[serde(default)]
    pub hostname: Option<String>,
    #[serde(default)]
    pub favicon: Option<String>,
    #[serde(default)]
    pub path: Option<String>,
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{SummarizerSearchApiResponse, WebSearchApiResponse};

    #[test]
    fn summarizer_key_requires_non_empty_value() {
        let eligible: WebSearchApiResponse = serde_json::from_value(json!({
            "type": "search",
            "summarizer": { "type": "summarizer", "key": "{\"query\":\"k2\"}" }
        }))
        .expect("decode");
        let no_key: WebSearchApiResponse =
            serde_json::from_value(json!({ "type": "search", "summarizer": { "type": "summarizer" } }))
                .expect("decode");
        let empty_key: WebSearchApiResponse =
            serde_json::from_value(json!({ "summarizer": { "key": "" } })).expect("decode");
        let no_summarizer: WebSearchApiResponse =
            serde_json::from_value(json!({ "type": "search", "web": { "results": [] } }))
                .expect("decode");

        assert_eq!(eligible.summarizer_key(), Some("{\"query\":\"k2\"}"));
        assert_eq!(no_key.summarizer_key(), None);
        assert_eq!(empty_key.summarizer_key(), None);
        assert_eq!(no_summarizer.summarizer_key(), None);
    }

    #[test]
    fn summary_response_tolerates_missing_sections_and_structured_fragments() {
        let response: SummarizerSearchApiResponse = serde_json::from_value(json!({
            "type": "summarizer",
            "status": "complete",
            "title": "what is k2?",
            "summary": [
                { "type": "token", "data": "K2 is tall." },
                { "type": "enum_item", "data": { "text": "item" } },
                { "type": "enum_end" }
            ]
        }))
        .expect("decode");

        assert_eq!(response.summary.len(), 3);
        assert_eq!(response.summary[0].text(), "K2 is tall.");
        assert_eq!(response.summary[1].text(), "{\"text\":\"item\"}");
        assert_eq!(response.summary[2].text(), "");
        assert!(response.enrichments.context.is_empty());
        assert!(response.followups.is_empty());
    }
}
