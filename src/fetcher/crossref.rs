use super::{
    async_trait, Collection, PageFetcher, TransportError, MEMBER_ERROR_MESSAGE,
    WORKS_ERROR_MESSAGE,
};
use crate::config::ClientConfig;
use crate::query::WorksQuery;
use crate::work::{Member, Page, Work};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;

/// Longest plain-text error body passed through as a message
const MAX_PLAIN_ERROR_LEN: usize = 200;

/// Crossref REST API client
pub struct CrossrefClient {
    client: Client,
    config: ClientConfig,
}

impl CrossrefClient {
    pub fn new(config: ClientConfig) -> Result<Self, TransportError> {
        let client = Client::builder()
            .user_agent(config.user_agent())
            .timeout(config.timeout)
            .build()?;
        Ok(Self { client, config })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.config.api_root(), path)
    }

    async fn get_message<T: DeserializeOwned>(
        &self,
        url: &str,
        params: &[(&'static str, String)],
        fallback: &str,
    ) -> Result<T, TransportError> {
        let response = self.client.get(url).query(params).send().await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            let message = extract_error_message(&body).unwrap_or_else(|| fallback.to_string());
            tracing::warn!("GET {} failed with {}: {}", url, status, message);
            return Err(TransportError::status(status.as_u16(), message));
        }

        let envelope: Envelope<T> = serde_json::from_str(&body)
            .map_err(|e| TransportError::Decode(format!("Malformed Crossref response: {}", e)))?;

        if envelope.status.as_deref().is_some_and(|s| s != "ok") {
            return Err(TransportError::status(status.as_u16(), fallback));
        }

        Ok(envelope.message)
    }
}

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    status: Option<String>,
    message: T,
}

#[derive(Debug, Deserialize)]
struct WorksMessage {
    #[serde(default)]
    items: Vec<Work>,
    #[serde(rename = "total-results", default)]
    total_results: u64,
    #[serde(rename = "next-cursor")]
    next_cursor: Option<String>,
}

impl From<WorksMessage> for Page {
    fn from(message: WorksMessage) -> Self {
        Page {
            items: message.items,
            total_results: message.total_results,
            next_cursor: message.next_cursor.filter(|c| !c.is_empty()),
        }
    }
}

#[async_trait]
impl PageFetcher for CrossrefClient {
    async fn fetch_page(
        &self,
        collection: &Collection,
        query: &WorksQuery,
    ) -> Result<Page, TransportError> {
        collection.validate()?;

        let url = self.url(&collection.works_path());
        let params = query.to_params(&self.config.mailto);

        tracing::debug!(
            "Fetching {} (cursor={}, rows={})",
            collection,
            query.effective_cursor(),
            query.effective_rows()
        );

        let message: WorksMessage = self.get_message(&url, &params, WORKS_ERROR_MESSAGE).await?;
        Ok(message.into())
    }

    async fn fetch_member(&self, member_id: &str) -> Result<Member, TransportError> {
        let collection = Collection::member(member_id);
        collection.validate()?;

        let url = self.url(&collection.entity_path());
        let params = [("mailto", self.config.mailto.clone())];

        tracing::debug!("Fetching member {}", member_id);

        self.get_message(&url, &params, MEMBER_ERROR_MESSAGE).await
    }

    fn name(&self) -> &'static str {
        "Crossref"
    }
}

/// Pull a displayable message out of a failed response body.
///
/// Crossref answers with either `{"message": "..."}`, a validation failure
/// `{"message": [{"message": "..."}, ...]}`, or a short plain-text body.
pub fn extract_error_message(body: &str) -> Option<String> {
    let body = body.trim();
    if body.is_empty() {
        return None;
    }

    match serde_json::from_str::<Value>(body) {
        Ok(json) => match json.get("message")? {
            Value::String(message) if !message.trim().is_empty() => {
                Some(message.trim().to_string())
            }
            Value::Array(items) => {
                let messages: Vec<&str> = items
                    .iter()
                    .filter_map(|item| match item {
                        Value::String(s) => Some(s.as_str()),
                        other => other.get("message").and_then(Value::as_str),
                    })
                    .filter(|m| !m.trim().is_empty())
                    .collect();
                (!messages.is_empty()).then(|| messages.join("; "))
            }
            _ => None,
        },
        Err(_) if body.len() <= MAX_PLAIN_ERROR_LEN && !body.starts_with('<') => {
            Some(body.to_string())
        }
        Err(_) => None,
    }
}
