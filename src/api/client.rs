use reqwest::Client as HttpClient;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::api::error::ApiError;
use crate::api::models::{ChatMessage, Conversation, ConversationDto, MessageDto, OutgoingMessage, UserId};
use crate::app::AppConfig;
use crate::catalog::filter::ListingFilter;
use crate::catalog::models::Listing;
use crate::catalog::profile::{Profile, ProfileUpdate};
use crate::chat::session::ChatBackend;

#[derive(Debug, Clone)]
pub struct ApiClient {
    http: HttpClient,
    base_api: String,
    token: Option<String>,
}

impl ApiClient {
    pub fn new(config: &AppConfig, token: Option<String>) -> Result<Self, ApiError> {
        let http = HttpClient::builder()
            .timeout(config.request_timeout())
            .build()?;
        Ok(Self {
            http,
            base_api: Self::base_api(&config.base_url),
            token,
        })
    }

    fn base_api(base_url: &str) -> String {
        let trimmed = base_url.trim_end_matches('/');
        if trimmed.ends_with("/api") { trimmed.to_string() } else { format!("{}/api", trimmed) }
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_api, path.trim_start_matches('/'))
    }

    fn with_auth(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self.token.as_deref() {
            Some(t) => req.bearer_auth(t),
            None => req,
        }
    }

    async fn send_json(&self, req: reqwest::RequestBuilder) -> Result<Value, ApiError> {
        let resp = self.with_auth(req).send().await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ApiError::Status {
                status: status.as_u16(),
                body: body.chars().take(200).collect(),
            });
        }
        let text = resp.text().await?;
        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_str(&text)?)
    }

    /// Checks that the backend answers at all. Tries the usual health endpoints.
    pub async fn ping(&self) -> Result<u16, ApiError> {
        let candidates = [self.endpoint("health"), self.endpoint("ping"), self.base_api.clone()];
        let mut last_err: Option<ApiError> = None;
        for endpoint in candidates {
            match self.with_auth(self.http.get(&endpoint)).send().await {
                Ok(resp) => return Ok(resp.status().as_u16()),
                Err(e) => last_err = Some(e.into()),
            }
        }
        Err(last_err.unwrap_or_else(|| ApiError::Decode("no endpoint to ping".into())))
    }

    pub async fn fetch_conversations(&self, me: UserId) -> Result<Vec<Conversation>, ApiError> {
        let req = self
            .http
            .get(self.endpoint("chat/conversations"))
            .query(&[("userId", me.to_string())]);
        let json = self.send_json(req).await?;
        let items: Vec<ConversationDto> = decode_items(json, &["conversations"]);
        Ok(items.into_iter().map(|dto| dto.into_conversation(me)).collect())
    }

    pub async fn fetch_history(&self, a: UserId, b: UserId) -> Result<Vec<ChatMessage>, ApiError> {
        let req = self
            .http
            .get(self.endpoint("chat/messages"))
            .query(&[("user1", a.to_string()), ("user2", b.to_string())]);
        let json = self.send_json(req).await?;
        let items: Vec<MessageDto> = decode_items(json, &["messages"]);
        Ok(items.into_iter().map(MessageDto::into_message).collect())
    }

    /// Returns the server-assigned id when the backend reports one.
    pub async fn post_message(&self, msg: &OutgoingMessage) -> Result<Option<String>, ApiError> {
        let req = self.http.post(self.endpoint("chat/messages")).json(msg);
        let json = self.send_json(req).await?;
        let record = unwrap_data(json);
        Ok(["id", "_id", "messageId"]
            .iter()
            .find_map(|k| match record.get(*k) {
                Some(Value::String(s)) if !s.is_empty() => Some(s.clone()),
                Some(Value::Number(n)) => Some(n.to_string()),
                _ => None,
            }))
    }

    pub async fn post_conversation(&self, me: UserId, peer: UserId) -> Result<Conversation, ApiError> {
        let body = serde_json::json!({ "userId": me, "otherUserId": peer });
        let req = self.http.post(self.endpoint("chat/conversations")).json(&body);
        let json = self.send_json(req).await?;
        let dto: ConversationDto = serde_json::from_value(unwrap_data(json))?;
        Ok(dto.into_conversation(me))
    }

    pub async fn listings(&self, filter: &ListingFilter) -> Result<Vec<Listing>, ApiError> {
        let req = self.http.get(self.endpoint("listings")).query(&filter.query_pairs());
        let json = self.send_json(req).await?;
        Ok(decode_items(json, &["listings", "products"]))
    }

    pub async fn listing(&self, id: &str) -> Result<Listing, ApiError> {
        let req = self.http.get(self.endpoint(&format!("listings/{id}")));
        let json = self.send_json(req).await?;
        Ok(serde_json::from_value(unwrap_data(json))?)
    }

    pub async fn profile(&self, id: UserId) -> Result<Profile, ApiError> {
        let req = self.http.get(self.endpoint(&format!("users/{id}")));
        let json = self.send_json(req).await?;
        Ok(serde_json::from_value(unwrap_data(json))?)
    }

    pub async fn update_profile(&self, id: UserId, update: &ProfileUpdate) -> Result<Profile, ApiError> {
        let req = self.http.put(self.endpoint(&format!("users/{id}"))).json(update);
        let json = self.send_json(req).await?;
        Ok(serde_json::from_value(unwrap_data(json))?)
    }
}

impl ChatBackend for ApiClient {
    async fn list_conversations(&self, me: UserId) -> Result<Vec<Conversation>, ApiError> {
        self.fetch_conversations(me).await
    }

    async fn history(&self, me: UserId, peer: UserId) -> Result<Vec<ChatMessage>, ApiError> {
        self.fetch_history(me, peer).await
    }

    async fn send_message(&self, msg: &OutgoingMessage) -> Result<Option<String>, ApiError> {
        self.post_message(msg).await
    }

    async fn create_conversation(&self, me: UserId, peer: UserId) -> Result<Conversation, ApiError> {
        self.post_conversation(me, peer).await
    }
}

/// Single records may come wrapped in `data`.
fn unwrap_data(json: Value) -> Value {
    match json {
        Value::Object(mut map) if map.get("data").is_some_and(Value::is_object) => {
            map.remove("data").unwrap_or(Value::Null)
        }
        other => other,
    }
}

/// Lists come bare, or under `data`, `items` or an endpoint-specific key.
/// Entries that do not decode are skipped.
fn decode_items<T: DeserializeOwned>(json: Value, extra_keys: &[&str]) -> Vec<T> {
    let items = match json {
        Value::Array(arr) => arr,
        Value::Object(mut map) => ["data", "items"]
            .iter()
            .chain(extra_keys)
            .find_map(|k| match map.remove(*k) {
                Some(Value::Array(arr)) => Some(arr),
                _ => None,
            })
            .unwrap_or_default(),
        _ => Vec::new(),
    };
    items
        .into_iter()
        .filter_map(|item| match serde_json::from_value(item) {
            Ok(v) => Some(v),
            Err(e) => {
                log::warn!("skipping malformed entry: {e}");
                None
            }
        })
        .collect()
}
