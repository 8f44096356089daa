//! Session gateway adapter (reqwest).
//!
//! Implements the `scout-core` directory search port over a small HTTP/JSON
//! gateway that owns the actual MTProto connections. One gateway session maps
//! to one account session file.
//!
//! Endpoints (all JSON):
//! - `POST   /v1/sessions`                  open a session
//! - `POST   /v1/sessions/{id}/search`      public directory search
//! - `POST   /v1/sessions/{id}/participants` member total (channels)
//! - `POST   /v1/sessions/{id}/full`        full entity info
//! - `DELETE /v1/sessions/{id}`             close
//!
//! Failures come back as `{"error": "<RPC_ERROR_NAME>", "seconds": <n>?}`.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;

use scout_core::{
    domain::{Entity, EntityFlags, EntityKind},
    errors::{ClientError, Error},
    ports::{DirectoryConnector, DirectorySession, SessionSpec},
    proxy::ProxyDescriptor,
    Result,
};

mod errors;

pub use errors::{classify_rpc_error, classify_status};

#[derive(Clone, Debug)]
pub struct GatewayConnector {
    base_url: String,
    http: reqwest::Client,
}

impl GatewayConnector {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent("scout/0.1")
            .build()
            .map_err(|e| Error::External(format!("http client build failed: {e}")))?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http,
        })
    }
}

impl DirectoryConnector for GatewayConnector {
    fn session(&self, spec: SessionSpec) -> Box<dyn DirectorySession> {
        Box::new(GatewaySession {
            base_url: self.base_url.clone(),
            http: self.http.clone(),
            spec,
            session_id: None,
        })
    }
}

pub struct GatewaySession {
    base_url: String,
    http: reqwest::Client,
    spec: SessionSpec,
    session_id: Option<String>,
}

#[derive(Debug, Serialize)]
struct OpenRequest<'a> {
    session_path: String,
    api_id: i64,
    api_hash: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    proxy: Option<&'a ProxyDescriptor>,
}

#[derive(Debug, Deserialize)]
struct OpenResponse {
    session_id: String,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    chats: Vec<GatewayChat>,
}

/// Chat-like object as the gateway reports it.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct GatewayChat {
    #[serde(default)]
    pub id: Option<i64>,
    /// `channel`, `chat`, `user`, ...
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub broadcast: bool,
    #[serde(default)]
    pub megagroup: bool,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default, alias = "members_count")]
    pub participants_count: Option<u64>,
}

impl From<GatewayChat> for Entity {
    fn from(c: GatewayChat) -> Self {
        let kind = EntityKind::classify(EntityFlags {
            channel: c.kind == "channel",
            broadcast: c.broadcast,
            megagroup: c.megagroup,
            basic_group: c.kind == "chat",
        });
        Entity {
            kind,
            id: c.id,
            title: c.title.filter(|t| !t.trim().is_empty()).or(c.name),
            username: c.username,
            participants_hint: c.participants_count,
        }
    }
}

#[derive(Debug, Deserialize)]
struct CountResponse {
    #[serde(default, alias = "participants_count", alias = "participant_count")]
    count: Option<u64>,
}

fn peer_json(entity: &Entity) -> Option<serde_json::Value> {
    let id = entity.id?;
    let kind = match entity.kind {
        EntityKind::Channel | EntityKind::Megagroup => "channel",
        EntityKind::Chat => "chat",
        EntityKind::Other => return None,
    };
    Some(json!({ "id": id, "type": kind }))
}

impl GatewaySession {
    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn session_url(&self, suffix: &str) -> std::result::Result<String, ClientError> {
        let id = self
            .session_id
            .as_deref()
            .ok_or_else(|| ClientError::Unexpected("client not started".to_string()))?;
        Ok(self.url(&format!("/v1/sessions/{id}{suffix}")))
    }

    async fn post_json<T: serde::de::DeserializeOwned>(
        &self,
        url: &str,
        body: &(impl Serialize + Sync),
    ) -> std::result::Result<T, ClientError> {
        let resp = self
            .http
            .post(url)
            .json(body)
            .send()
            .await
            .map_err(|e| ClientError::Transient(format!("gateway request error: {e}")))?;

        let status = resp.status();
        if !status.is_success() {
            let retry_after = resp
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<u64>().ok());
            let body: serde_json::Value = resp.json().await.unwrap_or(serde_json::Value::Null);
            return Err(classify_status(status.as_u16(), &body, retry_after));
        }

        resp.json::<T>()
            .await
            .map_err(|e| ClientError::Unexpected(format!("gateway json error: {e}")))
    }

    async fn count_via(&self, suffix: &str, peer: &serde_json::Value) -> Option<u64> {
        let url = self.session_url(suffix).ok()?;
        match self
            .post_json::<CountResponse>(&url, &json!({ "peer": peer }))
            .await
        {
            Ok(r) => r.count,
            Err(e) => {
                tracing::debug!(endpoint = suffix, "participant count lookup failed: {e}");
                None
            }
        }
    }
}

#[async_trait]
impl DirectorySession for GatewaySession {
    async fn connect(&mut self) -> std::result::Result<(), ClientError> {
        let body = OpenRequest {
            session_path: self.spec.session_path.display().to_string(),
            api_id: self.spec.credentials.api_id,
            api_hash: &self.spec.credentials.api_hash,
            proxy: self.spec.proxy.as_ref(),
        };
        let opened: OpenResponse = self.post_json(&self.url("/v1/sessions"), &body).await?;
        tracing::debug!(session = %opened.session_id, "gateway session opened");
        self.session_id = Some(opened.session_id);
        Ok(())
    }

    async fn disconnect(&mut self) {
        let Some(id) = self.session_id.take() else {
            return;
        };
        let url = self.url(&format!("/v1/sessions/{id}"));
        if let Err(e) = self.http.delete(url).send().await {
            tracing::debug!("disconnect failed (ignored): {e}");
        }
    }

    async fn search(
        &self,
        query: &str,
        limit: usize,
    ) -> std::result::Result<Vec<Entity>, ClientError> {
        let url = self.session_url("/search")?;
        let resp: SearchResponse = self
            .post_json(&url, &json!({ "q": query, "limit": limit }))
            .await?;
        Ok(resp.chats.into_iter().map(Entity::from).collect())
    }

    /// Channels: participants total first, then full info. Basic groups: full
    /// info. Falls back to the count carried on the search hit.
    async fn participant_count(&self, entity: &Entity) -> Option<u64> {
        let Some(peer) = peer_json(entity) else {
            return entity.participants_hint;
        };

        if matches!(entity.kind, EntityKind::Channel | EntityKind::Megagroup) {
            if let Some(n) = self.count_via("/participants", &peer).await {
                return Some(n);
            }
        }
        if let Some(n) = self.count_via("/full", &peer).await {
            return Some(n);
        }
        entity.participants_hint
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scout_core::domain::Credentials;
    use std::path::PathBuf;

    fn session(id: Option<&str>) -> GatewaySession {
        session_at("http://gw.local:8081/", id)
    }

    fn session_at(base_url: &str, id: Option<&str>) -> GatewaySession {
        let connector = GatewayConnector::new(base_url, Duration::from_secs(5)).unwrap();
        GatewaySession {
            base_url: connector.base_url.clone(),
            http: connector.http.clone(),
            spec: SessionSpec {
                session_path: PathBuf::from("/acc/a.session"),
                credentials: Credentials {
                    api_id: 1,
                    api_hash: "h".to_string(),
                },
                proxy: None,
            },
            session_id: id.map(str::to_string),
        }
    }

    #[test]
    fn gateway_chats_are_classified_once() {
        let raw = serde_json::json!({
            "chats": [
                {"id": 1, "type": "channel", "broadcast": true, "title": "News", "username": "news"},
                {"id": 2, "type": "channel", "megagroup": true, "title": "Talk", "members_count": 40},
                {"id": 3, "type": "chat", "name": "Old group"},
                {"id": 4, "type": "user"},
                {"id": 5, "type": "chat", "title": "  ", "name": "Named"}
            ]
        });
        let resp: SearchResponse = serde_json::from_value(raw).unwrap();
        let entities: Vec<Entity> = resp.chats.into_iter().map(Entity::from).collect();

        assert_eq!(entities[0].kind, EntityKind::Channel);
        assert_eq!(entities[0].public_link().as_deref(), Some("https://t.me/news"));
        assert_eq!(entities[1].kind, EntityKind::Megagroup);
        assert_eq!(entities[1].participants_hint, Some(40));
        assert_eq!(entities[2].kind, EntityKind::Chat);
        assert_eq!(entities[2].display_title(), "Old group");
        assert_eq!(entities[3].kind, EntityKind::Other);
        assert_eq!(entities[4].display_title(), "Named");
    }

    #[test]
    fn peers_exist_only_for_chat_like_entities() {
        let mut e: Entity = GatewayChat {
            id: Some(5),
            kind: "channel".to_string(),
            megagroup: true,
            ..Default::default()
        }
        .into();
        assert_eq!(peer_json(&e), Some(json!({"id": 5, "type": "channel"})));

        e.kind = EntityKind::Other;
        assert_eq!(peer_json(&e), None);
    }

    #[test]
    fn urls_are_built_from_trimmed_base() {
        let s = session(Some("abc"));
        assert_eq!(s.url("/v1/sessions"), "http://gw.local:8081/v1/sessions");
        assert_eq!(
            s.session_url("/search").unwrap(),
            "http://gw.local:8081/v1/sessions/abc/search"
        );
    }

    #[test]
    fn calls_before_connect_are_unexpected() {
        let s = session(None);
        assert!(matches!(
            s.session_url("/search"),
            Err(ClientError::Unexpected(_))
        ));
    }

    #[test]
    fn open_request_omits_missing_proxy() {
        let body = OpenRequest {
            session_path: "/acc/a.session".to_string(),
            api_id: 9,
            api_hash: "h",
            proxy: None,
        };
        let v = serde_json::to_value(&body).unwrap();
        assert!(v.get("proxy").is_none());

        let proxy: ProxyDescriptor = "socks5://u:p@1.2.3.4:9000".parse().unwrap();
        let body = OpenRequest {
            proxy: Some(&proxy),
            ..body
        };
        let v = serde_json::to_value(&body).unwrap();
        assert_eq!(v["proxy"]["scheme"], "socks5");
        assert_eq!(v["proxy"]["port"], 9000);
        assert_eq!(v["proxy"]["username"], "u");
    }

    fn channel(id: i64, hint: Option<u64>) -> Entity {
        Entity {
            kind: EntityKind::Channel,
            id: Some(id),
            title: Some("c".to_string()),
            username: None,
            participants_hint: hint,
        }
    }

    #[tokio::test]
    async fn connect_opens_and_disconnect_closes_once() {
        let mut server = mockito::Server::new_async().await;
        let open = server
            .mock("POST", "/v1/sessions")
            .match_body(mockito::Matcher::PartialJson(
                json!({"session_path": "/acc/a.session", "api_id": 1}),
            ))
            .with_header("content-type", "application/json")
            .with_body(r#"{"session_id": "s9"}"#)
            .create_async()
            .await;
        let close = server
            .mock("DELETE", "/v1/sessions/s9")
            .expect(1)
            .create_async()
            .await;

        let mut s = session_at(&server.url(), None);
        s.connect().await.unwrap();
        assert_eq!(s.session_id.as_deref(), Some("s9"));
        s.disconnect().await;
        s.disconnect().await;

        open.assert_async().await;
        close.assert_async().await;
    }

    #[tokio::test]
    async fn search_sends_query_and_limit() {
        let mut server = mockito::Server::new_async().await;
        let search = server
            .mock("POST", "/v1/sessions/s1/search")
            .match_body(mockito::Matcher::Json(json!({"q": "rust", "limit": 5})))
            .with_header("content-type", "application/json")
            .with_body(r#"{"chats": [{"id": 7, "type": "channel", "broadcast": true, "username": "rs"}]}"#)
            .create_async()
            .await;

        let s = session_at(&server.url(), Some("s1"));
        let found = s.search("rust", 5).await.unwrap();

        search.assert_async().await;
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].kind, EntityKind::Channel);
        assert_eq!(found[0].public_link().as_deref(), Some("https://t.me/rs"));
    }

    #[tokio::test]
    async fn participants_failure_falls_through_to_full_info() {
        let mut server = mockito::Server::new_async().await;
        let participants = server
            .mock("POST", "/v1/sessions/s1/participants")
            .with_status(400)
            .with_header("content-type", "application/json")
            .with_body(r#"{"error": "CHAT_ADMIN_REQUIRED"}"#)
            .expect(1)
            .create_async()
            .await;
        let full = server
            .mock("POST", "/v1/sessions/s1/full")
            .match_body(mockito::Matcher::Json(
                json!({"peer": {"id": 3, "type": "channel"}}),
            ))
            .with_header("content-type", "application/json")
            .with_body(r#"{"participants_count": 77}"#)
            .expect(1)
            .create_async()
            .await;

        let s = session_at(&server.url(), Some("s1"));
        assert_eq!(s.participant_count(&channel(3, Some(5))).await, Some(77));

        participants.assert_async().await;
        full.assert_async().await;
    }

    #[tokio::test]
    async fn both_lookups_failing_fall_back_to_the_hint() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/v1/sessions/s1/participants")
            .with_status(500)
            .create_async()
            .await;
        server
            .mock("POST", "/v1/sessions/s1/full")
            .with_status(403)
            .with_header("content-type", "application/json")
            .with_body(r#"{"error": "CHANNEL_PRIVATE"}"#)
            .create_async()
            .await;

        let s = session_at(&server.url(), Some("s1"));
        assert_eq!(s.participant_count(&channel(3, Some(12))).await, Some(12));
        assert_eq!(s.participant_count(&channel(3, None)).await, None);
    }

    #[tokio::test]
    async fn basic_groups_skip_the_participants_endpoint() {
        let mut server = mockito::Server::new_async().await;
        let participants = server
            .mock("POST", "/v1/sessions/s1/participants")
            .expect(0)
            .create_async()
            .await;
        let full = server
            .mock("POST", "/v1/sessions/s1/full")
            .match_body(mockito::Matcher::Json(json!({"peer": {"id": 4, "type": "chat"}})))
            .with_header("content-type", "application/json")
            .with_body(r#"{"count": 6}"#)
            .create_async()
            .await;

        let group = Entity {
            kind: EntityKind::Chat,
            ..channel(4, None)
        };
        let s = session_at(&server.url(), Some("s1"));
        assert_eq!(s.participant_count(&group).await, Some(6));

        participants.assert_async().await;
        full.assert_async().await;
    }

    #[tokio::test]
    async fn throttled_responses_become_rate_limits() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/v1/sessions/s1/search")
            .with_status(429)
            .with_header("retry-after", "7")
            .create_async()
            .await;

        let s = session_at(&server.url(), Some("s1"));
        assert_eq!(
            s.search("q", 1).await,
            Err(ClientError::RateLimited {
                wait: Duration::from_secs(7)
            })
        );
    }

    #[tokio::test]
    async fn error_bodies_are_classified() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/v1/sessions/s1/search")
            .with_status(401)
            .with_header("content-type", "application/json")
            .with_body(r#"{"error": "AUTH_KEY_UNREGISTERED"}"#)
            .create_async()
            .await;

        let s = session_at(&server.url(), Some("s1"));
        assert_eq!(s.search("q", 1).await, Err(ClientError::AuthKeyInvalid));
    }
}
