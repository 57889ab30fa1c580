//! HTTP implementation of the remote API.
//!
//! The actual HTTP client is abstracted via a trait so hosts can plug in
//! whichever library their platform provides (reqwest, hyper, a webview
//! bridge). Request and response bodies are JSON. Session credentials
//! (cookies) are the client implementation's concern.

use crate::error::{SyncError, SyncResult};
use crate::remote::{CardPage, NewCard, RemoteApi};
use async_trait::async_trait;
use lexika_types::{CardRecord, LanguageRecord, RecordId};
use serde::de::DeserializeOwned;
use serde::Serialize;

/// HTTP method.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    /// GET
    Get,
    /// POST
    Post,
    /// PUT
    Put,
    /// DELETE
    Delete,
}

impl Method {
    /// Returns the method name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
        }
    }
}

/// A raw HTTP response.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    /// Status code.
    pub status: u16,
    /// Response body.
    pub body: String,
}

/// HTTP client abstraction.
///
/// Implement this trait to provide the actual transport. Errors returned
/// here are treated as retryable network failures.
#[async_trait]
pub trait HttpClient: Send + Sync {
    /// Sends a request and returns the response.
    async fn request(
        &self,
        method: Method,
        url: &str,
        body: Option<String>,
    ) -> Result<HttpResponse, String>;
}

/// A [`RemoteApi`] over an HTTP client.
pub struct HttpRemote<C: HttpClient> {
    base_url: String,
    client: C,
}

impl<C: HttpClient> HttpRemote<C> {
    /// Creates a remote rooted at the given base URL.
    pub fn new(base_url: impl Into<String>, client: C) -> Self {
        Self {
            base_url: base_url.into(),
            client,
        }
    }

    /// Returns the base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn send(
        &self,
        method: Method,
        path: &str,
        body: Option<String>,
    ) -> SyncResult<HttpResponse> {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .client
            .request(method, &url, body)
            .await
            .map_err(SyncError::transport_retryable)?;

        match response.status {
            200..=299 => Ok(response),
            401 | 403 => Err(SyncError::Unauthorized(response.body)),
            status => Err(SyncError::RemoteRejected {
                status,
                body: response.body,
            }),
        }
    }

    async fn fetch_json<T: DeserializeOwned>(&self, path: &str) -> SyncResult<T> {
        let response = self.send(Method::Get, path, None).await?;
        decode(&response.body)
    }

    async fn send_json<B: Serialize, T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: &B,
    ) -> SyncResult<T> {
        let encoded = serde_json::to_string(body)
            .map_err(|e| SyncError::Protocol(format!("failed to encode request: {e}")))?;
        let response = self.send(method, path, Some(encoded)).await?;
        decode(&response.body)
    }
}

fn decode<T: DeserializeOwned>(body: &str) -> SyncResult<T> {
    serde_json::from_str(body)
        .map_err(|e| SyncError::Protocol(format!("failed to decode response: {e}")))
}

#[async_trait]
impl<C: HttpClient> RemoteApi for HttpRemote<C> {
    async fn list_cards(&self, limit: usize, skip: usize) -> SyncResult<CardPage> {
        self.fetch_json(&format!("/cards?limit={limit}&skip={skip}")).await
    }

    async fn list_all_cards(&self) -> SyncResult<Vec<CardRecord>> {
        self.fetch_json("/cards").await
    }

    async fn create_card(&self, card: &NewCard) -> SyncResult<CardRecord> {
        self.send_json(Method::Post, "/cards", card).await
    }

    async fn update_card(&self, card: &CardRecord) -> SyncResult<CardRecord> {
        self.send_json(Method::Put, &format!("/cards/{}", card.id), card).await
    }

    async fn delete_card(&self, id: &RecordId) -> SyncResult<()> {
        self.send(Method::Delete, &format!("/cards/{id}"), None).await?;
        Ok(())
    }

    async fn list_languages(&self) -> SyncResult<Vec<LanguageRecord>> {
        self.fetch_json("/languages").await
    }

    async fn create_language(&self, language: &LanguageRecord) -> SyncResult<LanguageRecord> {
        self.send_json(Method::Post, "/languages", language).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct TestClient {
        response: Mutex<Option<Result<HttpResponse, String>>>,
        last_request: Mutex<Option<(Method, String, Option<String>)>>,
    }

    impl TestClient {
        fn respond(&self, status: u16, body: &str) {
            *self.response.lock() = Some(Ok(HttpResponse {
                status,
                body: body.into(),
            }));
        }

        fn fail(&self, message: &str) {
            *self.response.lock() = Some(Err(message.into()));
        }

        fn last_request(&self) -> (Method, String, Option<String>) {
            self.last_request.lock().clone().unwrap()
        }
    }

    #[async_trait]
    impl HttpClient for TestClient {
        async fn request(
            &self,
            method: Method,
            url: &str,
            body: Option<String>,
        ) -> Result<HttpResponse, String> {
            *self.last_request.lock() = Some((method, url.to_owned(), body));
            self.response.lock().clone().unwrap_or(Err("no response set".into()))
        }
    }

    fn remote_with(client: TestClient) -> HttpRemote<TestClient> {
        HttpRemote::new("https://api.example.com", client)
    }

    #[tokio::test]
    async fn list_cards_builds_paginated_url() {
        let client = TestClient::default();
        client.respond(200, r#"{"records": [], "total": 23}"#);
        let remote = remote_with(client);

        let page = remote.list_cards(10, 0).await.unwrap();
        assert_eq!(page.total, 23);

        let (method, url, body) = remote.client.last_request();
        assert_eq!(method, Method::Get);
        assert_eq!(url, "https://api.example.com/cards?limit=10&skip=0");
        assert!(body.is_none());
    }

    #[tokio::test]
    async fn delete_targets_record_path() {
        let client = TestClient::default();
        client.respond(204, "");
        let remote = remote_with(client);

        remote.delete_card(&RecordId::new("srv-7")).await.unwrap();
        let (method, url, _) = remote.client.last_request();
        assert_eq!(method, Method::Delete);
        assert_eq!(url, "https://api.example.com/cards/srv-7");
    }

    #[tokio::test]
    async fn non_2xx_is_rejected_with_body() {
        let client = TestClient::default();
        client.respond(500, "boom");
        let remote = remote_with(client);

        let err = remote.list_all_cards().await.unwrap_err();
        match err {
            SyncError::RemoteRejected { status, body } => {
                assert_eq!(status, 500);
                assert_eq!(body, "boom");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn auth_errors_map_to_unauthorized() {
        let client = TestClient::default();
        client.respond(401, "session expired");
        let remote = remote_with(client);

        let err = remote.list_all_cards().await.unwrap_err();
        assert!(matches!(err, SyncError::Unauthorized(_)));
    }

    #[tokio::test]
    async fn client_errors_are_retryable_transport() {
        let client = TestClient::default();
        client.fail("connection refused");
        let remote = remote_with(client);

        let err = remote.list_all_cards().await.unwrap_err();
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn malformed_body_is_a_protocol_error() {
        let client = TestClient::default();
        client.respond(200, "not json");
        let remote = remote_with(client);

        let err = remote.list_all_cards().await.unwrap_err();
        assert!(matches!(err, SyncError::Protocol(_)));
    }
}
