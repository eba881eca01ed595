//! Firestore REST v1 adapter
//!
//! Speaks the public REST surface of Cloud Firestore (or the local emulator):
//!
//! - `GET    {name}` / `POST {parent}:runQuery` for reads
//! - `POST   {database}/documents:commit` for writes
//! - `POST   {database}/documents:beginTransaction` / `:rollback`
//!
//! The REST surface has no push channel, so [`RestStore::listen`] polls the
//! target every `Settings::listen_poll_interval` and yields a new result set
//! only when it differs from the previous one. Transient polling failures are
//! retried up to `Settings::listen_max_retries` times in a row before the
//! error is reported on the feed.

use super::document::{Document, DocumentPath};
use super::query::Query;
use super::settings::{Settings, TransactionOptions};
use super::value::Fields;
use super::{DocumentFeed, DocumentStore, ListenTarget, TransactionId, Write};
use crate::error::{EatsError, EatsResult};
use async_stream::stream;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use reqwest::{Method, RequestBuilder, StatusCode};
use serde::de::{DeserializeOwned, IgnoredAny};
use serde::Deserialize;
use serde_json::json;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Document as returned by the REST API
#[derive(Debug, Deserialize)]
struct RestDocument {
    name: String,
    #[serde(default)]
    fields: Fields,
}

/// One element of a `runQuery` response array
#[derive(Debug, Deserialize)]
struct RunQueryResponse {
    document: Option<RestDocument>,
}

#[derive(Debug, Deserialize)]
struct BeginTransactionResponse {
    transaction: String,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: ErrorStatus,
}

#[derive(Debug, Deserialize)]
struct ErrorStatus {
    #[serde(default)]
    message: String,
    #[serde(default)]
    status: String,
}

struct RestInner {
    settings: Settings,
    http: reqwest::Client,
}

/// REST-backed [`DocumentStore`]
#[derive(Clone)]
pub struct RestStore {
    inner: Arc<RestInner>,
}

impl RestStore {
    /// Create a store client from settings
    ///
    /// No request is made until the first operation.
    pub fn new(settings: Settings) -> EatsResult<Self> {
        if settings.project_id.is_empty() {
            return Err(EatsError::invalid_argument("project id must not be empty"));
        }

        let http = reqwest::Client::builder()
            .timeout(settings.request_timeout)
            .build()
            .map_err(|e| EatsError::internal(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            inner: Arc::new(RestInner { settings, http }),
        })
    }

    /// Settings in use
    pub fn settings(&self) -> &Settings {
        &self.inner.settings
    }

    /// `projects/{p}/databases/{d}/documents`
    fn documents_root(&self) -> String {
        format!("{}/documents", self.inner.settings.database_path())
    }

    /// Full resource name of a document
    fn document_name(&self, path: &DocumentPath) -> String {
        format!("{}/{}", self.documents_root(), path)
    }

    /// Strip the resource prefix from a document name
    fn relative_path(&self, name: &str) -> EatsResult<DocumentPath> {
        let prefix = format!("{}/", self.documents_root());
        let Some(relative) = name.strip_prefix(&prefix) else {
            return Err(EatsError::internal(format!(
                "document name {:?} is outside database {}",
                name,
                self.inner.settings.database_path()
            )));
        };
        DocumentPath::new(relative)
    }

    fn url(&self, resource: &str) -> String {
        format!("{}/v1/{}", self.inner.settings.host.trim_end_matches('/'), resource)
    }

    fn request(&self, method: Method, resource: &str) -> RequestBuilder {
        let mut builder = self.inner.http.request(method, self.url(resource));
        if let Some(token) = &self.inner.settings.id_token {
            builder = builder.bearer_auth(token);
        }
        if let Some(key) = &self.inner.settings.api_key {
            builder = builder.query(&[("key", key)]);
        }
        builder
    }

    /// Send a request and decode the JSON response
    ///
    /// Returns `Ok(None)` on 404 so callers can treat absence as data.
    async fn send<T: DeserializeOwned>(&self, builder: RequestBuilder) -> EatsResult<Option<T>> {
        let response = builder.send().await.map_err(transport_error)?;
        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            let body = response.text().await.map_err(transport_error)?;
            return Err(error_from_response(status, &body));
        }
        Ok(Some(response.json::<T>().await.map_err(transport_error)?))
    }

    /// Like `send`, but 404 is an error
    async fn send_expecting<T: DeserializeOwned>(
        &self,
        builder: RequestBuilder,
        what: &str,
    ) -> EatsResult<T> {
        self.send(builder)
            .await?
            .ok_or_else(|| EatsError::not_found(what.to_string()))
    }

    fn encode_write(&self, write: &Write) -> serde_json::Value {
        match write {
            Write::Set { path, fields } => json!({
                "update": { "name": self.document_name(path), "fields": fields },
            }),
            Write::Update { path, fields } => json!({
                "update": { "name": self.document_name(path), "fields": fields },
                "updateMask": { "fieldPaths": fields.keys().collect::<Vec<_>>() },
                "currentDocument": { "exists": true },
            }),
        }
    }

    fn decode_document(&self, raw: RestDocument) -> EatsResult<Document> {
        Ok(Document::new(self.relative_path(&raw.name)?, raw.fields))
    }

    async fn read_document(
        &self,
        path: &DocumentPath,
        transaction: Option<&TransactionId>,
    ) -> EatsResult<Option<Document>> {
        let mut builder = self.request(Method::GET, &self.document_name(path));
        if let Some(transaction) = transaction {
            builder = builder.query(&[("transaction", BASE64.encode(&transaction.0))]);
        }
        match self.send::<RestDocument>(builder).await? {
            Some(raw) => Ok(Some(self.decode_document(raw)?)),
            None => Ok(None),
        }
    }

    async fn post_commit(&self, body: serde_json::Value) -> EatsResult<()> {
        let resource = format!("{}/documents:commit", self.inner.settings.database_path());
        self.send_expecting::<IgnoredAny>(self.request(Method::POST, &resource).json(&body), "commit")
            .await?;
        Ok(())
    }

    async fn fetch_target(&self, target: &ListenTarget) -> EatsResult<Vec<Document>> {
        match target {
            ListenTarget::Query(query) => self.run_query(query).await,
            ListenTarget::Document(path) => Ok(self.read_document(path, None).await?.into_iter().collect()),
        }
    }
}

fn transport_error(e: reqwest::Error) -> EatsError {
    if e.is_connect() || e.is_timeout() {
        EatsError::StoreUnavailable(e.to_string())
    } else {
        EatsError::Network(e)
    }
}

/// Map a non-success response to an error
///
/// Firestore returns `{"error": {...}}` for most calls and `[{"error": {...}}]`
/// for streaming ones such as `runQuery`.
fn error_from_response(status: StatusCode, body: &str) -> EatsError {
    let parsed = serde_json::from_str::<ErrorBody>(body).ok().or_else(|| {
        serde_json::from_str::<Vec<ErrorBody>>(body)
            .ok()
            .and_then(|mut bodies| bodies.pop())
    });

    if let Some(ErrorBody { error }) = parsed {
        if !error.status.is_empty() {
            return EatsError::from_status(&error.status, error.message);
        }
    }

    match status {
        StatusCode::CONFLICT => EatsError::Aborted(body.to_string()),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => EatsError::PermissionDenied(body.to_string()),
        StatusCode::BAD_REQUEST => EatsError::InvalidArgument(body.to_string()),
        StatusCode::TOO_MANY_REQUESTS | StatusCode::SERVICE_UNAVAILABLE | StatusCode::GATEWAY_TIMEOUT => {
            EatsError::StoreUnavailable(format!("HTTP {}", status))
        }
        _ => EatsError::internal(format!("HTTP {}: {}", status, body)),
    }
}

impl DocumentStore for RestStore {
    fn transaction_options(&self) -> TransactionOptions {
        self.inner.settings.transaction.clone()
    }

    async fn run_query(&self, query: &Query) -> EatsResult<Vec<Document>> {
        let parent = match query.collection().parent() {
            Some(doc) => self.document_name(&doc),
            None => self.documents_root(),
        };
        let body = json!({ "structuredQuery": query.to_structured_query() });
        debug!(collection = %query.collection(), "running query");

        let responses: Vec<RunQueryResponse> = self
            .send_expecting(
                self.request(Method::POST, &format!("{}:runQuery", parent)).json(&body),
                query.collection().as_str(),
            )
            .await?;

        responses
            .into_iter()
            .filter_map(|r| r.document)
            .map(|raw| self.decode_document(raw))
            .collect()
    }

    async fn get_document(&self, path: &DocumentPath) -> EatsResult<Option<Document>> {
        self.read_document(path, None).await
    }

    async fn commit(&self, writes: Vec<Write>) -> EatsResult<()> {
        if writes.is_empty() {
            return Ok(());
        }
        let encoded: Vec<serde_json::Value> = writes.iter().map(|w| self.encode_write(w)).collect();
        self.post_commit(json!({ "writes": encoded })).await
    }

    async fn begin_transaction(&self) -> EatsResult<TransactionId> {
        let resource = format!("{}/documents:beginTransaction", self.inner.settings.database_path());
        let body = json!({ "options": { "readWrite": {} } });
        let response: BeginTransactionResponse = self
            .send_expecting(self.request(Method::POST, &resource).json(&body), "beginTransaction")
            .await?;
        let bytes = BASE64
            .decode(response.transaction.as_bytes())
            .map_err(|e| EatsError::internal(format!("invalid transaction id: {}", e)))?;
        Ok(TransactionId(bytes))
    }

    async fn get_in_transaction(
        &self,
        transaction: &TransactionId,
        path: &DocumentPath,
    ) -> EatsResult<Option<Document>> {
        self.read_document(path, Some(transaction)).await
    }

    async fn commit_transaction(
        &self,
        transaction: TransactionId,
        writes: Vec<Write>,
    ) -> EatsResult<()> {
        let encoded: Vec<serde_json::Value> = writes.iter().map(|w| self.encode_write(w)).collect();
        self.post_commit(json!({
            "writes": encoded,
            "transaction": BASE64.encode(&transaction.0),
        }))
        .await
    }

    async fn rollback(&self, transaction: TransactionId) -> EatsResult<()> {
        let resource = format!("{}/documents:rollback", self.inner.settings.database_path());
        let body = json!({ "transaction": BASE64.encode(&transaction.0) });
        self.send::<IgnoredAny>(self.request(Method::POST, &resource).json(&body))
            .await?;
        Ok(())
    }

    async fn listen(&self, target: ListenTarget) -> EatsResult<DocumentFeed> {
        // The first read doubles as setup: failures surface to the caller
        let initial = self.fetch_target(&target).await?;
        let store = self.clone();
        let settings = &self.inner.settings;
        Ok(poll_feed(
            initial,
            settings.listen_poll_interval,
            settings.listen_max_retries,
            move || {
                let store = store.clone();
                let target = target.clone();
                async move { store.fetch_target(&target).await }
            },
        ))
    }
}

/// Delay before the next poll after `failures` consecutive transient failures
///
/// The interval doubles per failure.
fn poll_delay(interval: Duration, failures: u32) -> Duration {
    interval.saturating_mul(1u32 << failures.min(16))
}

/// Change feed built by re-running `fetch` on an interval
///
/// `initial` is yielded first; later results are yielded only when they
/// differ from the previous one. Retryable errors are retried silently with
/// a growing delay until `max_retries` occur in a row. The next error, or any
/// non-retryable one, is yielded and the feed ends.
fn poll_feed<F, Fut>(initial: Vec<Document>, interval: Duration, max_retries: u32, mut fetch: F) -> DocumentFeed
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = EatsResult<Vec<Document>>> + Send + 'static,
{
    let feed = stream! {
        let mut last = initial;
        yield Ok(last.clone());

        let mut failures = 0u32;
        loop {
            tokio::time::sleep(poll_delay(interval, failures)).await;
            match fetch().await {
                Ok(current) => {
                    failures = 0;
                    if current != last {
                        last = current;
                        yield Ok(last.clone());
                    }
                }
                Err(e) if e.is_retryable() && failures < max_retries => {
                    failures += 1;
                    warn!(error = %e, failures, "live query poll failed, retrying");
                }
                Err(e) => {
                    yield Err(e);
                    break;
                }
            }
        }
    };
    Box::pin(feed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::fields;
    use crate::store::value::Value;

    fn store() -> RestStore {
        RestStore::new(Settings::new("friendly-eats")).unwrap()
    }

    #[test]
    fn test_transaction_options_come_from_settings() {
        let mut settings = Settings::new("friendly-eats");
        settings.transaction.max_attempts = 1;
        let store = RestStore::new(settings).unwrap();
        assert_eq!(store.transaction_options().max_attempts, 1);
    }

    fn restaurant_doc(id: &str) -> Document {
        Document::new(
            DocumentPath::new(format!("restaurants/{}", id)).unwrap(),
            fields([("name", Value::from(id))]),
        )
    }

    /// Fetch closure replaying `script`, counting calls
    fn scripted(
        script: Vec<EatsResult<Vec<Document>>>,
    ) -> (
        Arc<std::sync::atomic::AtomicUsize>,
        impl FnMut() -> futures::future::Ready<EatsResult<Vec<Document>>> + Send + 'static,
    ) {
        let calls = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let mut script = std::collections::VecDeque::from(script);
        let fetch = move || {
            counter.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            futures::future::ready(script.pop_front().unwrap_or_else(|| Ok(Vec::new())))
        };
        (calls, fetch)
    }

    #[test]
    fn test_poll_delay_doubles() {
        let interval = Duration::from_millis(100);
        assert_eq!(poll_delay(interval, 0), interval);
        assert_eq!(poll_delay(interval, 1), Duration::from_millis(200));
        assert_eq!(poll_delay(interval, 3), Duration::from_millis(800));
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_feed_retries_transient_failures_with_backoff() {
        use futures::StreamExt;

        let interval = Duration::from_secs(1);
        let (calls, fetch) = scripted(vec![
            Err(EatsError::StoreUnavailable("down".to_string())),
            Err(EatsError::StoreUnavailable("down".to_string())),
            Ok(vec![restaurant_doc("a")]),
        ]);
        let mut feed = poll_feed(Vec::new(), interval, 3, fetch);

        assert_eq!(feed.next().await.unwrap().unwrap(), Vec::new());
        let started = tokio::time::Instant::now();
        assert_eq!(feed.next().await.unwrap().unwrap(), vec![restaurant_doc("a")]);
        // 1s, then 2s and 4s after each failure
        assert!(started.elapsed() >= Duration::from_secs(7));
        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_feed_reports_error_after_max_retries() {
        use futures::StreamExt;

        let (calls, fetch) = scripted(
            (0..4)
                .map(|_| Err(EatsError::StoreUnavailable("down".to_string())))
                .collect(),
        );
        let mut feed = poll_feed(Vec::new(), Duration::from_millis(10), 2, fetch);

        assert!(feed.next().await.unwrap().is_ok());
        let err = feed.next().await.unwrap().unwrap_err();
        assert!(matches!(err, EatsError::StoreUnavailable(_)));
        assert!(feed.next().await.is_none());
        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_feed_does_not_retry_permanent_errors() {
        use futures::StreamExt;

        let (calls, fetch) = scripted(vec![Err(EatsError::PermissionDenied("no".to_string()))]);
        let mut feed = poll_feed(Vec::new(), Duration::from_millis(10), 5, fetch);

        assert!(feed.next().await.unwrap().is_ok());
        let err = feed.next().await.unwrap().unwrap_err();
        assert!(matches!(err, EatsError::PermissionDenied(_)));
        assert!(feed.next().await.is_none());
        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_feed_skips_unchanged_results() {
        use futures::StreamExt;

        let (calls, fetch) = scripted(vec![
            Ok(vec![restaurant_doc("a")]),
            Ok(vec![restaurant_doc("a")]),
            Ok(vec![restaurant_doc("a"), restaurant_doc("b")]),
        ]);
        let mut feed = poll_feed(vec![restaurant_doc("a")], Duration::from_millis(10), 3, fetch);

        assert_eq!(feed.next().await.unwrap().unwrap().len(), 1);
        assert_eq!(feed.next().await.unwrap().unwrap().len(), 2);
        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 3);
    }

    #[test]
    fn test_requires_project_id() {
        assert!(RestStore::new(Settings::default()).is_err());
    }

    #[test]
    fn test_document_name_and_url() {
        let store = store();
        let path = DocumentPath::new("restaurants/abc").unwrap();
        let name = store.document_name(&path);
        assert_eq!(
            name,
            "projects/friendly-eats/databases/(default)/documents/restaurants/abc"
        );
        assert_eq!(
            store.url(&name),
            format!("https://firestore.googleapis.com/v1/{}", name)
        );
        assert_eq!(store.relative_path(&name).unwrap(), path);
    }

    #[test]
    fn test_relative_path_rejects_foreign_database() {
        let store = store();
        assert!(store
            .relative_path("projects/other/databases/(default)/documents/restaurants/abc")
            .is_err());
    }

    #[test]
    fn test_encode_update_write_has_mask_and_precondition() {
        let store = store();
        let write = Write::Update {
            path: DocumentPath::new("restaurants/abc").unwrap(),
            fields: fields([("numRatings", Value::Integer(2)), ("sumRating", Value::Double(6.0))]),
        };
        let body = store.encode_write(&write);
        assert_eq!(body["updateMask"]["fieldPaths"], json!(["numRatings", "sumRating"]));
        assert_eq!(body["currentDocument"]["exists"], true);
        assert_eq!(body["update"]["fields"]["numRatings"]["integerValue"], "2");
    }

    #[test]
    fn test_encode_set_write_has_no_mask() {
        let store = store();
        let write = Write::Set {
            path: DocumentPath::new("restaurants/abc/ratings/r1").unwrap(),
            fields: fields([("rating", Value::Integer(4))]),
        };
        let body = store.encode_write(&write);
        assert!(body.get("updateMask").is_none());
        assert!(body["update"]["name"]
            .as_str()
            .unwrap()
            .ends_with("/documents/restaurants/abc/ratings/r1"));
    }

    #[test]
    fn test_error_from_response_uses_status_string() {
        let body = r#"{"error":{"code":409,"message":"Too much contention","status":"ABORTED"}}"#;
        assert!(error_from_response(StatusCode::CONFLICT, body).is_conflict());

        let body = r#"[{"error":{"code":503,"message":"backend down","status":"UNAVAILABLE"}}]"#;
        assert!(matches!(
            error_from_response(StatusCode::SERVICE_UNAVAILABLE, body),
            EatsError::StoreUnavailable(_)
        ));
    }

    #[test]
    fn test_error_from_response_falls_back_to_http_status() {
        assert!(error_from_response(StatusCode::CONFLICT, "").is_conflict());
        assert!(matches!(
            error_from_response(StatusCode::FORBIDDEN, "nope"),
            EatsError::PermissionDenied(_)
        ));
        assert!(matches!(
            error_from_response(StatusCode::INTERNAL_SERVER_ERROR, "boom"),
            EatsError::Internal(_)
        ));
    }

    #[test]
    fn test_run_query_response_decoding() {
        let store = store();
        let body = r#"[
            {"document": {"name": "projects/friendly-eats/databases/(default)/documents/restaurants/a",
                          "fields": {"city": {"stringValue": "London"}},
                          "createTime": "2024-01-01T00:00:00Z"},
             "readTime": "2024-01-01T00:00:01Z"},
            {"readTime": "2024-01-01T00:00:01Z"}
        ]"#;
        let responses: Vec<RunQueryResponse> = serde_json::from_str(body).unwrap();
        let docs: Vec<Document> = responses
            .into_iter()
            .filter_map(|r| r.document)
            .map(|raw| store.decode_document(raw).unwrap())
            .collect();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].id(), "a");
        assert_eq!(docs[0].get("city").and_then(Value::as_str), Some("London"));
    }
}
