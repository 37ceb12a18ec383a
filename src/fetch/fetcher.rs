use crate::config::AemetConfig;
use crate::fetch::backoff::{BackoffDecision, BackoffPolicy, FailureClass};
use crate::fetch::decode::decode_json;
use crate::fetch::error::FetchError;
use crate::fetch::sleeper::{Sleeper, TokioSleeper};
use log::{debug, warn};
use reqwest::{Client, StatusCode};
use serde_json::Value;
use std::fmt;

/// Key of the envelope field that points at the real payload.
const INDIRECTION_KEY: &str = "datos";
/// Key of the status code AEMET embeds in its envelopes.
const ENVELOPE_STATUS_KEY: &str = "estado";

/// Why a single attempt at one hop failed.
enum Failure {
    Status(StatusCode),
    Unreachable(reqwest::Error),
    Decode(serde_json::Error),
}

impl Failure {
    fn class(&self) -> Option<FailureClass> {
        match self {
            Failure::Status(status) => Some(
                FailureClass::from_status(*status)
                    .unwrap_or(FailureClass::ClientRequestError(*status)),
            ),
            Failure::Unreachable(_) => Some(FailureClass::ConnectionError),
            Failure::Decode(_) => None,
        }
    }

    fn into_error(self, url: &str, attempts: u32) -> FetchError {
        let url = url.to_string();
        match self {
            Failure::Status(status) if status.is_server_error() => FetchError::ServerFault {
                url,
                status,
                attempts,
            },
            Failure::Status(status) => FetchError::ClientRequest { url, status },
            Failure::Unreachable(source) => FetchError::Connection {
                url,
                attempts,
                source,
            },
            Failure::Decode(source) => FetchError::Decode { url, source },
        }
    }
}

/// What the first hop told us to do next.
enum Envelope {
    Pointer(String),
    NoData,
    Payload(Value),
}

/// Fetches JSON payloads from the AEMET OpenData API, following its
/// two-step `datos` indirection and absorbing retriable failures.
pub struct TwoStepFetcher<S = TokioSleeper> {
    client: Client,
    api_key: String,
    policy: BackoffPolicy,
    sleeper: S,
}

impl<S> fmt::Debug for TwoStepFetcher<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TwoStepFetcher")
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

impl TwoStepFetcher<TokioSleeper> {
    pub fn new(config: &AemetConfig) -> Result<Self, FetchError> {
        Self::with_sleeper(config, TokioSleeper)
    }
}

impl<S: Sleeper> TwoStepFetcher<S> {
    pub fn with_sleeper(config: &AemetConfig, sleeper: S) -> Result<Self, FetchError> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .connect_timeout(config.connect_timeout)
            .build()
            .map_err(FetchError::ClientBuild)?;
        Ok(Self {
            client,
            api_key: config.api_key.clone(),
            policy: config.backoff,
            sleeper,
        })
    }

    /// Fetches `url` and resolves the `datos` indirection if the API returned one.
    ///
    /// Both hops retry independently under the configured [`BackoffPolicy`].
    /// An envelope reporting `estado: 404` without a pointer means the query
    /// matched nothing and yields an empty list.
    pub async fn fetch(&self, url: &str) -> Result<Value, FetchError> {
        let first = self.get_json(url).await?;
        match Self::inspect_envelope(url, first)? {
            Envelope::Pointer(data_url) => {
                debug!("Following data pointer {} for {}", data_url, url);
                self.get_json(&data_url).await
            }
            Envelope::NoData => {
                debug!("No data available for {}", url);
                Ok(Value::Array(Vec::new()))
            }
            Envelope::Payload(value) => Ok(value),
        }
    }

    /// Like [`fetch`](Self::fetch), but requires the payload to be a JSON array.
    pub async fn fetch_list(&self, url: &str) -> Result<Vec<Value>, FetchError> {
        match self.fetch(url).await? {
            Value::Array(items) => Ok(items),
            _ => Err(FetchError::UnexpectedPayload {
                url: url.to_string(),
                expected: "a JSON array",
            }),
        }
    }

    fn inspect_envelope(url: &str, value: Value) -> Result<Envelope, FetchError> {
        match value.get(INDIRECTION_KEY) {
            Some(Value::String(pointer)) => return Ok(Envelope::Pointer(pointer.clone())),
            Some(_) => {
                return Err(FetchError::MalformedEnvelope {
                    url: url.to_string(),
                })
            }
            None => {}
        }
        if envelope_status(&value) == Some(StatusCode::NOT_FOUND) {
            return Ok(Envelope::NoData);
        }
        Ok(Envelope::Payload(value))
    }

    /// One hop with retries. Rate limits and transient faults are counted
    /// separately, so a long run of 429s never eats into the bounded budget
    /// for server faults.
    async fn get_json(&self, url: &str) -> Result<Value, FetchError> {
        let mut rate_limited = 0u32;
        let mut transient = 0u32;

        loop {
            let failure = match self.attempt(url).await {
                Ok(value) => return Ok(value),
                Err(failure) => failure,
            };
            let Some(class) = failure.class() else {
                return Err(failure.into_error(url, rate_limited + transient + 1));
            };
            let attempt = match class {
                FailureClass::RateLimited => {
                    rate_limited += 1;
                    rate_limited
                }
                _ => {
                    transient += 1;
                    transient
                }
            };

            match self.policy.decide(class, attempt) {
                BackoffDecision::RetryAfter(delay) => {
                    match class {
                        FailureClass::RateLimited => warn!(
                            "Rate limited on {} ({} in a row), waiting {:?}",
                            url, attempt, delay
                        ),
                        _ => warn!(
                            "{:?} on {} (attempt {}/{}), waiting {:?}",
                            class, url, attempt, self.policy.max_transient_attempts, delay
                        ),
                    }
                    self.sleeper.sleep(delay).await;
                }
                BackoffDecision::Abort => {
                    warn!("Giving up on {} after {:?}", url, class);
                    return Err(failure.into_error(url, attempt));
                }
            }
        }
    }

    async fn attempt(&self, url: &str) -> Result<Value, Failure> {
        let response = self
            .client
            .get(url)
            .query(&[("api_key", self.api_key.as_str())])
            .send()
            .await
            .map_err(Failure::Unreachable)?;

        let status = response.status();
        if !status.is_success() {
            return Err(Failure::Status(status));
        }

        let bytes = response.bytes().await.map_err(Failure::Unreachable)?;
        let value = decode_json(&bytes).map_err(Failure::Decode)?;

        // AEMET sometimes answers 200 with the rate limit reported in the envelope.
        if envelope_status(&value) == Some(StatusCode::TOO_MANY_REQUESTS)
            && value.get(INDIRECTION_KEY).is_none()
        {
            return Err(Failure::Status(StatusCode::TOO_MANY_REQUESTS));
        }
        Ok(value)
    }
}

fn envelope_status(value: &Value) -> Option<StatusCode> {
    let code = value.get(ENVELOPE_STATUS_KEY)?.as_u64()?;
    StatusCode::from_u16(u16::try_from(code).ok()?).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::backoff::RateLimitMode;
    use crate::fetch::sleeper::testing::RecordingSleeper;
    use serde_json::json;
    use std::future::Future;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::sync::Mutex as AsyncMutex;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config(server: &MockServer) -> AemetConfig {
        AemetConfig::builder()
            .api_key("test-token")
            .base_url(server.uri())
            .build()
    }

    fn fetcher(server: &MockServer) -> (TwoStepFetcher<RecordingSleeper>, RecordingSleeper) {
        let sleeper = RecordingSleeper::default();
        let fetcher = TwoStepFetcher::with_sleeper(&config(server), sleeper.clone()).unwrap();
        (fetcher, sleeper)
    }

    fn envelope(server: &MockServer, data_path: &str) -> serde_json::Value {
        json!({
            "descripcion": "exito",
            "estado": 200,
            "datos": format!("{}{}", server.uri(), data_path),
            "metadatos": format!("{}/meta", server.uri())
        })
    }

    #[tokio::test]
    async fn returns_direct_payload() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/direct"))
            .and(query_param("api_key", "test-token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([{ "a": 1 }])))
            .expect(1)
            .mount(&server)
            .await;

        let (fetcher, sleeper) = fetcher(&server);
        let value = fetcher.fetch(&format!("{}/direct", server.uri())).await.unwrap();
        assert_eq!(value, json!([{ "a": 1 }]));
        assert!(sleeper.delays().is_empty());
    }

    #[tokio::test]
    async fn follows_datos_pointer() {
        let server = MockServer::start().await;
        Mock::given(path("/first"))
            .respond_with(ResponseTemplate::new(200).set_body_json(envelope(&server, "/sh/abc")))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(path("/sh/abc"))
            .and(query_param("api_key", "test-token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([{ "indicativo": "3195" }])))
            .expect(1)
            .mount(&server)
            .await;

        let (fetcher, _) = fetcher(&server);
        let items = fetcher
            .fetch_list(&format!("{}/first", server.uri()))
            .await
            .unwrap();
        assert_eq!(items, vec![json!({ "indicativo": "3195" })]);
    }

    #[tokio::test]
    async fn rate_limits_are_retried_until_success() {
        let server = MockServer::start().await;
        Mock::given(path("/first"))
            .respond_with(ResponseTemplate::new(429))
            .up_to_n_times(3)
            .expect(3)
            .mount(&server)
            .await;
        Mock::given(path("/first"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([1, 2, 3])))
            .expect(1)
            .mount(&server)
            .await;

        let (fetcher, sleeper) = fetcher(&server);
        let value = fetcher.fetch(&format!("{}/first", server.uri())).await.unwrap();
        assert_eq!(value, json!([1, 2, 3]));
        assert_eq!(sleeper.delays(), vec![Duration::from_secs(60); 3]);
    }

    #[tokio::test]
    async fn rate_limit_on_second_hop_retries_that_hop() {
        let server = MockServer::start().await;
        Mock::given(path("/first"))
            .respond_with(ResponseTemplate::new(200).set_body_json(envelope(&server, "/sh/1")))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(path("/sh/1"))
            .respond_with(ResponseTemplate::new(429))
            .up_to_n_times(2)
            .mount(&server)
            .await;
        Mock::given(path("/sh/1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .expect(1)
            .mount(&server)
            .await;

        let (fetcher, sleeper) = fetcher(&server);
        let value = fetcher.fetch(&format!("{}/first", server.uri())).await.unwrap();
        assert_eq!(value, json!([]));
        assert_eq!(sleeper.delays().len(), 2);
    }

    #[tokio::test]
    async fn envelope_rate_limit_is_retried() {
        let server = MockServer::start().await;
        Mock::given(path("/first"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "descripcion": "Limite de peticiones o caudal por minuto excedido para este usuario",
                "estado": 429
            })))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(path("/first"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([{ "ok": true }])))
            .mount(&server)
            .await;

        let (fetcher, sleeper) = fetcher(&server);
        let value = fetcher.fetch(&format!("{}/first", server.uri())).await.unwrap();
        assert_eq!(value, json!([{ "ok": true }]));
        assert_eq!(sleeper.delays().len(), 1);
    }

    #[tokio::test]
    async fn exponential_rate_limit_mode_doubles_waits() {
        let server = MockServer::start().await;
        Mock::given(path("/first"))
            .respond_with(ResponseTemplate::new(429))
            .up_to_n_times(4)
            .mount(&server)
            .await;
        Mock::given(path("/first"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .mount(&server)
            .await;

        let mut config = config(&server);
        config.backoff.rate_limit = RateLimitMode::Exponential {
            base: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
        };
        let sleeper = RecordingSleeper::default();
        let fetcher = TwoStepFetcher::with_sleeper(&config, sleeper.clone()).unwrap();
        fetcher.fetch(&format!("{}/first", server.uri())).await.unwrap();
        assert_eq!(
            sleeper.delays(),
            [1, 2, 4, 8].map(Duration::from_secs).to_vec()
        );
    }

    #[tokio::test]
    async fn server_faults_give_up_after_max_attempts() {
        let server = MockServer::start().await;
        Mock::given(path("/first"))
            .respond_with(ResponseTemplate::new(503))
            .expect(5)
            .mount(&server)
            .await;

        let (fetcher, sleeper) = fetcher(&server);
        let err = fetcher
            .fetch(&format!("{}/first", server.uri()))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            FetchError::ServerFault {
                status: StatusCode::SERVICE_UNAVAILABLE,
                attempts: 5,
                ..
            }
        ));
        assert_eq!(
            sleeper.delays(),
            [2, 4, 8, 16].map(Duration::from_secs).to_vec()
        );
    }

    #[tokio::test]
    async fn server_fault_then_success_recovers() {
        let server = MockServer::start().await;
        Mock::given(path("/first"))
            .respond_with(ResponseTemplate::new(500))
            .up_to_n_times(2)
            .mount(&server)
            .await;
        Mock::given(path("/first"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "k": "v" })))
            .mount(&server)
            .await;

        let (fetcher, _) = fetcher(&server);
        let value = fetcher.fetch(&format!("{}/first", server.uri())).await.unwrap();
        assert_eq!(value, json!({ "k": "v" }));
    }

    #[tokio::test]
    async fn server_fault_on_second_hop_recovers() {
        let server = MockServer::start().await;
        Mock::given(path("/first"))
            .respond_with(ResponseTemplate::new(200).set_body_json(envelope(&server, "/sh/1")))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(path("/sh/1"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(2)
            .mount(&server)
            .await;
        Mock::given(path("/sh/1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([{ "tmed": "4,1" }])))
            .expect(1)
            .mount(&server)
            .await;

        let (fetcher, sleeper) = fetcher(&server);
        let value = fetcher.fetch(&format!("{}/first", server.uri())).await.unwrap();
        assert_eq!(value, json!([{ "tmed": "4,1" }]));
        assert_eq!(
            sleeper.delays(),
            vec![Duration::from_secs(2), Duration::from_secs(4)]
        );
    }

    #[tokio::test]
    async fn client_errors_are_not_retried() {
        let server = MockServer::start().await;
        Mock::given(path("/first"))
            .respond_with(ResponseTemplate::new(401))
            .expect(1)
            .mount(&server)
            .await;

        let (fetcher, sleeper) = fetcher(&server);
        let err = fetcher
            .fetch(&format!("{}/first", server.uri()))
            .await
            .unwrap_err();
        assert_eq!(err.status(), Some(StatusCode::UNAUTHORIZED));
        assert!(sleeper.delays().is_empty());
    }

    #[tokio::test]
    async fn connection_errors_are_bounded() {
        // Bind and release a port so nothing is listening on it.
        let port = std::net::TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port();
        let url = format!("http://127.0.0.1:{port}/first");

        let sleeper = RecordingSleeper::default();
        let config = AemetConfig::builder().api_key("test-token").build();
        let fetcher = TwoStepFetcher::with_sleeper(&config, sleeper.clone()).unwrap();
        let err = fetcher.fetch(&url).await.unwrap_err();
        assert!(matches!(err, FetchError::Connection { attempts: 5, .. }));
        assert_eq!(sleeper.delays().len(), 4);
    }

    /// Starts a server on `port` during the first backoff wait, so the retry
    /// after a refused connection reaches it.
    #[derive(Clone)]
    struct ServerOnFirstWait {
        port: u16,
        server: Arc<AsyncMutex<Option<MockServer>>>,
        recorder: RecordingSleeper,
    }

    impl Sleeper for ServerOnFirstWait {
        fn sleep(&self, delay: Duration) -> impl Future<Output = ()> + Send {
            let server = self.server.clone();
            let port = self.port;
            let recorder = self.recorder.clone();
            async move {
                recorder.sleep(delay).await;
                let mut slot = server.lock().await;
                if slot.is_none() {
                    let listener = std::net::TcpListener::bind(("127.0.0.1", port)).unwrap();
                    let started = MockServer::builder().listener(listener).start().await;
                    Mock::given(path("/first"))
                        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
                        .mount(&started)
                        .await;
                    *slot = Some(started);
                }
            }
        }
    }

    #[tokio::test]
    async fn connection_error_then_success_recovers() {
        let port = std::net::TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port();
        let sleeper = ServerOnFirstWait {
            port,
            server: Arc::default(),
            recorder: RecordingSleeper::default(),
        };
        let config = AemetConfig::builder().api_key("test-token").build();
        let fetcher = TwoStepFetcher::with_sleeper(&config, sleeper.clone()).unwrap();

        let value = fetcher
            .fetch(&format!("http://127.0.0.1:{port}/first"))
            .await
            .unwrap();
        assert_eq!(value, json!([]));
        assert_eq!(sleeper.recorder.delays(), vec![Duration::from_secs(2)]);
    }

    #[tokio::test]
    async fn latin1_second_hop_is_decoded() {
        let server = MockServer::start().await;
        Mock::given(path("/first"))
            .respond_with(ResponseTemplate::new(200).set_body_json(envelope(&server, "/sh/latin")))
            .mount(&server)
            .await;
        let mut body = b"[{\"indicativo\":\"3469A\",\"nombre\":\"C".to_vec();
        body.push(0xC1);
        body.extend_from_slice(b"CERES\"}]");
        Mock::given(path("/sh/latin"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/plain;charset=ISO-8859-15"))
            .mount(&server)
            .await;

        let (fetcher, _) = fetcher(&server);
        let items = fetcher
            .fetch_list(&format!("{}/first", server.uri()))
            .await
            .unwrap();
        assert_eq!(items[0]["nombre"], "CÁCERES");
    }

    #[tokio::test]
    async fn undecodable_payload_fails_without_retry() {
        let server = MockServer::start().await;
        Mock::given(path("/first"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
            .expect(1)
            .mount(&server)
            .await;

        let (fetcher, sleeper) = fetcher(&server);
        let err = fetcher
            .fetch(&format!("{}/first", server.uri()))
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::Decode { .. }));
        assert!(sleeper.delays().is_empty());
    }

    #[tokio::test]
    async fn envelope_without_data_is_empty_list() {
        let server = MockServer::start().await;
        Mock::given(path("/first"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "descripcion": "No hay datos que satisfagan esos criterios",
                "estado": 404
            })))
            .mount(&server)
            .await;

        let (fetcher, _) = fetcher(&server);
        let items = fetcher
            .fetch_list(&format!("{}/first", server.uri()))
            .await
            .unwrap();
        assert!(items.is_empty());
    }

    #[tokio::test]
    async fn non_string_pointer_is_rejected() {
        let server = MockServer::start().await;
        Mock::given(path("/first"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "estado": 200, "datos": 7 })))
            .mount(&server)
            .await;

        let (fetcher, _) = fetcher(&server);
        let err = fetcher
            .fetch(&format!("{}/first", server.uri()))
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::MalformedEnvelope { .. }));
    }

    #[tokio::test]
    async fn mapping_payload_is_not_a_list() {
        let server = MockServer::start().await;
        Mock::given(path("/first"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "k": 1 })))
            .mount(&server)
            .await;

        let (fetcher, _) = fetcher(&server);
        let err = fetcher
            .fetch_list(&format!("{}/first", server.uri()))
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::UnexpectedPayload { .. }));
    }
}
