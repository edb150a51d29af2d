use async_trait::async_trait;
use reqwest::{
    header::{self, HeaderMap},
    Client, Method, StatusCode,
};
use serde::Serialize;
use serde_json::Value;
use snafu::{OptionExt, ResultExt, Snafu};
use std::{env::VarError, fmt, sync::Arc};
use tracing::{debug, instrument};
use url::Url;

use crate::batch::{BatchError, BatchStatus, SubmissionRequest};

/// Base URL of the public molecule.one API.
pub const DEFAULT_BASE_URL: &str = "https://app.molecule.one/api/v1/";

/// User agent sent with every request. The service rejects some default client agents.
pub const USER_AGENT: &str = "curl/7.64.1";

/// Scheme used in the `Authorization` header.
pub const AUTH_SCHEME: &str = "ApiToken-v1";

const SEARCH_PATH: &str = "batch-search";
const RESULT_PATH: &str = "batch-search-result";

const API_KEY_ENV: &str = "MOLECULEONE_API_KEY";
const BASE_URL_ENV: &str = "MOLECULEONE_BASE_URL";

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum Error {
    #[snafu(display("failed to build HTTP client"))]
    BuildHttpClient { source: reqwest::Error },

    #[snafu(display("invalid URL '{url}'"))]
    InvalidUrl {
        source: url::ParseError,
        url: String,
    },

    #[snafu(display("URL '{url}' cannot be extended with a path segment"))]
    NotABaseUrl { url: Url },

    #[snafu(display("missing API key, set the {var} environment variable"))]
    MissingApiKey {
        source: VarError,
        var: &'static str,
    },

    #[snafu(display("environment variable {var} is not valid unicode"))]
    InvalidEnvVar {
        source: VarError,
        var: &'static str,
    },

    #[snafu(display("failed to serialize request body"))]
    SerializeBody { source: serde_json::Error },

    #[snafu(display("failed to perform request to '{url}'"))]
    PerformRequest { source: reqwest::Error, url: Url },

    #[snafu(display("failed to read response body from '{url}'"))]
    ReadBody { source: reqwest::Error, url: Url },

    #[snafu(display("response body from '{url}' is not valid UTF-8"))]
    InvalidUtf8 {
        source: std::string::FromUtf8Error,
        url: Url,
    },

    #[snafu(display("failed to deserialize JSON response from '{url}'"))]
    Deserialize { source: serde_json::Error, url: Url },

    #[snafu(display("could not authorize API key with {} (401)", response.url))]
    Unauthorized { response: ErrorResponse },

    #[snafu(display("access to {} forbidden (403)", response.url))]
    Forbidden { response: ErrorResponse },

    #[snafu(display("method not allowed on {} (405)", response.url))]
    MethodNotAllowed { response: ErrorResponse },

    #[snafu(display("too many requests to {} (429)", response.url))]
    TooManyRequests { response: ErrorResponse },

    #[snafu(display("server error from {} (500)", response.url))]
    ServerError { response: ErrorResponse },

    #[snafu(display("bad response from {}: {} - {}", response.url, response.status, response.body))]
    UnexpectedStatus { response: ErrorResponse },
}

impl Error {
    /// Maps a non-successful response onto the error taxonomy of the service.
    pub fn from_response(response: ErrorResponse) -> Self {
        match response.status.as_u16() {
            401 => Error::Unauthorized { response },
            403 => Error::Forbidden { response },
            405 => Error::MethodNotAllowed { response },
            429 => Error::TooManyRequests { response },
            500 => Error::ServerError { response },
            _ => Error::UnexpectedStatus { response },
        }
    }

    /// The failed response, if this error came from a non-2xx status.
    pub fn response(&self) -> Option<&ErrorResponse> {
        match self {
            Error::Unauthorized { response }
            | Error::Forbidden { response }
            | Error::MethodNotAllowed { response }
            | Error::TooManyRequests { response }
            | Error::ServerError { response }
            | Error::UnexpectedStatus { response } => Some(response),
            _ => None,
        }
    }

    /// HTTP status code of the failed response.
    pub fn status(&self) -> Option<StatusCode> {
        self.response().map(|response| response.status)
    }
}

/// Details of a response the service answered with a non-2xx status.
#[derive(Debug, Clone)]
pub struct ErrorResponse {
    pub status: StatusCode,
    pub url: Url,
    pub headers: HeaderMap,
    pub body: String,
}

/// API key used to authenticate against the service.
///
/// The key is never printed by the `Debug` implementation.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self(api_key.into())
    }

    /// Returns the raw API key.
    pub fn expose(&self) -> &str {
        &self.0
    }

    /// Value of the `Authorization` header for this key.
    pub fn authorization(&self) -> String {
        format!("{} {}", AUTH_SCHEME, self.0)
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(***)")
    }
}

impl From<String> for Credential {
    fn from(api_key: String) -> Self {
        Self(api_key)
    }
}

impl From<&str> for Credential {
    fn from(api_key: &str) -> Self {
        Self(api_key.to_string())
    }
}

/// The two resources exposed by the batch API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    search: Url,
    result: Url,
}

impl Endpoints {
    /// Uses the given URLs verbatim.
    pub fn new(search: Url, result: Url) -> Self {
        Self { search, result }
    }

    /// Derives `<base>/batch-search` and `<base>/batch-search-result`.
    pub fn from_base_url(base_url: &Url) -> Result<Self, Error> {
        let mut base = base_url.clone();
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }

        let search = base.join(SEARCH_PATH).context(InvalidUrlSnafu {
            url: format!("{base}{SEARCH_PATH}"),
        })?;
        let result = base.join(RESULT_PATH).context(InvalidUrlSnafu {
            url: format!("{base}{RESULT_PATH}"),
        })?;

        Ok(Self { search, result })
    }

    /// Endpoint for submitting batches and listing all batches of a key.
    pub fn search(&self) -> &Url {
        &self.search
    }

    /// Endpoint for fetching the results of a batch.
    pub fn result(&self) -> &Url {
        &self.result
    }

    pub(crate) fn batch_status(&self, id: &str) -> Result<Url, Error> {
        with_segment(&self.search, id)
    }

    pub(crate) fn batch_result(&self, id: &str) -> Result<Url, Error> {
        with_segment(&self.result, id)
    }
}

fn with_segment(base: &Url, segment: &str) -> Result<Url, Error> {
    let mut url = base.clone();
    url.path_segments_mut()
        .ok()
        .context(NotABaseUrlSnafu { url: base.clone() })?
        .pop_if_empty()
        .push(segment);
    Ok(url)
}

/// Sends one authenticated request and decodes the JSON answer.
///
/// A `body` turns the request into a POST, otherwise it is a GET. Implementations
/// must map non-2xx answers with [`Error::from_response`].
#[async_trait]
pub trait Transport: Send + Sync {
    async fn call(
        &self,
        url: Url,
        credential: &Credential,
        body: Option<Value>,
    ) -> Result<Value, Error>;
}

/// [`Transport`] backed by `reqwest`.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    http_client: Client,
}

impl HttpTransport {
    pub fn new() -> Result<Self, Error> {
        let http_client = Client::builder().build().context(BuildHttpClientSnafu)?;
        Ok(Self { http_client })
    }

    /// Reuses an existing `reqwest` client, e.g. one configured with a proxy.
    pub fn with_client(http_client: Client) -> Self {
        Self { http_client }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    #[instrument(skip_all, fields(url = %url, post = body.is_some()))]
    async fn call(
        &self,
        url: Url,
        credential: &Credential,
        body: Option<Value>,
    ) -> Result<Value, Error> {
        let method = if body.is_some() {
            Method::POST
        } else {
            Method::GET
        };

        let mut request = self
            .http_client
            .request(method, url.clone())
            .header(header::CONTENT_TYPE, "application/json")
            .header(header::AUTHORIZATION, credential.authorization())
            .header(header::USER_AGENT, USER_AGENT);

        if let Some(body) = body {
            let bytes = serde_json::to_vec(&body).context(SerializeBodySnafu)?;
            request = request.body(bytes);
        }

        let response = request
            .send()
            .await
            .context(PerformRequestSnafu { url: url.clone() })?;

        let status = response.status();
        debug!(status = status.as_u16(), "response received");
        if !status.is_success() {
            let headers = response.headers().clone();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::from_response(ErrorResponse {
                status,
                url,
                headers,
                body,
            }));
        }

        let bytes = response
            .bytes()
            .await
            .context(ReadBodySnafu { url: url.clone() })?;
        let text =
            String::from_utf8(bytes.to_vec()).context(InvalidUtf8Snafu { url: url.clone() })?;
        serde_json::from_str(&text).context(DeserializeSnafu { url })
    }
}

#[derive(Serialize)]
struct SubmitBatchRequest<'a> {
    targets: &'a [String],
}

/// Internal client shared by every handle created from a [`MoleculeOne`].
pub(crate) struct MoleculeOneClient {
    transport: Box<dyn Transport>,
    credential: Credential,
    endpoints: Endpoints,
}

impl MoleculeOneClient {
    pub(crate) fn credential(&self) -> &Credential {
        &self.credential
    }

    /// POST the targets to the search endpoint.
    pub(crate) async fn submit_batch(&self, targets: &[String]) -> Result<Value, Error> {
        let body =
            serde_json::to_value(SubmitBatchRequest { targets }).context(SerializeBodySnafu)?;
        self.transport
            .call(self.endpoints.search.clone(), &self.credential, Some(body))
            .await
    }

    /// GET the listing of every batch owned by the key.
    pub(crate) async fn list_batches(&self) -> Result<Value, Error> {
        self.transport
            .call(self.endpoints.search.clone(), &self.credential, None)
            .await
    }

    /// GET the job counts of one batch.
    pub(crate) async fn get_batch_status(&self, id: &str) -> Result<Value, Error> {
        let url = self.endpoints.batch_status(id)?;
        self.transport.call(url, &self.credential, None).await
    }

    /// GET the result payload of one batch.
    pub(crate) async fn get_batch_result(&self, id: &str) -> Result<Value, Error> {
        let url = self.endpoints.batch_result(id)?;
        self.transport.call(url, &self.credential, None).await
    }
}

impl fmt::Debug for MoleculeOneClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MoleculeOneClient")
            .field("credential", &self.credential)
            .field("endpoints", &self.endpoints)
            .finish_non_exhaustive()
    }
}

/// An unset base URL variable selects the public API; any other failure is an error.
fn base_url_from_env(value: Result<String, VarError>) -> Result<Option<Url>, Error> {
    match value {
        Ok(base_url) => {
            let url = Url::parse(&base_url).context(InvalidUrlSnafu {
                url: base_url.clone(),
            })?;
            Ok(Some(url))
        }
        Err(VarError::NotPresent) => Ok(None),
        Err(source) => Err(source).context(InvalidEnvVarSnafu { var: BASE_URL_ENV }),
    }
}

/// Client for the molecule.one batch API
#[derive(Clone, Debug)]
pub struct MoleculeOne {
    client: Arc<MoleculeOneClient>,
}

impl MoleculeOne {
    /// Create a new client for the public API with the specified API key
    pub fn new(api_key: impl Into<Credential>) -> Result<Self, Error> {
        let base_url = Url::parse(DEFAULT_BASE_URL).context(InvalidUrlSnafu {
            url: DEFAULT_BASE_URL,
        })?;
        Self::with_base_url(api_key, base_url)
    }

    /// Create a new client with custom base URL
    pub fn with_base_url(api_key: impl Into<Credential>, base_url: Url) -> Result<Self, Error> {
        let endpoints = Endpoints::from_base_url(&base_url)?;
        Self::with_endpoints(api_key, endpoints)
    }

    /// Create a new client with explicit endpoints
    pub fn with_endpoints(
        api_key: impl Into<Credential>,
        endpoints: Endpoints,
    ) -> Result<Self, Error> {
        let transport = HttpTransport::new()?;
        Ok(Self::with_transport(api_key, endpoints, transport))
    }

    /// Create a new client that sends its requests through `transport`
    pub fn with_transport(
        api_key: impl Into<Credential>,
        endpoints: Endpoints,
        transport: impl Transport + 'static,
    ) -> Self {
        let client = MoleculeOneClient {
            transport: Box::new(transport),
            credential: api_key.into(),
            endpoints,
        };
        Self {
            client: Arc::new(client),
        }
    }

    /// Create a client from `MOLECULEONE_API_KEY` and, if set, `MOLECULEONE_BASE_URL`.
    pub fn from_env() -> Result<Self, Error> {
        let api_key =
            std::env::var(API_KEY_ENV).context(MissingApiKeySnafu { var: API_KEY_ENV })?;
        match base_url_from_env(std::env::var(BASE_URL_ENV))? {
            Some(url) => Self::with_base_url(api_key, url),
            None => Self::new(api_key),
        }
    }

    pub fn credential(&self) -> &Credential {
        self.client.credential()
    }

    pub fn endpoints(&self) -> &Endpoints {
        &self.client.endpoints
    }

    /// Start a batch scoring request for the given SMILES strings.
    ///
    /// Nothing is sent until [`SubmissionRequest::submit`] is called.
    pub fn submission<I, S>(&self, smiles: I) -> SubmissionRequest
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let smiles = smiles.into_iter().map(Into::into).collect();
        SubmissionRequest::new(self.client.clone(), smiles)
    }

    /// Track a batch that was submitted earlier, without submitting it again.
    pub fn resume(&self, id: impl Into<String>) -> SubmissionRequest {
        SubmissionRequest::from_id(self.client.clone(), id.into())
    }

    /// Fetch the listing of every batch owned by this API key.
    pub async fn batch_status(&self) -> Result<BatchStatus, BatchError> {
        BatchStatus::fetch(self.client.clone()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::{ffi::OsString, net::SocketAddr};
    use tokio::{
        io::{AsyncReadExt, AsyncWriteExt},
        net::TcpListener,
        task::JoinHandle,
    };

    /// Accepts one connection, answers with `status` and `body`, and returns the raw request.
    async fn serve_once(
        status: &'static str,
        extra_headers: &'static str,
        body: &'static [u8],
    ) -> (Endpoints, JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr: SocketAddr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = Vec::new();
            let mut buf = [0u8; 1024];
            loop {
                let n = socket.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                request.extend_from_slice(&buf[..n]);
                if request_complete(&request) {
                    break;
                }
            }

            let head = format!(
                "HTTP/1.1 {status}\r\nContent-Length: {}\r\nConnection: close\r\n{extra_headers}\r\n",
                body.len()
            );
            socket.write_all(head.as_bytes()).await.unwrap();
            socket.write_all(body).await.unwrap();
            let _ = socket.shutdown().await;
            String::from_utf8(request).unwrap()
        });

        let base = Url::parse(&format!("http://{addr}/api/v1/")).unwrap();
        (Endpoints::from_base_url(&base).unwrap(), handle)
    }

    fn request_complete(request: &[u8]) -> bool {
        let Some(end) = request.windows(4).position(|w| w == b"\r\n\r\n") else {
            return false;
        };
        let head = String::from_utf8_lossy(&request[..end]);
        let length = header_values(&head, "content-length")
            .first()
            .and_then(|value| value.parse::<usize>().ok())
            .unwrap_or(0);
        request.len() >= end + 4 + length
    }

    fn header_values(request: &str, name: &str) -> Vec<String> {
        request
            .split("\r\n")
            .skip(1)
            .take_while(|line| !line.is_empty())
            .filter_map(|line| line.split_once(':'))
            .filter(|(key, _)| key.trim().eq_ignore_ascii_case(name))
            .map(|(_, value)| value.trim().to_string())
            .collect()
    }

    fn transport() -> HttpTransport {
        HttpTransport::with_client(Client::builder().no_proxy().build().unwrap())
    }

    fn error_response(status: u16) -> ErrorResponse {
        ErrorResponse {
            status: StatusCode::from_u16(status).unwrap(),
            url: Url::parse("https://app.molecule.one/api/v1/batch-search").unwrap(),
            headers: HeaderMap::new(),
            body: "nope".to_string(),
        }
    }

    #[test]
    fn test_status_codes_map_to_error_kinds() {
        assert!(matches!(Error::from_response(error_response(401)), Error::Unauthorized { .. }));
        assert!(matches!(Error::from_response(error_response(403)), Error::Forbidden { .. }));
        assert!(matches!(
            Error::from_response(error_response(405)),
            Error::MethodNotAllowed { .. }
        ));
        assert!(matches!(
            Error::from_response(error_response(429)),
            Error::TooManyRequests { .. }
        ));
        assert!(matches!(Error::from_response(error_response(500)), Error::ServerError { .. }));
    }

    #[test]
    fn test_unmapped_status_keeps_details() {
        let error = Error::from_response(error_response(418));
        assert!(matches!(error, Error::UnexpectedStatus { .. }));
        assert_eq!(error.status(), Some(StatusCode::IM_A_TEAPOT));
        assert_eq!(error.response().unwrap().body, "nope");
        assert!(error.to_string().contains("418"));
    }

    #[test]
    fn test_credential_debug_is_redacted() {
        let credential = Credential::new("secret-key");
        assert_eq!(format!("{credential:?}"), "Credential(***)");
        assert_eq!(credential.authorization(), "ApiToken-v1 secret-key");
        assert_eq!(credential.expose(), "secret-key");
    }

    #[test]
    fn test_default_endpoints() {
        let base = Url::parse(DEFAULT_BASE_URL).unwrap();
        let endpoints = Endpoints::from_base_url(&base).unwrap();
        assert_eq!(
            endpoints.search().as_str(),
            "https://app.molecule.one/api/v1/batch-search"
        );
        assert_eq!(
            endpoints.result().as_str(),
            "https://app.molecule.one/api/v1/batch-search-result"
        );
    }

    #[test]
    fn test_base_url_without_trailing_slash() {
        let base = Url::parse("http://localhost:8080/api/v1").unwrap();
        let endpoints = Endpoints::from_base_url(&base).unwrap();
        assert_eq!(endpoints.search().as_str(), "http://localhost:8080/api/v1/batch-search");
    }

    #[test]
    fn test_batch_urls_append_encoded_id() {
        let base = Url::parse(DEFAULT_BASE_URL).unwrap();
        let endpoints = Endpoints::from_base_url(&base).unwrap();
        assert_eq!(
            endpoints.batch_status("abc123").unwrap().as_str(),
            "https://app.molecule.one/api/v1/batch-search/abc123"
        );
        assert_eq!(
            endpoints.batch_result("a b").unwrap().as_str(),
            "https://app.molecule.one/api/v1/batch-search-result/a%20b"
        );
    }

    #[tokio::test]
    async fn test_http_transport_posts_body_with_headers() {
        let (endpoints, server) = serve_once("200 OK", "", br#"{"id":"abc123"}"#).await;
        let credential = Credential::new("test-key");
        let body = json!({"targets": ["CCO"]});

        let response = transport()
            .call(endpoints.search().clone(), &credential, Some(body.clone()))
            .await
            .unwrap();
        assert_eq!(response, json!({"id": "abc123"}));

        let request = server.await.unwrap();
        assert!(request.starts_with("POST /api/v1/batch-search HTTP/1.1\r\n"));
        assert_eq!(header_values(&request, "content-type"), ["application/json"]);
        assert_eq!(header_values(&request, "authorization"), ["ApiToken-v1 test-key"]);
        assert_eq!(header_values(&request, "user-agent"), ["curl/7.64.1"]);

        let (_, sent) = request.split_once("\r\n\r\n").unwrap();
        assert_eq!(serde_json::from_str::<Value>(sent).unwrap(), body);
    }

    #[tokio::test]
    async fn test_http_transport_gets_without_body() {
        let payload = br#"{"finished":1,"running":0,"queued":0,"error":0}"#;
        let (endpoints, server) = serve_once("200 OK", "", payload).await;
        let credential = Credential::new("test-key");

        let response = transport()
            .call(endpoints.batch_status("abc123").unwrap(), &credential, None)
            .await
            .unwrap();
        assert_eq!(response["finished"], 1);

        let request = server.await.unwrap();
        assert!(request.starts_with("GET /api/v1/batch-search/abc123 HTTP/1.1\r\n"));
        assert_eq!(header_values(&request, "content-type"), ["application/json"]);
        assert_eq!(header_values(&request, "authorization"), ["ApiToken-v1 test-key"]);
        assert_eq!(header_values(&request, "user-agent"), ["curl/7.64.1"]);
        assert!(request.ends_with("\r\n\r\n"));
    }

    #[tokio::test]
    async fn test_http_transport_rejects_invalid_utf8() {
        let (endpoints, server) = serve_once("200 OK", "", &[0xff, 0xfe]).await;

        let error = transport()
            .call(endpoints.search().clone(), &Credential::new("test-key"), None)
            .await
            .unwrap_err();
        assert!(matches!(error, Error::InvalidUtf8 { .. }), "{error:?}");
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_http_transport_rejects_invalid_json() {
        let (endpoints, server) = serve_once("200 OK", "", b"not json").await;

        let error = transport()
            .call(endpoints.search().clone(), &Credential::new("test-key"), None)
            .await
            .unwrap_err();
        assert!(matches!(error, Error::Deserialize { .. }), "{error:?}");
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_http_transport_keeps_rate_limit_details() {
        let (endpoints, server) =
            serve_once("429 Too Many Requests", "Retry-After: 30\r\n", b"slow down").await;
        let url = endpoints.search().clone();

        let error = transport()
            .call(url.clone(), &Credential::new("test-key"), Some(json!({"targets": []})))
            .await
            .unwrap_err();
        let Error::TooManyRequests { response } = &error else {
            panic!("expected TooManyRequests, got {error:?}");
        };
        assert_eq!(response.status, StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.url, url);
        assert_eq!(response.headers.get("retry-after").unwrap(), "30");
        assert_eq!(response.body, "slow down");
        server.await.unwrap();
    }

    #[test]
    fn test_base_url_env_unset_uses_default() {
        assert!(base_url_from_env(Err(VarError::NotPresent)).unwrap().is_none());
    }

    #[test]
    fn test_base_url_env_not_unicode_is_an_error() {
        let error = base_url_from_env(Err(VarError::NotUnicode(OsString::from("x")))).unwrap_err();
        assert!(
            matches!(error, Error::InvalidEnvVar { var, .. } if var == BASE_URL_ENV),
            "{error:?}"
        );
    }

    #[test]
    fn test_base_url_env_is_parsed() {
        let url = base_url_from_env(Ok("http://localhost:8080/api/v1/".to_string()))
            .unwrap()
            .unwrap();
        assert_eq!(url.as_str(), "http://localhost:8080/api/v1/");
        assert!(matches!(
            base_url_from_env(Ok("not a url".to_string())),
            Err(Error::InvalidUrl { .. })
        ));
    }
}
