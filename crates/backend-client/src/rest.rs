//! REST transport for the backend-as-a-service
//!
//! Thin request/response layer over `reqwest`. Every request carries the
//! public API key; requests made on behalf of a signed-in user carry that
//! user's access token as the bearer, otherwise the API key is used.
//!
//! Nothing here retries. A failed call surfaces immediately.

use crate::config::BackendConfig;
use reqwest::{Client as ReqwestClient, Response as ReqwestResponse};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::collections::HashMap;

// =============================================================================
// Error Types
// =============================================================================

/// Error from a REST call
///
/// Status `0` means the request never produced a usable HTTP response
/// (connection failure, timeout, unreadable body).
///
/// # Examples
/// ```
/// use backend_client::rest::RestError;
///
/// let error = RestError::new(400, "invalid_credentials", "Invalid login credentials");
/// assert!(error.is_rejection());
/// assert!(!error.is_transport());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestError {
    status: u16,
    code: String,
    message: String,
}

impl RestError {
    /// Create a new REST error
    pub fn new(status: u16, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self { status, code: code.into(), message: message.into() }
    }

    /// HTTP status code, `0` for transport failures
    pub fn status(&self) -> u16 {
        self.status
    }

    /// Machine readable error code
    pub fn code(&self) -> &str {
        &self.code
    }

    /// Human readable message as sent by the service
    pub fn message(&self) -> &str {
        &self.message
    }

    /// The service understood the request and refused it (4xx)
    pub fn is_rejection(&self) -> bool {
        (400..500).contains(&self.status)
    }

    /// No usable HTTP response was obtained
    pub fn is_transport(&self) -> bool {
        self.status == 0
    }
}

impl std::fmt::Display for RestError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "REST error {}: {} - {}", self.status, self.code, self.message)
    }
}

impl std::error::Error for RestError {}

/// The error body shapes the auth and data services send back
///
/// Auth uses `{error, error_description}` or `{error_code, msg}`; the data
/// service uses `{code, message, details, hint}`.
#[derive(Debug, Clone, Default, Deserialize)]
struct ErrorBody {
    error: Option<String>,
    error_description: Option<String>,
    error_code: Option<String>,
    msg: Option<String>,
    message: Option<String>,
    code: Option<serde_json::Value>,
}

impl ErrorBody {
    fn into_error(self, status: u16) -> RestError {
        let code = self
            .error_code
            .clone()
            .or_else(|| self.error.clone())
            .or_else(|| match &self.code {
                Some(serde_json::Value::String(s)) => Some(s.clone()),
                Some(other) => Some(other.to_string()),
                None => None,
            })
            .unwrap_or_else(|| "Unknown".to_string());

        let message = self
            .error_description
            .or(self.msg)
            .or(self.message)
            .or(self.error)
            .unwrap_or_else(|| format!("HTTP {}", status));

        RestError::new(status, code, message)
    }
}

// =============================================================================
// Request Types
// =============================================================================

/// HTTP method
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    /// GET
    Get,
    /// POST
    Post,
}

impl HttpMethod {
    /// Method name
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
        }
    }
}

/// A request against the service, relative to its base URL
#[derive(Debug, Clone)]
pub struct RestRequest {
    /// HTTP method
    pub method: HttpMethod,
    /// Path below the service URL (e.g. "/auth/v1/token")
    pub path: String,
    /// Query parameters, in order
    pub params: Vec<(String, String)>,
    /// Extra request headers
    pub headers: HashMap<String, String>,
    /// JSON body
    pub body: Option<Vec<u8>>,
    /// User access token; the API key is used as bearer when absent
    pub bearer: Option<String>,
}

impl RestRequest {
    /// Create a request with an explicit method
    pub fn new(method: HttpMethod, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            params: Vec::new(),
            headers: HashMap::new(),
            body: None,
            bearer: None,
        }
    }

    /// Create a GET request
    pub fn get(path: impl Into<String>) -> Self {
        Self::new(HttpMethod::Get, path)
    }

    /// Create a POST request
    pub fn post(path: impl Into<String>) -> Self {
        Self::new(HttpMethod::Post, path)
    }

    /// Add a query parameter
    pub fn param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.push((key.into(), value.into()));
        self
    }

    /// Add a header
    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    /// Authenticate as a user
    pub fn bearer(mut self, token: impl Into<String>) -> Self {
        self.bearer = Some(token.into());
        self
    }

    /// Set the request body from JSON
    pub fn json_body<T: Serialize>(mut self, value: &T) -> Result<Self, serde_json::Error> {
        self.body = Some(serde_json::to_vec(value)?);
        Ok(self)
    }
}

// =============================================================================
// Response Types
// =============================================================================

/// Response with decoded body
#[derive(Debug, Clone)]
pub struct RestResponse<T> {
    /// HTTP status code
    pub status: u16,
    /// Decoded body
    pub data: T,
}

// =============================================================================
// Client
// =============================================================================

/// HTTP client bound to one service URL and API key
#[derive(Debug, Clone)]
pub struct RestClient {
    client: ReqwestClient,
    service_url: String,
    api_key: String,
}

impl RestClient {
    /// Build a client from the backend config
    pub fn new(config: &BackendConfig) -> Result<Self, RestError> {
        let client = ReqwestClient::builder()
            .timeout(config.timeout)
            .user_agent(&config.user_agent)
            .build()
            .map_err(|e| RestError::new(0, "ClientBuild", e.to_string()))?;

        Ok(Self {
            client,
            service_url: config.service_url.clone(),
            api_key: config.api_key.clone(),
        })
    }

    /// The service URL requests are sent to
    pub fn service_url(&self) -> &str {
        &self.service_url
    }

    /// Send a request and decode a JSON body
    pub async fn send<T>(&self, request: RestRequest) -> Result<RestResponse<T>, RestError>
    where
        T: DeserializeOwned,
    {
        let response = self.dispatch(request).await?;
        let (status, body) = Self::read(response).await?;

        let data: T = serde_json::from_str(&body).map_err(|e| {
            RestError::new(0, "ParseError", format!("Failed to parse JSON: {}", e))
        })?;

        Ok(RestResponse { status, data })
    }

    /// Send a request whose response body is irrelevant
    pub async fn send_empty(&self, request: RestRequest) -> Result<u16, RestError> {
        let response = self.dispatch(request).await?;
        let (status, _) = Self::read(response).await?;
        Ok(status)
    }

    async fn dispatch(&self, request: RestRequest) -> Result<ReqwestResponse, RestError> {
        let url = format!("{}{}", self.service_url, request.path);
        tracing::debug!(method = request.method.as_str(), path = %request.path, "backend request");

        let mut req = match request.method {
            HttpMethod::Get => self.client.get(&url),
            HttpMethod::Post => self.client.post(&url),
        };

        if !request.params.is_empty() {
            req = req.query(&request.params);
        }

        let bearer = request.bearer.as_deref().unwrap_or(&self.api_key);
        req = req
            .header("apikey", &self.api_key)
            .header("Authorization", format!("Bearer {}", bearer));

        for (key, value) in &request.headers {
            req = req.header(key, value);
        }

        if let Some(body) = request.body {
            req = req.header("Content-Type", "application/json").body(body);
        }

        req.send()
            .await
            .map_err(|e| RestError::new(0, "NetworkError", format!("Request failed: {}", e)))
    }

    async fn read(response: ReqwestResponse) -> Result<(u16, String), RestError> {
        let status = response.status().as_u16();
        let success = response.status().is_success();
        let body = response.text().await.map_err(|e| {
            RestError::new(0, "ParseError", format!("Failed to read response: {}", e))
        })?;

        if !success {
            let parsed = serde_json::from_str::<ErrorBody>(&body).unwrap_or_else(|_| ErrorBody {
                message: (!body.trim().is_empty()).then(|| body.clone()),
                ..ErrorBody::default()
            });
            return Err(parsed.into_error(status));
        }

        Ok((status, body))
    }
}
