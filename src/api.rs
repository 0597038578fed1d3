use serde::de::DeserializeOwned;
use url::Url;

use crate::error::Error;
use crate::interceptor::BearerAuth;
use crate::types::{
    Credentials, LoginResponse, RegisterResponse, RegisterUser, UserId, UserRecord,
};

const DEFAULT_BASE_URL: &str = "http://localhost:9090/api/";

/// Social network API configuration.
///
/// ```rust,ignore
/// use socnet_session::ApiConfig;
///
/// let config = ApiConfig::new("https://socnet.example.com/api".parse()?);
/// // or
/// let config = ApiConfig::from_env()?;
/// ```
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct ApiConfig {
    pub(crate) base_url: Url,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.parse().expect("valid default URL"),
        }
    }
}

impl ApiConfig {
    /// Every endpoint path is resolved relative to `base_url`.
    #[must_use]
    pub fn new(base_url: Url) -> Self {
        Self::default().with_base_url(base_url)
    }

    /// Create config from environment variables.
    ///
    /// # Optional env vars
    /// - `SOCNET_API_URL`: API base URL (default `http://localhost:9090/api/`)
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if `SOCNET_API_URL` is set but not a valid
    /// absolute URL.
    pub fn from_env() -> Result<Self, Error> {
        let mut config = Self::default();
        if let Ok(url_str) = std::env::var("SOCNET_API_URL") {
            let url: Url = url_str
                .parse()
                .map_err(|e| Error::Config(format!("SOCNET_API_URL: {e}")))?;
            config = config.with_base_url(url);
        }
        Ok(config)
    }

    /// Override the API base URL. A trailing slash is added when missing so
    /// that endpoint paths extend the base instead of replacing its last segment.
    #[must_use]
    pub fn with_base_url(mut self, mut url: Url) -> Self {
        if !url.path().ends_with('/') {
            let path = format!("{}/", url.path());
            url.set_path(&path);
        }
        self.base_url = url;
        self
    }

    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub(crate) fn endpoint(&self, path: &str) -> Result<Url, Error> {
        self.base_url
            .join(path)
            .map_err(|e| Error::Config(format!("invalid endpoint {path}: {e}")))
    }
}

/// Client for the social network REST API.
///
/// Cloning is cheap; clones share the HTTP connection pool and the
/// [`BearerAuth`] rule, so a session armed through one clone authenticates
/// requests made through all of them.
#[derive(Debug, Clone)]
pub struct ApiClient {
    config: ApiConfig,
    http: reqwest::Client,
    auth: BearerAuth,
}

impl ApiClient {
    #[must_use]
    pub fn new(config: ApiConfig) -> Self {
        Self {
            config,
            http: reqwest::Client::new(),
            auth: BearerAuth::new(),
        }
    }

    /// Use a custom HTTP client (for connection pool reuse or testing).
    #[must_use]
    pub fn with_http_client(mut self, client: reqwest::Client) -> Self {
        self.http = client;
        self
    }

    #[must_use]
    pub fn config(&self) -> &ApiConfig {
        &self.config
    }

    /// The augmentation rule applied to every request.
    #[must_use]
    pub fn auth(&self) -> &BearerAuth {
        &self.auth
    }

    /// Register a new user.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Network`] if no response was received, or
    /// [`Error::Api`] if the server rejected the registration.
    pub async fn register(&self, user: &RegisterUser) -> Result<RegisterResponse, Error> {
        let url = self.config.endpoint("user/register")?;
        let response = self
            .send(self.http.post(url).json(user), "register")
            .await?;
        Self::decode(response, "register").await
    }

    /// Exchange credentials for a token.
    ///
    /// Does not establish a session; hand the result to
    /// [`SessionManager`](crate::SessionManager).
    ///
    /// # Errors
    ///
    /// Returns [`Error::Network`] if no response was received, or
    /// [`Error::Api`] if the credentials were rejected.
    pub async fn login(&self, credentials: &Credentials) -> Result<LoginResponse, Error> {
        let url = self.config.endpoint("login")?;
        let response = self
            .send(self.http.post(url).json(credentials), "login")
            .await?;
        Self::decode(response, "login").await
    }

    /// Fetch a user record by id.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Network`] if no response was received, or
    /// [`Error::Api`] if the user does not exist or access was denied.
    pub async fn get_user_by_id(&self, user_id: &UserId) -> Result<UserRecord, Error> {
        let path = format!("user/get/{}", urlencoding::encode(user_id.as_str()));
        let url = self.config.endpoint(&path)?;
        let response = self.send(self.http.get(url), "get user").await?;
        Self::decode(response, "get user").await
    }

    /// Search users by name prefixes.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Network`] if no response was received, or
    /// [`Error::Api`] if the server rejected the query.
    pub async fn search_users(
        &self,
        first_name: &str,
        last_name: &str,
    ) -> Result<Vec<UserRecord>, Error> {
        let mut url = self.config.endpoint("user/search")?;
        url.query_pairs_mut()
            .append_pair("first_name", first_name)
            .append_pair("last_name", last_name);
        let response = self.send(self.http.get(url), "search users").await?;
        Self::decode(response, "search users").await
    }

    /// Ask the server to revoke the token currently attached to requests.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Network`] if no response was received, or
    /// [`Error::Api`] if the server refused.
    pub async fn revoke(&self) -> Result<(), Error> {
        let url = self.config.endpoint("logout")?;
        self.send(self.http.post(url), "logout").await?;
        Ok(())
    }

    async fn send(
        &self,
        request: reqwest::RequestBuilder,
        operation: &'static str,
    ) -> Result<reqwest::Response, Error> {
        let request = self.auth.apply(request);
        tracing::debug!(operation, authenticated = self.auth.is_armed(), "Sending API request");

        let response = request.send().await.map_err(|e| {
            tracing::warn!(operation, error = %e, "No response from API");
            Error::Network(e)
        })?;

        Self::ensure_success(response, operation).await
    }

    async fn decode<T: DeserializeOwned>(
        response: reqwest::Response,
        operation: &'static str,
    ) -> Result<T, Error> {
        response
            .json::<T>()
            .await
            .map_err(|source| Error::InvalidResponse { operation, source })
    }

    /// Checks HTTP response status; returns the response on success or an error with details.
    async fn ensure_success(
        response: reqwest::Response,
        operation: &'static str,
    ) -> Result<reqwest::Response, Error> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        let (message, code) = parse_error_body(&body);
        tracing::debug!(operation, status, message = %message, "API request failed");
        Err(Error::Api {
            status,
            message,
            code,
        })
    }
}

/// Extracts `(message, code)` from an error body.
///
/// The documented shape is `{"error": "...", "code": "..."}`; some handlers
/// serialize their error type directly (`{"Code": 401, "Message": "..."}`),
/// and proxies may answer with plain text.
fn parse_error_body(body: &str) -> (String, Option<String>) {
    let Ok(json) = serde_json::from_str::<serde_json::Value>(body) else {
        return (body.trim().to_owned(), None);
    };

    let field = |names: &[&str]| {
        names.iter().find_map(|name| match json.get(*name)? {
            serde_json::Value::String(s) => Some(s.clone()),
            serde_json::Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
    };

    let message = field(&["error", "message", "Message"]).unwrap_or_default();
    let code = field(&["code", "Code"]);
    (message, code)
}
