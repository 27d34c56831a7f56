use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::cookie::{CookieStore, Jar};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info};
use url::Url;

use super::{ForumClient, ForumError, RawPost, RawPostDetail};

/// Piazza's JSON-RPC endpoint.
pub const DEFAULT_API_URL: &str = "https://piazza.com/logic/api";

const USER_AGENT_HEADER: &str = "piazza-pending-notifier/0.1";
const SESSION_COOKIE: &str = "session_id";
const CSRF_HEADER: &str = "CSRF-Token";

/// The feed endpoint pages; ask for more than any course will ever have.
const FEED_LIMIT: u32 = 999_999;

/// Session-holding client for a single Piazza course.
///
/// Authentication is cookie based: `login` stores the session cookie in the
/// jar and every later call echoes it back as the CSRF token.
pub struct PiazzaClient {
    client: Client,
    jar: Arc<Jar>,
    api_url: Url,
    course_id: String,
}

#[derive(Debug, Deserialize)]
struct RpcEnvelope {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct FeedResult {
    feed: Vec<RawPost>,
}

impl PiazzaClient {
    /// Build a client for `course_id`. No request is made until [`login`](Self::login).
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn new(api_url: Url, course_id: impl Into<String>) -> Result<Self, ForumError> {
        let jar = Arc::new(Jar::default());
        let client = Client::builder()
            .user_agent(USER_AGENT_HEADER)
            .cookie_provider(Arc::clone(&jar))
            .timeout(Duration::from_secs(60))
            .build()?;

        Ok(Self {
            client,
            jar,
            api_url,
            course_id: course_id.into(),
        })
    }

    /// Start a session with the given credentials.
    ///
    /// # Errors
    ///
    /// Returns [`ForumError::Login`] if Piazza rejects the credentials.
    pub async fn login(&self, email: &str, password: &str) -> Result<(), ForumError> {
        let result = self
            .call("user.login", json!({ "email": email, "pass": password }))
            .await
            .map_err(|e| match e {
                ForumError::Api { message, .. } => ForumError::Login(message),
                other => other,
            })?;

        match result {
            Value::String(s) if s == "OK" => {
                info!(email = %email, "Logged in to Piazza");
                Ok(())
            }
            other => Err(ForumError::Login(describe(&other))),
        }
    }

    fn session_token(&self) -> Option<String> {
        let cookies = self.jar.cookies(&self.api_url)?;
        let cookies = cookies.to_str().ok()?;
        cookies.split(';').find_map(|pair| {
            let (name, value) = pair.trim().split_once('=')?;
            (name == SESSION_COOKIE).then(|| value.to_string())
        })
    }

    async fn call(&self, method: &str, params: Value) -> Result<Value, ForumError> {
        debug!(method, "Piazza API call");

        let mut request = self
            .client
            .post(self.api_url.clone())
            .json(&json!({ "method": method, "params": params }));
        if let Some(token) = self.session_token() {
            request = request.header(CSRF_HEADER, token);
        }

        let envelope: RpcEnvelope = request.send().await?.error_for_status()?.json().await?;

        if let Some(error) = envelope.error.filter(|e| !e.is_null()) {
            return Err(ForumError::Api {
                method: method.to_string(),
                message: describe(&error),
            });
        }

        envelope.result.ok_or_else(|| ForumError::EmptyResult {
            method: method.to_string(),
        })
    }

    async fn call_as<T: DeserializeOwned>(
        &self,
        method: &str,
        params: Value,
    ) -> Result<T, ForumError> {
        let result = self.call(method, params).await?;
        serde_json::from_value(result).map_err(|source| ForumError::Decode {
            method: method.to_string(),
            source,
        })
    }
}

#[async_trait]
impl ForumClient for PiazzaClient {
    fn course_id(&self) -> &str {
        &self.course_id
    }

    async fn get_feed(&self) -> Result<Vec<RawPost>, ForumError> {
        let result: FeedResult = self
            .call_as(
                "network.get_my_feed",
                json!({ "nid": self.course_id, "limit": FEED_LIMIT, "offset": 0 }),
            )
            .await?;
        Ok(result.feed)
    }

    async fn get_post(&self, post_id: &str) -> Result<RawPostDetail, ForumError> {
        self.call_as(
            "content.get",
            json!({ "cid": post_id, "nid": self.course_id }),
        )
        .await
    }
}

fn describe(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
