//! services/elibrary/src/adapters/http.rs
//!
//! The outbound HTTP client. Every request goes through `HttpClient::send`,
//! which attaches the bearer token and turns responses into `PortResult`s.
//! A 401 anywhere evicts the session before the error reaches the caller.
//! There are no retries: the synchronization layer decides what happens next.

use crate::config::ConfigError;
use crate::error::ClientError;
use crate::session::Session;
use elibrary_core::ports::{PortError, PortResult};
use reqwest::header::{HeaderMap, AUTHORIZATION};
use reqwest::multipart::Form;
use reqwest::{Client, Method, Response, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, error};

/// What to put in the request body.
pub enum RequestBody {
    Empty,
    Json(serde_json::Value),
    Multipart(Form),
}

/// Extra per-request settings.
#[derive(Debug, Default, Clone)]
pub struct RequestOptions {
    pub headers: HeaderMap,
    pub query: Vec<(String, String)>,
}

#[derive(Clone)]
pub struct HttpClient {
    client: Client,
    base_url: Url,
    session: Arc<Session>,
}

impl HttpClient {
    /// `base_url` is the API root, e.g. `http://localhost:5000/api`.
    pub fn new(base_url: &str, session: Arc<Session>) -> Result<Self, ClientError> {
        let base_url = Url::parse(base_url.trim_end_matches('/')).map_err(|e| {
            ConfigError::InvalidValue("API_URL".to_string(), format!("'{}': {}", base_url, e))
        })?;
        if base_url.cannot_be_a_base() {
            return Err(ConfigError::InvalidValue(
                "API_URL".to_string(),
                format!("'{}' cannot carry a path", base_url),
            )
            .into());
        }
        let client = Client::builder().build()?;
        Ok(Self {
            client,
            base_url,
            session,
        })
    }

    /// Joins `segments` onto the API root. Each segment is percent-encoded,
    /// so ids containing `/`, `?` or `#` stay inside their segment.
    fn url(&self, segments: &[&str]) -> PortResult<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| PortError::Unexpected(format!("{} cannot carry a path", self.base_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// Sends one request and returns the response if its status is 2xx.
    pub async fn send(
        &self,
        method: Method,
        path: &[&str],
        body: RequestBody,
        options: RequestOptions,
    ) -> PortResult<Response> {
        let url = self.url(path)?;
        debug!("{} {}", method, url);

        let mut request = self
            .client
            .request(method.clone(), url.clone())
            .headers(options.headers);
        if !options.query.is_empty() {
            request = request.query(&options.query);
        }
        if let Some(token) = self.session.token() {
            request = request.header(AUTHORIZATION, format!("Bearer {}", token));
        }
        request = match body {
            RequestBody::Empty => request,
            RequestBody::Json(value) => request.json(&value),
            RequestBody::Multipart(form) => request.multipart(form),
        };

        let response = request.send().await.map_err(|e| {
            error!("{} {} failed: {:?}", method, url, e);
            PortError::Network(e.to_string())
        })?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        if status == StatusCode::UNAUTHORIZED {
            self.session.expire();
            return Err(PortError::Unauthorized);
        }

        let message = error_message(status, response.text().await.unwrap_or_default());
        error!("{} {} returned {}: {}", method, url, status.as_u16(), message);
        Err(PortError::Remote {
            status: status.as_u16(),
            message,
        })
    }

    pub async fn get_json<T: DeserializeOwned>(&self, path: &[&str]) -> PortResult<T> {
        let response = self
            .send(Method::GET, path, RequestBody::Empty, RequestOptions::default())
            .await?;
        decode(response).await
    }

    pub async fn post_json<B: Serialize, T: DeserializeOwned>(&self, path: &[&str], body: &B) -> PortResult<T> {
        let response = self
            .send(Method::POST, path, json_body(body)?, RequestOptions::default())
            .await?;
        decode(response).await
    }

    pub async fn put_json<B: Serialize, T: DeserializeOwned>(&self, path: &[&str], body: &B) -> PortResult<T> {
        let response = self
            .send(Method::PUT, path, json_body(body)?, RequestOptions::default())
            .await?;
        decode(response).await
    }

    pub async fn post_multipart<T: DeserializeOwned>(&self, path: &[&str], form: Form) -> PortResult<T> {
        let response = self
            .send(Method::POST, path, RequestBody::Multipart(form), RequestOptions::default())
            .await?;
        decode(response).await
    }

    /// Any 2xx counts as deleted; the body is ignored.
    pub async fn delete(&self, path: &[&str]) -> PortResult<()> {
        self.send(Method::DELETE, path, RequestBody::Empty, RequestOptions::default())
            .await?;
        Ok(())
    }
}

fn json_body<B: Serialize>(body: &B) -> PortResult<RequestBody> {
    serde_json::to_value(body)
        .map(RequestBody::Json)
        .map_err(|e| PortError::Unexpected(format!("cannot encode request body: {}", e)))
}

async fn decode<T: DeserializeOwned>(response: Response) -> PortResult<T> {
    let bytes = response
        .bytes()
        .await
        .map_err(|e| PortError::Network(e.to_string()))?;
    serde_json::from_slice(&bytes)
        .map_err(|e| PortError::Unexpected(format!("cannot decode response body: {}", e)))
}

/// Picks the most useful message out of an error response body.
fn error_message(status: StatusCode, body: String) -> String {
    if let Ok(serde_json::Value::Object(map)) = serde_json::from_str::<serde_json::Value>(&body) {
        for field in ["message", "error"] {
            if let Some(serde_json::Value::String(msg)) = map.get(field) {
                return msg.clone();
            }
        }
    }
    let body = body.trim();
    if !body.is_empty() {
        return body.to_string();
    }
    status
        .canonical_reason()
        .unwrap_or("Request failed")
        .to_string()
}
