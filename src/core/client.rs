use async_trait::async_trait;
use reqwest::header::HeaderMap;
use reqwest::Client;
use std::collections::HashMap;
use std::time::Duration;
use tracing::debug;

use crate::error::RemoteError;
use crate::models::ServerConfig;

/// Status, headers and body of a server response
#[derive(Debug, Clone, Default)]
pub struct HttpResponse {
    pub status: u16,
    /// Header names are lower-case
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            headers: HashMap::new(),
            body: body.into(),
        }
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.insert(name.to_lowercase(), value.to_string());
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_lowercase()).map(String::as_str)
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// The server surface the tracker talks to
#[async_trait]
pub trait RemoteClient: Send + Sync {
    async fn get(&self, url: &str) -> Result<HttpResponse, RemoteError>;

    async fn post_form(
        &self,
        url: &str,
        form: &[(String, String)],
        headers: &[(String, String)],
    ) -> Result<HttpResponse, RemoteError>;
}

/// reqwest-backed client with basic authentication on every request
pub struct JenkinsClient {
    client: Client,
    username: Option<String>,
    password: Option<String>,
}

impl JenkinsClient {
    pub fn new(config: &ServerConfig) -> Result<Self, RemoteError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .danger_accept_invalid_certs(config.accept_invalid_certs)
            .build()
            .map_err(|e| RemoteError::RequestFailed(e.to_string()))?;

        Ok(Self {
            client,
            username: config.username.clone(),
            password: config.password.clone(),
        })
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.username {
            Some(user) => request.basic_auth(user, self.password.as_ref()),
            None => request,
        }
    }

    async fn into_response(response: reqwest::Response) -> Result<HttpResponse, RemoteError> {
        let status = response.status().as_u16();
        let headers = collect_headers(response.headers());
        let body = response.bytes().await?.to_vec();
        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }
}

fn collect_headers(headers: &HeaderMap) -> HashMap<String, String> {
    headers
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_lowercase(), v.to_string()))
        })
        .collect()
}

#[async_trait]
impl RemoteClient for JenkinsClient {
    async fn get(&self, url: &str) -> Result<HttpResponse, RemoteError> {
        debug!("GET {}", url);
        let response = self.authorize(self.client.get(url)).send().await?;
        Self::into_response(response).await
    }

    async fn post_form(
        &self,
        url: &str,
        form: &[(String, String)],
        headers: &[(String, String)],
    ) -> Result<HttpResponse, RemoteError> {
        debug!("POST {}", url);
        let mut request = self.authorize(self.client.post(url));
        for (name, value) in headers {
            request = request.header(name.as_str(), value.as_str());
        }
        if !form.is_empty() {
            request = request.form(form);
        }
        let response = request.send().await?;
        Self::into_response(response).await
    }
}
