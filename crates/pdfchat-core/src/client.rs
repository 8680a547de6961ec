use async_trait::async_trait;
use reqwest::{Client, Url};
use serde::{Deserialize, Serialize};

use crate::config::ClientSettings;
use crate::error::AskError;

#[derive(Serialize)]
struct QueryRequest<'a> {
    query: &'a str,
}

#[derive(Deserialize)]
struct QueryResponse {
    response: String,
}

/// Anything that can answer a query. The session only talks to this trait.
#[async_trait]
pub trait QaEndpoint: Send + Sync {
    async fn ask(&self, query: &str) -> Result<String, AskError>;
}

/// HTTP client for the QA endpoint
#[derive(Clone, Debug)]
pub struct QaClient {
    client: Client,
    endpoint: Url,
}

impl QaClient {
    pub fn new(settings: &ClientSettings) -> Result<Self, AskError> {
        let mut builder = Client::builder();
        if let Some(timeout) = settings.timeout {
            builder = builder.timeout(timeout);
        }

        Ok(Self {
            client: builder.build()?,
            endpoint: settings.endpoint.clone(),
        })
    }

    /// Short `host[:port]` form of the endpoint for display.
    pub fn endpoint_label(&self) -> String {
        let host = self.endpoint.host_str().unwrap_or_default();
        match self.endpoint.port() {
            Some(port) => format!("{host}:{port}"),
            None => host.to_string(),
        }
    }

    /// Probe the backend's status route at the root of the endpoint's origin.
    pub async fn health(&self) -> Result<(), AskError> {
        let mut root = self.endpoint.clone();
        root.set_path("/");
        root.set_query(None);

        let response = self.client.get(root).send().await?;
        if !response.status().is_success() {
            return Err(AskError::Status {
                status: response.status().as_u16(),
                body: String::new(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl QaEndpoint for QaClient {
    async fn ask(&self, query: &str) -> Result<String, AskError> {
        let response = self
            .client
            .post(self.endpoint.clone())
            .json(&QueryRequest { query })
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(AskError::Status { status, body });
        }

        // Decode separately so a bad body is Malformed, not Transport
        let bytes = response.bytes().await?;
        let answer: QueryResponse = serde_json::from_slice(&bytes)?;
        Ok(answer.response)
    }
}
