//! JSON requests and the mapping of their failures

use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;
use url::Url;

use crate::errors::ConnectivityError;

/// JSON request handler bound to a base URL
#[derive(Debug, Clone)]
pub struct JsonHandler {
    client: Client,
    base_url: Url,
}

impl JsonHandler {
    pub fn new(client: Client, base_url: Url) -> Self {
        Self { client, base_url }
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Resolve `path` below the base URL
    ///
    /// # Errors
    ///
    /// Returns `ConnectivityError::Implementation` if the path cannot be joined
    pub fn endpoint(&self, path: &str) -> Result<Url, ConnectivityError> {
        self.base_url
            .join(path.trim_start_matches('/'))
            .map_err(|e| ConnectivityError::Implementation {
                message: format!("invalid endpoint {}: {}", path, e),
                status: None,
            })
    }

    /// GET `path` and decode the JSON answer
    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ConnectivityError> {
        let url = self.endpoint(path)?;
        debug!("GET {}", url);
        self.send(self.client.get(url.clone()), &url).await
    }

    /// POST `body` as JSON to `path` and decode the JSON answer
    pub async fn post<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ConnectivityError> {
        let url = self.endpoint(path)?;
        debug!("POST {}", url);
        self.send(self.client.post(url.clone()).json(body), &url).await
    }

    async fn send<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
        url: &Url,
    ) -> Result<T, ConnectivityError> {
        let response = request.send().await?;
        let response = Self::check_status(response, url)?;
        let body = response.bytes().await?;
        serde_json::from_slice(&body).map_err(|e| ConnectivityError::Implementation {
            message: format!("malformed answer from {}: {}", url, e),
            status: None,
        })
    }

    fn check_status(response: Response, url: &Url) -> Result<Response, ConnectivityError> {
        let status = response.status();
        if status.is_success() {
            Ok(response)
        } else {
            Err(ConnectivityError::from_status(status.as_u16(), url.as_str()))
        }
    }
}
