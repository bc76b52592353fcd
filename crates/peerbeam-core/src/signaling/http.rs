//! HTTP client for the rendezvous API.

use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;

use super::messages::{
    AnswerRequest, AnswerResponse, CreateSessionRequest, CreateSessionResponse, ErrorResponse,
    GetSessionResponse, IceRequest,
};
use super::{IceBatch, IceOrigin, Signaling};
use crate::code::SessionCode;
use crate::error::{Error, Result};
use crate::transport::{IceCandidate, SessionDescription};

/// Rendezvous client speaking the JSON HTTP API.
#[derive(Debug, Clone)]
pub struct HttpSignalingClient {
    client: Client,
    base_url: String,
}

impl HttpSignalingClient {
    /// Create a client for the server at `base_url` (e.g. `http://127.0.0.1:3000`).
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(Client::new(), base_url)
    }

    /// Create a client reusing an existing `reqwest` client.
    pub fn with_client(client: Client, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { client, base_url }
    }

    /// Base URL requests go to.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Decode a successful body, or turn the error body into an [`Error`].
    async fn decode<T: DeserializeOwned>(response: Response, code: Option<&SessionCode>) -> Result<T> {
        let status = response.status();
        if status.is_success() {
            return response
                .json::<T>()
                .await
                .map_err(|e| Error::Signaling(format!("invalid response body: {e}")));
        }

        let message = response
            .json::<ErrorResponse>()
            .await
            .map_or_else(|_| status.to_string(), |body| body.error);

        match (status, code) {
            (StatusCode::NOT_FOUND, Some(code)) => Err(Error::SessionNotFound(code.to_string())),
            _ => Err(Error::Signaling(format!("{status}: {message}"))),
        }
    }
}

#[async_trait]
impl Signaling for HttpSignalingClient {
    async fn create_session(&self, offer: &SessionDescription) -> Result<SessionCode> {
        let response = self
            .client
            .post(self.url("/session"))
            .json(&CreateSessionRequest {
                offer: offer.clone(),
            })
            .send()
            .await?;
        let body: CreateSessionResponse = Self::decode(response, None).await?;
        Ok(body.code)
    }

    async fn get_session(&self, code: &SessionCode) -> Result<SessionDescription> {
        let response = self
            .client
            .get(self.url(&format!("/session/{code}")))
            .send()
            .await?;
        let body: GetSessionResponse = Self::decode(response, Some(code)).await?;
        Ok(body.offer)
    }

    async fn post_answer(&self, code: &SessionCode, answer: &SessionDescription) -> Result<()> {
        let response = self
            .client
            .post(self.url(&format!("/answer/{code}")))
            .json(&AnswerRequest {
                answer: answer.clone(),
            })
            .send()
            .await?;
        Self::decode::<serde_json::Value>(response, Some(code)).await?;
        Ok(())
    }

    async fn get_answer(&self, code: &SessionCode) -> Result<Option<SessionDescription>> {
        let response = self
            .client
            .get(self.url(&format!("/answer/{code}")))
            .send()
            .await?;
        let body: AnswerResponse = Self::decode(response, Some(code)).await?;
        Ok(body.answer)
    }

    async fn post_ice(
        &self,
        code: &SessionCode,
        candidate: &IceCandidate,
        origin: IceOrigin,
    ) -> Result<()> {
        let response = self
            .client
            .post(self.url(&format!("/ice/{code}")))
            .json(&IceRequest {
                candidate: candidate.clone(),
                origin,
            })
            .send()
            .await?;
        Self::decode::<serde_json::Value>(response, Some(code)).await?;
        Ok(())
    }

    async fn get_ice(
        &self,
        code: &SessionCode,
        origin: IceOrigin,
        since: usize,
    ) -> Result<IceBatch> {
        let response = self
            .client
            .get(self.url(&format!("/ice/{code}")))
            .query(&[("type", origin.as_str().to_string()), ("lastIndex", since.to_string())])
            .send()
            .await?;
        Self::decode(response, Some(code)).await
    }

    async fn delete_session(&self, code: &SessionCode) -> Result<()> {
        let response = self
            .client
            .delete(self.url(&format!("/session/{code}")))
            .send()
            .await?;
        if !response.status().is_success() {
            tracing::debug!("Delete of session {} returned {}", code, response.status());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_normalized() {
        let client = HttpSignalingClient::new("http://localhost:3000/");
        assert_eq!(client.base_url(), "http://localhost:3000");
        assert_eq!(client.url("/session"), "http://localhost:3000/session");
    }
}
