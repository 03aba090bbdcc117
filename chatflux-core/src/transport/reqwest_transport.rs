//! `reqwest`-backed transport

use async_trait::async_trait;
use futures_util::TryStreamExt;

use super::{HttpTransport, HttpTransportRequest, HttpTransportResponse, HttpTransportStreamResponse};
use crate::error::LlmError;

/// Production transport over a pooled `reqwest::Client`.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }

    fn build(&self, request: HttpTransportRequest) -> reqwest::RequestBuilder {
        let mut builder = self
            .client
            .request(request.method, &request.url)
            .headers(request.headers);
        if let Some(body) = request.body {
            builder = builder.json(&body);
        }
        builder
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn execute_json(
        &self,
        request: HttpTransportRequest,
    ) -> Result<HttpTransportResponse, LlmError> {
        let response = self.build(request).send().await?;
        let status = response.status().as_u16();
        let headers = response.headers().clone();
        let body = response.bytes().await?.to_vec();
        Ok(HttpTransportResponse {
            status,
            headers,
            body,
        })
    }

    async fn execute_stream(
        &self,
        request: HttpTransportRequest,
    ) -> Result<HttpTransportStreamResponse, LlmError> {
        let response = self.build(request).send().await?;
        let status = response.status().as_u16();
        let headers = response.headers().clone();
        let body = response
            .bytes_stream()
            .map_err(|e| LlmError::StreamError(format!("Stream error: {e}")));
        Ok(HttpTransportStreamResponse {
            status,
            headers,
            body: Box::pin(body),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::StreamExt;
    use reqwest::header::HeaderMap;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn posts_json_and_buffers_response() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(body_json(serde_json::json!({"model": "m"})))
            .respond_with(ResponseTemplate::new(200).set_body_string("{\"ok\":1}"))
            .mount(&server)
            .await;

        let transport = ReqwestTransport::new(reqwest::Client::new());
        let resp = transport
            .execute_json(HttpTransportRequest::post_json(
                format!("{}/v1/chat/completions", server.uri()),
                HeaderMap::new(),
                serde_json::json!({"model": "m"}),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status, 200);
        assert_eq!(resp.json().unwrap()["ok"], 1);
    }

    #[tokio::test]
    async fn streams_body_bytes() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/events"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/event-stream")
                    .set_body_string("data: a\n\ndata: b\n\n"),
            )
            .mount(&server)
            .await;

        let transport = ReqwestTransport::new(reqwest::Client::new());
        let resp = transport
            .execute_stream(HttpTransportRequest::get(
                format!("{}/events", server.uri()),
                HeaderMap::new(),
            ))
            .await
            .unwrap();
        assert!(resp.is_success());
        let bytes: Vec<u8> = resp
            .body
            .map(|c| c.unwrap().to_vec())
            .concat()
            .await;
        assert_eq!(bytes, b"data: a\n\ndata: b\n\n");
    }
}
