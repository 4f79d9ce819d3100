use super::api_headers;
use loggen_core::{Batch, Error, Result, Sender};
use reqwest::{
    Client, Response,
    header::{CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue},
};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Longest response body kept in a rejection error.
const MAX_ERROR_BODY: usize = 512;

/// Posts each batch to a fixed URL.
///
/// Credentials and the content type are installed as default headers on the
/// client, so a send is a single `POST` with the batch as its body. Failed
/// sends are not retried.
#[derive(Debug, Clone)]
pub struct HttpSender {
    client: Client,
    endpoint: String,
}

impl HttpSender {
    /// # Errors
    ///
    /// Returns [`Error::Transport`] if a header value is not valid ASCII or
    /// the HTTP client cannot be built.
    pub fn new(
        endpoint: impl Into<String>,
        content_type: &str,
        api_key: &str,
        api_secret: &str,
        timeout: Duration,
    ) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            CONTENT_TYPE,
            HeaderValue::from_str(content_type)
                .map_err(|e| Error::transport(format!("invalid content type: {e}")))?,
        );
        for (name, value) in api_headers(api_key, api_secret) {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| Error::transport(format!("invalid header name {name}: {e}")))?;
            let mut value = HeaderValue::from_str(&value)
                .map_err(|e| Error::transport(format!("invalid value for {name}: {e}")))?;
            value.set_sensitive(true);
            headers.insert(name, value);
        }

        let client = Client::builder()
            .timeout(timeout)
            .user_agent(format!("loggen/{}", env!("CARGO_PKG_VERSION")))
            .default_headers(headers)
            .build()
            .map_err(|e| Error::transport(format!("unable to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn check(response: Response) -> Result<()> {
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let mut body = response
            .text()
            .await
            .unwrap_or_else(|_| "<unreadable body>".to_string());
        if body.len() > MAX_ERROR_BODY {
            let mut end = MAX_ERROR_BODY;
            while !body.is_char_boundary(end) {
                end -= 1;
            }
            body.truncate(end);
        }

        Err(Error::Rejected {
            status: status.as_u16(),
            body,
        })
    }
}

impl Sender for HttpSender {
    async fn send(&self, batch: Batch, cancel: &CancellationToken) -> Result<()> {
        let request = self
            .client
            .post(&self.endpoint)
            .body(batch.into_bytes())
            .send();

        let response = tokio::select! {
            biased;
            response = request => response.map_err(|e| {
                if e.is_timeout() {
                    Error::transport(format!("request to {} timed out", self.endpoint))
                } else {
                    Error::transport(format!("request to {} failed: {e}", self.endpoint))
                }
            })?,
            () = cancel.cancelled() => {
                return Err(Error::transport(format!(
                    "request to {} cancelled by shutdown",
                    self.endpoint
                )));
            }
        };

        Self::check(response).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::senders::{API_KEY_HEADER, API_SECRET_HEADER};
    use wiremock::{
        Mock, MockServer, ResponseTemplate,
        matchers::{body_bytes, header, method, path},
    };

    fn sender(server: &MockServer, key: &str, secret: &str) -> HttpSender {
        HttpSender::new(
            format!("{}/loki/api/v1/push", server.uri()),
            "application/json",
            key,
            secret,
            Duration::from_secs(5),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn posts_body_with_credentials() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/loki/api/v1/push"))
            .and(header(API_KEY_HEADER, "key"))
            .and(header(API_SECRET_HEADER, "secret"))
            .and(header("content-type", "application/json"))
            .and(body_bytes(b"{\"streams\":[]}".to_vec()))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        sender(&server, "key", "secret")
            .send(Batch::from_static(b"{\"streams\":[]}"), &CancellationToken::new())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn empty_credentials_are_not_sent() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        sender(&server, "", "")
            .send(Batch::from_static(b"x"), &CancellationToken::new())
            .await
            .unwrap();

        let requests = server.received_requests().await.unwrap();
        assert_eq!(requests.len(), 1);
        assert!(!requests[0].headers.contains_key(API_KEY_HEADER));
        assert!(!requests[0].headers.contains_key(API_SECRET_HEADER));
        let agent = requests[0].headers.get("user-agent").unwrap();
        assert!(agent.to_str().unwrap().starts_with("loggen/"));
    }

    #[tokio::test]
    async fn non_success_status_is_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_string("ingester unavailable"))
            .mount(&server)
            .await;

        let err = sender(&server, "", "")
            .send(Batch::from_static(b"x"), &CancellationToken::new())
            .await
            .unwrap_err();

        assert_eq!(
            err,
            Error::Rejected {
                status: 500,
                body: "ingester unavailable".to_string()
            }
        );
    }

    #[tokio::test]
    async fn long_rejection_bodies_are_truncated() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400).set_body_string("e".repeat(4096)))
            .mount(&server)
            .await;

        let err = sender(&server, "", "")
            .send(Batch::from_static(b"x"), &CancellationToken::new())
            .await
            .unwrap_err();

        match err {
            Error::Rejected { status, body } => {
                assert_eq!(status, 400);
                assert_eq!(body.len(), MAX_ERROR_BODY);
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_a_transport_error() {
        // Reserve a free port, then release it so nothing is listening there.
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let sender = HttpSender::new(
            format!("http://127.0.0.1:{port}/loki/api/v1/push"),
            "application/json",
            "",
            "",
            Duration::from_secs(5),
        )
        .unwrap();

        let err = sender
            .send(Batch::from_static(b"x"), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Transport { .. }), "{err:?}");
    }

    #[tokio::test]
    async fn shutdown_abandons_a_pending_request() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(204).set_delay(Duration::from_secs(30)))
            .mount(&server)
            .await;

        let cancel = CancellationToken::new();
        let canceller = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            canceller.cancel();
        });

        let sender = sender(&server, "", "");
        let err = tokio::time::timeout(
            Duration::from_secs(2),
            sender.send(Batch::from_static(b"x"), &cancel),
        )
        .await
        .expect("send ignored the shutdown token")
        .unwrap_err();

        match err {
            Error::Transport { context } => assert!(context.contains("cancelled"), "{context}"),
            other => panic!("unexpected error {other:?}"),
        }
    }
}
