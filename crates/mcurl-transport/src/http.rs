use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, Method, Url};

use mcurl_common::config::Config;
use mcurl_common::{McurlError, Result};

use crate::{BoxFuture, Exchange, RequestFailure, SendErrorKind, Transport};

/// Sends the configured request over HTTP(S) with a shared `reqwest` client.
///
/// Method, URL and headers are parsed once here, so every concurrent request
/// only clones already validated values.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    method: Method,
    url: Url,
    headers: HeaderMap,
    body: Vec<u8>,
}

impl HttpTransport {
    pub fn new(config: &Config) -> Result<Self> {
        let method = Method::from_bytes(config.method.as_bytes())
            .map_err(|_| McurlError::InvalidMethod(config.method.clone()))?;

        let url = Url::parse(&config.url).map_err(|e| McurlError::InvalidUrl {
            url: config.url.clone(),
            reason: e.to_string(),
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(McurlError::InvalidUrl {
                url: config.url.clone(),
                reason: format!("unsupported scheme '{}'", url.scheme()),
            });
        }

        let mut headers = HeaderMap::with_capacity(config.headers.len());
        for (name, value) in &config.headers {
            let invalid = || McurlError::InvalidHeader(format!("{name}: {value}"));
            let name = HeaderName::from_bytes(name.as_bytes()).map_err(|_| invalid())?;
            let value = HeaderValue::from_str(value).map_err(|_| invalid())?;
            headers.insert(name, value);
        }

        let mut builder = Client::builder();
        if let Some(timeout) = config.request_timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder.build().map_err(|e| McurlError::Client(e.to_string()))?;

        Ok(Self { client, method, url, headers, body: config.body.clone() })
    }
}

impl Transport for HttpTransport {
    type Request = reqwest::Request;

    fn prepare(&self, _seq: usize) -> Result<reqwest::Request> {
        let mut builder = self
            .client
            .request(self.method.clone(), self.url.clone())
            .headers(self.headers.clone());
        if !self.body.is_empty() {
            builder = builder.body(self.body.clone());
        }
        builder.build().map_err(|e| McurlError::Request(e.to_string()))
    }

    fn perform(&self, request: reqwest::Request) -> BoxFuture<'_, core::result::Result<Exchange, RequestFailure>> {
        Box::pin(async move {
            let mut response = self.client.execute(request).await.map_err(send_failure)?;
            let status = response.status().as_u16();
            let mut bytes = 0u64;
            // drain everything so the connection can go back to the pool
            loop {
                match response.chunk().await {
                    Ok(Some(chunk)) => bytes += chunk.len() as u64,
                    Ok(None) => break,
                    Err(e) => return Err(RequestFailure::Body { status, reason: e.to_string() }),
                }
            }
            Ok(Exchange { status, bytes })
        })
    }
}

fn send_failure(err: reqwest::Error) -> RequestFailure {
    let kind = if err.is_connect() {
        SendErrorKind::Connect
    } else if err.is_timeout() {
        SendErrorKind::Timeout
    } else if err.is_redirect() {
        SendErrorKind::Redirect
    } else {
        SendErrorKind::Other
    };
    RequestFailure::Send { kind, reason: err.to_string() }
}
