use std::collections::BTreeMap;
use std::time::Duration;

use futures::future::BoxFuture;
use reqwest::{Client, Method};
use tracing::debug;
use url::{Origin, Url};

use super::FetchError;
use crate::models::{Request, Response, ResponseType};

/// Anything that can turn a request into a response over the network.
///
/// HTTP error statuses are responses, not errors. `Err` means no response
/// arrived at all.
pub trait Fetcher: Send + Sync {
    fn fetch<'a>(&'a self, request: &'a Request) -> BoxFuture<'a, Result<Response, FetchError>>;
}

/// Fetcher backed by `reqwest`.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct HttpFetcher {
    client: Client,
    origin: Origin,
}

impl HttpFetcher {
    /// Create a fetcher serving `scope`. Responses whose final URL shares the
    /// scope's origin are typed `basic`, everything else `cors`.
    pub fn new(scope: &Url, timeout: Option<Duration>) -> Result<Self, FetchError> {
        let mut builder = Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }

        Ok(Self {
            client: builder.build()?,
            origin: scope.origin(),
        })
    }

    async fn send(&self, request: &Request) -> Result<Response, FetchError> {
        let method = Method::from_bytes(request.method.as_bytes())
            .map_err(|_| FetchError::InvalidMethod(request.method.clone()))?;

        let response = self
            .client
            .request(method, request.url.clone())
            .send()
            .await
            .map_err(FetchError::from_transport)?;

        let status = response.status();
        let response_type = if response.url().origin() == self.origin {
            ResponseType::Basic
        } else {
            ResponseType::Cors
        };
        let headers: BTreeMap<String, String> = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();
        let body = response
            .bytes()
            .await
            .map_err(FetchError::from_transport)?;

        debug!(url = %request.url, status = status.as_u16(), bytes = body.len(), "Fetched");

        Ok(Response {
            status: status.as_u16(),
            status_text: status.canonical_reason().unwrap_or("").to_string(),
            headers,
            body: body.to_vec(),
            response_type,
        })
    }
}

impl Fetcher for HttpFetcher {
    fn fetch<'a>(&'a self, request: &'a Request) -> BoxFuture<'a, Result<Response, FetchError>> {
        Box::pin(self.send(request))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::testing::{http_reply, serve, serve_silently};

    fn routes(items: &[(&str, String)]) -> HashMap<String, String> {
        items
            .iter()
            .map(|(path, reply)| (path.to_string(), reply.clone()))
            .collect()
    }

    #[tokio::test]
    async fn test_same_origin_response_is_basic() {
        let root = serve(routes(&[(
            "/lessons.js",
            http_reply("200 OK", &[("Content-Type", "text/javascript")], "lessons"),
        )]))
        .await;
        let fetcher = HttpFetcher::new(&root, None).unwrap();

        let response = fetcher
            .fetch(&Request::get(root.join("lessons.js").unwrap()))
            .await
            .unwrap();

        assert_eq!(response.status, 200);
        assert_eq!(response.status_text, "OK");
        assert_eq!(response.body, b"lessons");
        assert_eq!(response.response_type, ResponseType::Basic);
        assert_eq!(
            response.headers.get("content-type").map(String::as_str),
            Some("text/javascript")
        );
        assert!(response.is_cacheable());
    }

    #[tokio::test]
    async fn test_error_status_is_a_response() {
        let root = serve(HashMap::new()).await;
        let fetcher = HttpFetcher::new(&root, None).unwrap();

        let response = fetcher
            .fetch(&Request::get(root.join("missing.js").unwrap()))
            .await
            .unwrap();
        assert_eq!(response.status, 404);
        assert_eq!(response.status_text, "Not Found");
        assert!(!response.is_cacheable());
    }

    #[tokio::test]
    async fn test_redirect_to_other_origin_is_cors() {
        let cdn = serve(routes(&[("/tracks.js", http_reply("200 OK", &[], "tracks"))])).await;
        let location = cdn.join("tracks.js").unwrap();
        let root = serve(routes(&[(
            "/tracks.js",
            http_reply("302 Found", &[("Location", location.as_str())], ""),
        )]))
        .await;
        let fetcher = HttpFetcher::new(&root, None).unwrap();

        let response = fetcher
            .fetch(&Request::get(root.join("tracks.js").unwrap()))
            .await
            .unwrap();
        assert_eq!(response.status, 200);
        assert_eq!(response.body, b"tracks");
        assert_eq!(response.response_type, ResponseType::Cors);
        assert!(!response.is_cacheable());
    }

    #[tokio::test]
    async fn test_timeout_is_reported_as_timeout() {
        let root = serve_silently().await;
        let fetcher = HttpFetcher::new(&root, Some(Duration::from_millis(200))).unwrap();

        let err = fetcher
            .fetch(&Request::get(root.join("index.html").unwrap()))
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::Timeout(_)), "got {:?}", err);
    }

    #[tokio::test]
    async fn test_connection_refused_is_network_error() {
        // Bind then drop to get a port nothing listens on
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let root = Url::parse(&format!("http://{}/", listener.local_addr().unwrap())).unwrap();
        drop(listener);
        let fetcher = HttpFetcher::new(&root, None).unwrap();

        let err = fetcher.fetch(&Request::get(root.clone())).await.unwrap_err();
        assert!(matches!(err, FetchError::Network(_)), "got {:?}", err);
    }

    #[tokio::test]
    async fn test_invalid_method_is_rejected_before_sending() {
        let root = Url::parse("http://127.0.0.1:9/").unwrap();
        let fetcher = HttpFetcher::new(&root, None).unwrap();

        let err = fetcher
            .fetch(&Request::new("NOT A METHOD", root.clone()))
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::InvalidMethod(m) if m == "NOT A METHOD"));
    }
}
