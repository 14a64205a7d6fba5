//! Scripted fetcher and a local HTTP server shared by unit tests.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use futures::future::BoxFuture;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Notify;
use url::Url;

use crate::models::{Request, Response};
use crate::net::{FetchError, Fetcher};

#[derive(Clone)]
enum Reply {
    Respond(Response),
    Fail(String),
}

/// Answers requests from a fixed table keyed by URL. Unknown URLs fail like
/// an unreachable network.
#[derive(Default)]
pub(crate) struct ScriptedFetcher {
    replies: Mutex<HashMap<String, Reply>>,
    calls: Mutex<Vec<String>>,
    gate: Option<Arc<Notify>>,
}

impl ScriptedFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(self, url: &str, response: Response) -> Self {
        self.set(url, response);
        self
    }

    pub fn fail(self, url: &str) -> Self {
        self.lock_replies()
            .insert(url.to_string(), Reply::Fail(format!("connection refused: {}", url)));
        self
    }

    /// Hold every fetch until the returned handle is notified once per fetch.
    pub fn gated(mut self) -> (Self, Arc<Notify>) {
        let gate = Arc::new(Notify::new());
        self.gate = Some(Arc::clone(&gate));
        (self, gate)
    }

    pub fn set(&self, url: &str, response: Response) {
        self.lock_replies()
            .insert(url.to_string(), Reply::Respond(response));
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn lock_replies(&self) -> std::sync::MutexGuard<'_, HashMap<String, Reply>> {
        self.replies.lock().unwrap()
    }
}

impl Fetcher for ScriptedFetcher {
    fn fetch<'a>(&'a self, request: &'a Request) -> BoxFuture<'a, Result<Response, FetchError>> {
        Box::pin(async move {
            let url = request.url.to_string();
            self.calls.lock().unwrap().push(url.clone());
            if let Some(gate) = &self.gate {
                gate.notified().await;
            }

            let reply = self.lock_replies().get(&url).cloned();
            match reply {
                Some(Reply::Respond(response)) => Ok(response),
                Some(Reply::Fail(reason)) => Err(FetchError::Failed(reason)),
                None => Err(FetchError::Failed(format!("no route to {}", url))),
            }
        })
    }
}

/// Raw HTTP/1.1 response with a body and `Connection: close`.
pub(crate) fn http_reply(status: &str, headers: &[(&str, &str)], body: &str) -> String {
    let mut reply = format!(
        "HTTP/1.1 {}\r\nContent-Length: {}\r\nConnection: close\r\n",
        status,
        body.len()
    );
    for (name, value) in headers {
        reply.push_str(&format!("{}: {}\r\n", name, value));
    }
    reply.push_str("\r\n");
    reply.push_str(body);
    reply
}

/// Serve canned replies on a local port, keyed by request path. Unknown
/// paths get a 404. Returns the server's root URL.
pub(crate) async fn serve(routes: HashMap<String, String>) -> Url {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let root = Url::parse(&format!("http://{}/", listener.local_addr().unwrap())).unwrap();
    let routes = Arc::new(routes);

    tokio::spawn(async move {
        while let Ok((mut stream, _)) = listener.accept().await {
            let routes = Arc::clone(&routes);
            tokio::spawn(async move {
                let path = read_request_path(&mut stream).await;
                let reply = routes
                    .get(&path)
                    .cloned()
                    .unwrap_or_else(|| http_reply("404 Not Found", &[], ""));
                let _ = stream.write_all(reply.as_bytes()).await;
                let _ = stream.shutdown().await;
            });
        }
    });
    root
}

/// Accept connections and read requests without ever answering.
pub(crate) async fn serve_silently() -> Url {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let root = Url::parse(&format!("http://{}/", listener.local_addr().unwrap())).unwrap();

    tokio::spawn(async move {
        while let Ok((mut stream, _)) = listener.accept().await {
            tokio::spawn(async move {
                read_request_path(&mut stream).await;
                std::future::pending::<()>().await;
                drop(stream);
            });
        }
    });
    root
}

async fn read_request_path(stream: &mut TcpStream) -> String {
    let mut head = Vec::new();
    let mut chunk = [0u8; 1024];
    while !head.windows(4).any(|w| w == b"\r\n\r\n") {
        match stream.read(&mut chunk).await {
            Ok(0) | Err(_) => break,
            Ok(n) => head.extend_from_slice(&chunk[..n]),
        }
    }
    String::from_utf8_lossy(&head)
        .split_whitespace()
        .nth(1)
        .unwrap_or("/")
        .to_string()
}
