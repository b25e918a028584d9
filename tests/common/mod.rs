#![allow(dead_code)]

use axum::body::{Body, Bytes};
use axum::Router;
use linguaecho_lib::api::ApiClient;
use linguaecho_lib::cache::LocalCache;
use linguaecho_lib::credentials::Credentials;
use linguaecho_lib::storage::MemoryStore;
use std::sync::Arc;
use std::time::Duration;

/// Serves `router` on an ephemeral local port and returns its base URL.
pub async fn spawn_backend(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind test listener");
    let addr = listener.local_addr().expect("listener address");
    tokio::spawn(async move {
        axum::serve(listener, router).await.expect("test backend");
    });
    format!("http://{}", addr)
}

pub struct TestClient {
    pub api: ApiClient,
    pub credentials: Arc<Credentials>,
    pub cache: LocalCache,
}

pub fn client(base_url: &str) -> TestClient {
    let cache = LocalCache::new(Arc::new(MemoryStore::new()));
    let credentials = Arc::new(Credentials::new(cache.clone()));
    let api = ApiClient::new(base_url, Duration::from_secs(5), credentials.clone())
        .expect("client builds");
    TestClient {
        api,
        credentials,
        cache,
    }
}

/// A response body delivered as exactly these chunks.
pub fn chunked_body(chunks: &[&str]) -> Body {
    let chunks: Vec<Result<Bytes, std::io::Error>> = chunks
        .iter()
        .map(|chunk| Ok(Bytes::from(chunk.to_string())))
        .collect();
    Body::from_stream(futures::stream::iter(chunks))
}

/// One chunk, then a body that never finishes.
pub fn stalled_body(first: &str) -> Body {
    use futures::StreamExt;
    let first: Result<Bytes, std::io::Error> = Ok(Bytes::from(first.to_string()));
    Body::from_stream(futures::stream::iter(vec![first]).chain(futures::stream::pending()))
}

/// One chunk, then the connection is dropped mid-body.
pub fn broken_body(first: &str) -> Body {
    use futures::StreamExt;
    let first: Result<Bytes, std::io::Error> = Ok(Bytes::from(first.to_string()));
    let failure = futures::stream::once(async {
        // Let the first chunk reach the client before failing
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        Err(std::io::Error::new(
            std::io::ErrorKind::ConnectionReset,
            "backend crashed",
        ))
    });
    Body::from_stream(futures::stream::iter(vec![first]).chain(failure))
}
