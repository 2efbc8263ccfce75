//! Test upstreams for delivery integration tests

#![allow(dead_code)]

use alerting::Alert;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::post;
use axum::Router;
use chrono::{TimeDelta, Utc};
use delivery::{ClientConfig, RetryPolicy};
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio_rustls::rustls::pki_types::{PrivateKeyDer, PrivatePkcs8KeyDer};
use tokio_rustls::rustls::{crypto, ServerConfig};
use tokio_rustls::TlsAcceptor;

/// Replies with a fixed sequence of statuses; the last one repeats
pub struct ScriptedUpstream {
    pub url: String,
    state: Arc<Script>,
}

struct Script {
    replies: Vec<(u16, &'static str)>,
    delay: Duration,
    hits: AtomicUsize,
    headers: Mutex<Vec<HeaderMap>>,
}

impl ScriptedUpstream {
    pub async fn spawn(replies: Vec<(u16, &'static str)>) -> Self {
        Self::spawn_with_delay(replies, Duration::ZERO).await
    }

    pub async fn spawn_with_delay(replies: Vec<(u16, &'static str)>, delay: Duration) -> Self {
        let state = Arc::new(Script {
            replies,
            delay,
            hits: AtomicUsize::new(0),
            headers: Mutex::new(Vec::new()),
        });

        let app = Router::new()
            .route("/api/v2/alerts", post(reply))
            .with_state(state.clone());

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            url: format!("http://{addr}"),
            state,
        }
    }

    pub fn hits(&self) -> usize {
        self.state.hits.load(Ordering::SeqCst)
    }

    pub fn last_headers(&self) -> Option<HeaderMap> {
        self.state.headers.lock().unwrap().last().cloned()
    }
}

async fn reply(State(script): State<Arc<Script>>, headers: HeaderMap) -> (StatusCode, &'static str) {
    let hit = script.hits.fetch_add(1, Ordering::SeqCst);
    script.headers.lock().unwrap().push(headers);
    if !script.delay.is_zero() {
        tokio::time::sleep(script.delay).await;
    }

    let (status, body) = script
        .replies
        .get(hit)
        .or_else(|| script.replies.last())
        .copied()
        .unwrap_or((200, ""));
    (StatusCode::from_u16(status).unwrap(), body)
}

/// Plain TCP server that answers every connection with a bare HTTP 400.
/// Returns its address and a counter of accepted connections.
pub async fn spawn_plaintext_responder() -> (SocketAddr, Arc<AtomicUsize>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let accepted = Arc::new(AtomicUsize::new(0));
    let counter = accepted.clone();

    tokio::spawn(async move {
        loop {
            let Ok((mut stream, _)) = listener.accept().await else {
                return;
            };
            counter.fetch_add(1, Ordering::SeqCst);
            tokio::spawn(async move {
                let mut buf = [0u8; 1024];
                let _ = stream.read(&mut buf).await;
                let _ = stream.write_all(b"HTTP/1.1 400 Bad Request\r\n\r\n").await;
                tokio::time::sleep(Duration::from_millis(200)).await;
            });
        }
    });

    (addr, accepted)
}

/// TLS server presenting a freshly generated self-signed certificate for
/// `localhost`. Returns its port and a counter of accepted connections.
pub async fn spawn_self_signed_tls() -> (u16, Arc<AtomicUsize>) {
    let rcgen::CertifiedKey { cert, key_pair } =
        rcgen::generate_simple_self_signed(vec!["localhost".to_string()]).unwrap();
    let key = PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(key_pair.serialize_der()));
    let tls = ServerConfig::builder_with_provider(Arc::new(crypto::ring::default_provider()))
        .with_safe_default_protocol_versions()
        .unwrap()
        .with_no_client_auth()
        .with_single_cert(vec![cert.der().clone()], key)
        .unwrap();
    let acceptor = TlsAcceptor::from(Arc::new(tls));

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let accepted = Arc::new(AtomicUsize::new(0));
    let counter = accepted.clone();

    tokio::spawn(async move {
        loop {
            let Ok((stream, _)) = listener.accept().await else {
                return;
            };
            counter.fetch_add(1, Ordering::SeqCst);
            let acceptor = acceptor.clone();
            tokio::spawn(async move {
                // Handshake fails on the client side; nothing to serve.
                let _ = acceptor.accept(stream).await;
            });
        }
    });

    (port, accepted)
}

/// An address nothing is listening on
pub async fn closed_addr() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap()
}

pub fn fast_retry() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 3,
        initial_backoff: Duration::from_millis(10),
        max_backoff: Duration::from_millis(20),
    }
}

pub fn config(url: &str) -> ClientConfig {
    ClientConfig::new(url)
        .with_timeout(Duration::from_secs(2))
        .with_retry(fast_retry())
}

pub fn sample_alert() -> Alert {
    let now = Utc::now();
    Alert {
        labels: BTreeMap::from([
            ("alertname".to_string(), "Test".to_string()),
            ("alertbridge_id".to_string(), "1".to_string()),
        ]),
        annotations: BTreeMap::from([("summary".to_string(), "hello".to_string())]),
        starts_at: now,
        ends_at: now + TimeDelta::hours(1),
    }
}
