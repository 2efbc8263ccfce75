//! Listener lifecycle and graceful shutdown

use crate::config::ServerSettings;
use axum::Router;
use hyper::server::conn::http1;
use hyper_util::rt::{TokioIo, TokioTimer};
use hyper_util::service::TowerToHyperService;
use std::future::Future;
use std::io;
use std::time::Duration;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::task::{JoinError, JoinSet};
use tokio_util::sync::CancellationToken;
use tower::ServiceBuilder;
use tower_http::timeout::{RequestBodyTimeoutLayer, TimeoutLayer};
use tracing::{debug, error, info, warn};

/// Pause after a failed accept (e.g. out of file descriptors)
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("http server task failed: {0}")]
    Task(#[from] JoinError),
}

/// Connection bounds applied by the listener
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServeLimits {
    /// Time allowed to receive request headers, and separately the body
    pub read_timeout: Duration,
    /// Time allowed to produce a response; exceeded requests get 408
    pub write_timeout: Duration,
    /// Time in-flight requests get to finish after shutdown is requested
    pub grace: Duration,
}

impl From<&ServerSettings> for ServeLimits {
    fn from(settings: &ServerSettings) -> Self {
        Self {
            read_timeout: settings.read_timeout,
            write_timeout: settings.write_timeout,
            grace: settings.shutdown_timeout,
        }
    }
}

pub async fn bind(settings: &ServerSettings) -> Result<TcpListener, ServerError> {
    let addr = settings.bind_addr();
    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|source| ServerError::Bind { addr: addr.clone(), source })?;
    info!("HTTP server listening on {}", addr);
    Ok(listener)
}

/// Serve `router` until `shutdown` resolves.
///
/// After shutdown is requested the listener stops accepting and in-flight
/// requests get `limits.grace` to finish; whatever is still running then is
/// aborted.
pub async fn run_until<F>(
    listener: TcpListener,
    router: Router,
    limits: ServeLimits,
    shutdown: F,
) -> Result<(), ServerError>
where
    F: Future<Output = ()> + Send,
{
    let stop = CancellationToken::new();
    let mut server = tokio::spawn(serve(listener, router, limits, stop.clone()));

    tokio::select! {
        result = &mut server => {
            result?;
            return Ok(());
        }
        _ = shutdown => info!("Shutdown requested"),
    }

    stop.cancel();
    match tokio::time::timeout(limits.grace, &mut server).await {
        Ok(result) => {
            result?;
            info!("Shutdown complete");
        }
        Err(_) => {
            warn!("In-flight requests still running after {:?}, closing listener", limits.grace);
            server.abort();
        }
    }

    Ok(())
}

/// Accept loop. Each connection runs in its own task and is asked to finish
/// its current request once `stop` fires; the loop returns when all have.
async fn serve(listener: TcpListener, router: Router, limits: ServeLimits, stop: CancellationToken) {
    let service = ServiceBuilder::new()
        .layer(TimeoutLayer::new(limits.write_timeout))
        .layer(RequestBodyTimeoutLayer::new(limits.read_timeout))
        .service(router);

    let mut builder = http1::Builder::new();
    builder
        .timer(TokioTimer::new())
        .header_read_timeout(limits.read_timeout);

    let mut connections = JoinSet::new();
    loop {
        let stream = tokio::select! {
            _ = stop.cancelled() => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, _)) => stream,
                Err(err) => {
                    warn!("Failed to accept connection: {}", err);
                    tokio::time::sleep(ACCEPT_BACKOFF).await;
                    continue;
                }
            },
            Some(finished) = connections.join_next(), if !connections.is_empty() => {
                if let Err(err) = finished {
                    if err.is_panic() {
                        error!("Connection handler panicked: {:?}", err);
                    }
                }
                continue;
            }
        };

        let conn = builder.serve_connection(TokioIo::new(stream), TowerToHyperService::new(service.clone()));
        let stop = stop.clone();
        connections.spawn(async move {
            tokio::pin!(conn);
            let result = tokio::select! {
                result = conn.as_mut() => result,
                _ = stop.cancelled() => {
                    conn.as_mut().graceful_shutdown();
                    conn.await
                }
            };
            if let Err(err) = result {
                debug!("Connection closed: {}", err);
            }
        });
    }

    while connections.join_next().await.is_some() {}
}

/// Resolve on SIGINT or SIGTERM
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for SIGINT: {}", err);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                error!("Failed to listen for SIGTERM: {}", err);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received SIGINT"),
        _ = terminate => info!("Received SIGTERM"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::routing::get;
    use std::net::SocketAddr;
    use std::time::Instant;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;

    fn limits(grace: Duration) -> ServeLimits {
        ServeLimits {
            read_timeout: Duration::from_secs(5),
            write_timeout: Duration::from_secs(10),
            grace,
        }
    }

    /// Serve `router` in the background until the returned token is cancelled
    async fn spawn_with(router: Router, limits: ServeLimits) -> (SocketAddr, CancellationToken) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let done = CancellationToken::new();
        let shutdown = done.clone();
        tokio::spawn(async move {
            run_until(listener, router, limits, async move { shutdown.cancelled().await })
                .await
                .unwrap();
        });
        (addr, done)
    }

    #[test]
    fn test_bind_addr_all_interfaces() {
        let settings = ServerSettings {
            listen_addr: ":9099".to_string(),
            ..ServerSettings::default()
        };
        assert_eq!(settings.bind_addr(), "0.0.0.0:9099");
    }

    #[tokio::test]
    async fn test_stops_on_shutdown() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let router = Router::new().route("/", get(|| async { "ok" }));

        run_until(listener, router, limits(Duration::from_secs(1)), async {
            tokio::time::sleep(Duration::from_millis(50)).await;
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_grace_period_bounds_slow_requests() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let router = Router::new().route(
            "/slow",
            get(|| async {
                tokio::time::sleep(Duration::from_secs(30)).await;
                "done"
            }),
        );

        tokio::spawn(async move {
            let _ = reqwest::get(format!("http://{addr}/slow")).await;
        });

        let started = Instant::now();
        run_until(listener, router, limits(Duration::from_millis(200)), async {
            tokio::time::sleep(Duration::from_millis(100)).await;
        })
        .await
        .unwrap();

        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn test_limits_from_settings() {
        let settings = ServerSettings::default();
        let limits = ServeLimits::from(&settings);
        assert_eq!(limits.read_timeout, Duration::from_secs(5));
        assert_eq!(limits.write_timeout, Duration::from_secs(10));
        assert_eq!(limits.grace, settings.shutdown_timeout);
    }

    #[tokio::test]
    async fn test_slow_headers_are_dropped() {
        let router = Router::new().route("/", get(|| async { "ok" }));
        let (addr, done) = spawn_with(
            router,
            ServeLimits {
                read_timeout: Duration::from_millis(200),
                ..limits(Duration::from_secs(1))
            },
        )
        .await;

        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream.write_all(b"GET / HTTP/1.1\r\nHost: test\r\n").await.unwrap();

        let mut buf = Vec::new();
        let closed = tokio::time::timeout(Duration::from_secs(3), stream.read_to_end(&mut buf)).await;
        assert!(closed.is_ok(), "connection with unfinished headers stayed open");
        done.cancel();
    }

    #[tokio::test]
    async fn test_write_timeout_answers_408() {
        let router = Router::new().route(
            "/slow",
            get(|| async {
                tokio::time::sleep(Duration::from_secs(30)).await;
                "done"
            }),
        );
        let (addr, done) = spawn_with(
            router,
            ServeLimits {
                write_timeout: Duration::from_millis(200),
                ..limits(Duration::from_secs(1))
            },
        )
        .await;

        let started = Instant::now();
        let resp = reqwest::get(format!("http://{addr}/slow")).await.unwrap();
        assert_eq!(resp.status(), reqwest::StatusCode::REQUEST_TIMEOUT);
        assert!(started.elapsed() < Duration::from_secs(5));
        done.cancel();
    }

    #[tokio::test]
    async fn test_serves_requests() {
        let router = Router::new().route("/", get(|| async { "ok" }));
        let (addr, done) = spawn_with(router, limits(Duration::from_secs(1))).await;

        let body = reqwest::get(format!("http://{addr}/")).await.unwrap().text().await.unwrap();
        assert_eq!(body, "ok");
        done.cancel();
    }
}
