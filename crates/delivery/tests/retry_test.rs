mod common;

use common::{
    closed_addr, config, fast_retry, sample_alert, spawn_plaintext_responder, spawn_self_signed_tls,
    ScriptedUpstream,
};
use delivery::{AlertClient, CallContext, ClientConfig, CancelReason, DeliveryError, FailureKind, RetryPolicy, UpstreamAuth};
use std::sync::atomic::Ordering;
use std::time::{Duration, Instant};

#[tokio::test]
async fn test_retries_until_success() {
    let upstream = ScriptedUpstream::spawn(vec![(500, "boom"), (500, "boom"), (200, "")]).await;
    let client = AlertClient::new(config(&upstream.url)).unwrap();

    client
        .post_alerts(&[sample_alert()], &CallContext::new())
        .await
        .unwrap();

    assert_eq!(upstream.hits(), 3);
}

#[tokio::test]
async fn test_bad_request_not_retried() {
    let upstream = ScriptedUpstream::spawn(vec![(400, "  invalid alert  \n")]).await;
    let client = AlertClient::new(config(&upstream.url)).unwrap();

    let err = client
        .post_alerts(&[sample_alert()], &CallContext::new())
        .await
        .unwrap_err();

    assert_eq!(upstream.hits(), 1);
    match err {
        DeliveryError::Status { status, body } => {
            assert_eq!(status, 400);
            assert_eq!(body, "invalid alert");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn test_empty_error_body_uses_status_line() {
    let upstream = ScriptedUpstream::spawn(vec![(404, "")]).await;
    let client = AlertClient::new(config(&upstream.url)).unwrap();

    let err = client
        .post_alerts(&[sample_alert()], &CallContext::new())
        .await
        .unwrap_err();

    assert!(matches!(err, DeliveryError::Status { status: 404, ref body } if body == "404 Not Found"));
}

#[tokio::test]
async fn test_rate_limited_is_retried() {
    let upstream = ScriptedUpstream::spawn(vec![(429, "slow down"), (202, "")]).await;
    let client = AlertClient::new(config(&upstream.url)).unwrap();

    client
        .post_alerts(&[sample_alert()], &CallContext::new())
        .await
        .unwrap();

    assert_eq!(upstream.hits(), 2);
}

#[tokio::test]
async fn test_exhausted_budget_returns_last_error() {
    let upstream = ScriptedUpstream::spawn(vec![(503, "unavailable")]).await;
    let client = AlertClient::new(config(&upstream.url)).unwrap();

    let err = client
        .post_alerts(&[sample_alert()], &CallContext::new())
        .await
        .unwrap_err();

    assert_eq!(upstream.hits(), 3);
    assert_eq!(err.kind(), FailureKind::UpstreamStatus(503));
}

#[tokio::test]
async fn test_single_attempt_policy() {
    let upstream = ScriptedUpstream::spawn(vec![(500, "")]).await;
    let client =
        AlertClient::new(config(&upstream.url).with_retry(RetryPolicy::no_retry())).unwrap();

    let _ = client
        .post_alerts(&[sample_alert()], &CallContext::new())
        .await
        .unwrap_err();

    assert_eq!(upstream.hits(), 1);
}

#[tokio::test]
async fn test_connection_refused() {
    let addr = closed_addr().await;
    let client = AlertClient::new(config(&format!("http://{addr}"))).unwrap();

    let err = client
        .post_alerts(&[sample_alert()], &CallContext::new())
        .await
        .unwrap_err();

    assert_eq!(err.kind(), FailureKind::ConnectionFailure);
}

#[tokio::test]
async fn test_cancel_during_backoff() {
    let upstream = ScriptedUpstream::spawn(vec![(500, "boom")]).await;
    let policy = RetryPolicy {
        max_attempts: 3,
        initial_backoff: Duration::from_secs(30),
        max_backoff: Duration::from_secs(30),
    };
    let client = AlertClient::new(config(&upstream.url).with_retry(policy)).unwrap();

    let ctx = CallContext::new();
    let canceller = ctx.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(200)).await;
        canceller.cancel();
    });

    let started = Instant::now();
    let err = client.post_alerts(&[sample_alert()], &ctx).await.unwrap_err();

    assert!(matches!(err, DeliveryError::Cancelled(CancelReason::Cancelled)));
    assert!(started.elapsed() < Duration::from_secs(5));
    assert_eq!(upstream.hits(), 1);
}

#[tokio::test]
async fn test_deadline_interrupts_slow_upstream() {
    let upstream = ScriptedUpstream::spawn_with_delay(vec![(200, "")], Duration::from_secs(5)).await;
    let client = AlertClient::new(config(&upstream.url).with_timeout(Duration::from_secs(30))).unwrap();

    let ctx = CallContext::new().bounded(Duration::from_millis(200));
    let started = Instant::now();
    let err = client.post_alerts(&[sample_alert()], &ctx).await.unwrap_err();

    assert!(matches!(err, DeliveryError::Cancelled(CancelReason::DeadlineExceeded)));
    assert!(started.elapsed() < Duration::from_secs(3));
}

#[tokio::test]
async fn test_already_cancelled_makes_no_request() {
    let upstream = ScriptedUpstream::spawn(vec![(200, "")]).await;
    let client = AlertClient::new(config(&upstream.url)).unwrap();

    let ctx = CallContext::new();
    ctx.cancel();
    let err = client.post_alerts(&[sample_alert()], &ctx).await.unwrap_err();

    assert!(err.is_cancelled());
    assert_eq!(upstream.hits(), 0);
}

#[tokio::test]
async fn test_plaintext_over_https_is_permanent() {
    let (addr, accepted) = spawn_plaintext_responder().await;
    let client = AlertClient::new(config(&format!("https://{addr}"))).unwrap();

    let err = client
        .post_alerts(&[sample_alert()], &CallContext::new())
        .await
        .unwrap_err();

    assert_eq!(err.kind(), FailureKind::ProtocolMismatch);
    assert_eq!(accepted.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_untrusted_certificate_is_permanent() {
    let (port, accepted) = spawn_self_signed_tls().await;
    let client = AlertClient::new(config(&format!("https://localhost:{port}"))).unwrap();

    let err = client
        .post_alerts(&[sample_alert()], &CallContext::new())
        .await
        .unwrap_err();

    assert_eq!(err.kind(), FailureKind::TlsPermanent);
    assert!(!err.is_retryable());
    assert_eq!(accepted.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_attempt_timeout_is_retried() {
    let upstream = ScriptedUpstream::spawn_with_delay(vec![(200, "")], Duration::from_secs(2)).await;
    let client = AlertClient::new(
        ClientConfig::new(&upstream.url)
            .with_timeout(Duration::from_millis(100))
            .with_retry(fast_retry()),
    )
    .unwrap();

    let err = client
        .post_alerts(&[sample_alert()], &CallContext::new())
        .await
        .unwrap_err();

    assert_eq!(err.kind(), FailureKind::Timeout);
    assert!(matches!(err, DeliveryError::Transport { .. }));
    assert_eq!(upstream.hits(), 3);
}

#[tokio::test]
async fn test_bearer_takes_precedence() {
    let upstream = ScriptedUpstream::spawn(vec![(200, "")]).await;
    let auth = UpstreamAuth::new("user", "pass", " tok ");
    let client = AlertClient::new(config(&upstream.url).with_auth(auth)).unwrap();

    client
        .post_alerts(&[sample_alert()], &CallContext::new())
        .await
        .unwrap();

    let headers = upstream.last_headers().unwrap();
    assert_eq!(headers["authorization"], "Bearer tok");
    assert_eq!(headers["content-type"], "application/json");
}

#[tokio::test]
async fn test_basic_auth() {
    let upstream = ScriptedUpstream::spawn(vec![(200, "")]).await;
    let client = AlertClient::new(config(&upstream.url).with_auth(UpstreamAuth::basic("u", "p"))).unwrap();

    client
        .post_alerts(&[sample_alert()], &CallContext::new())
        .await
        .unwrap();

    let headers = upstream.last_headers().unwrap();
    assert_eq!(headers["authorization"], "Basic dTpw");
}

#[tokio::test]
async fn test_no_auth_header_without_credentials() {
    let upstream = ScriptedUpstream::spawn(vec![(200, "")]).await;
    let client = AlertClient::new(config(&upstream.url)).unwrap();

    client
        .post_alerts(&[sample_alert()], &CallContext::new())
        .await
        .unwrap();

    assert!(upstream.last_headers().unwrap().get("authorization").is_none());
}
