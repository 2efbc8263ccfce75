//! Forwarding orchestration

use crate::metrics;
use alerting::{Alert, AlertBuilder, AppIdentity, InboundMessage};
use delivery::{AlertClient, CallContext, DeliveryError};
use std::slice;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{error, info, warn};

/// Process-wide source of forwarding ids.
///
/// Ids start at 1 and are distinct across concurrent callers; no ordering
/// between concurrent requests is implied.
#[derive(Debug, Default)]
pub struct ForwardingIds {
    last: AtomicU64,
}

impl ForwardingIds {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next(&self) -> u64 {
        self.last.fetch_add(1, Ordering::Relaxed) + 1
    }
}

#[derive(Debug, Error)]
pub enum ForwardError {
    #[error("forward message {id} for app {app}: {source}")]
    Delivery {
        id: u64,
        app: String,
        #[source]
        source: DeliveryError,
    },
}

impl ForwardError {
    pub fn id(&self) -> u64 {
        match self {
            ForwardError::Delivery { id, .. } => *id,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        match self {
            ForwardError::Delivery { source, .. } => source.is_cancelled(),
        }
    }
}

/// Outcome of a successful forward
#[derive(Debug, Clone)]
pub struct Forwarded {
    pub id: u64,
    pub alert: Alert,
}

/// Turns accepted messages into alerts and delivers them upstream
#[derive(Debug)]
pub struct Forwarder {
    builder: AlertBuilder,
    client: AlertClient,
    ids: Arc<ForwardingIds>,
    delivery_timeout: Duration,
}

impl Forwarder {
    /// `delivery_timeout` bounds each forward; zero leaves only the caller's deadline.
    pub fn new(
        builder: AlertBuilder,
        client: AlertClient,
        ids: Arc<ForwardingIds>,
        delivery_timeout: Duration,
    ) -> Self {
        Self {
            builder,
            client,
            ids,
            delivery_timeout,
        }
    }

    pub fn client(&self) -> &AlertClient {
        &self.client
    }

    pub async fn forward(
        &self,
        app: &AppIdentity,
        msg: &InboundMessage,
        ctx: &CallContext,
    ) -> Result<Forwarded, ForwardError> {
        let id = self.ids.next();
        let alert = self.builder.build_now(app, msg, id);
        let ctx = ctx.bounded(self.delivery_timeout);

        match self.client.post_alerts(slice::from_ref(&alert), &ctx).await {
            Ok(()) => {
                metrics::record_forwarded(&app.name);
                info!(
                    "Forwarded message {} from app {} (priority: {})",
                    id, app.name, msg.priority
                );
                Ok(Forwarded { id, alert })
            }
            Err(source) => {
                metrics::record_upstream_failure(&app.name);
                match &source {
                    DeliveryError::Status { status, body } => error!(
                        "Alertmanager rejected message {} from app {}: url={} status={} body={:?}",
                        id,
                        app.name,
                        self.client.alerts_url(),
                        status,
                        body
                    ),
                    DeliveryError::Cancelled(reason) => warn!(
                        "Delivery of message {} from app {} stopped: {}",
                        id, app.name, reason
                    ),
                    other => error!(
                        "Failed to deliver message {} from app {}: url={} kind={} error={}",
                        id,
                        app.name,
                        self.client.alerts_url(),
                        other.kind(),
                        other
                    ),
                }
                Err(ForwardError::Delivery {
                    id,
                    app: app.name.clone(),
                    source,
                })
            }
        }
    }
}
