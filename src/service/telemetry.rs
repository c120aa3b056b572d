//! Background usage telemetry
//!
//! Serving a file hands a [`UsageHit`] to the [`TelemetryAggregator`], which
//! only enqueues it. A single [`TelemetryWorker`] task owns the queue and
//! writes hits to the [`UsageStore`] in arrival order. When every aggregator
//! handle is dropped the worker drains what is left and exits, so shutdown
//! can await it to flush pending counts.

use crate::logging::with_request_tags;
use crate::telemetry::{UsageHit, UsageStore};
use chrono::{DateTime, Utc};
use log::{debug, error, info, warn};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use url::Url;

/// Site recorded when there is no usable referrer
pub const DIRECT_SITE: &str = "direct";

/// `(site, page)` for a referrer header value
pub fn referrer_origin(referrer: Option<&str>) -> (String, String) {
    referrer
        .filter(|r| !r.is_empty())
        .and_then(|r| Url::parse(r).ok())
        .map(|url| (url.host_str().unwrap_or_default().to_string(), url.path().to_string()))
        .unwrap_or_else(|| (DIRECT_SITE.to_string(), String::new()))
}

pub fn usage_hit(file: &str, referrer: Option<&str>, at: DateTime<Utc>) -> UsageHit {
    let (site, page) = referrer_origin(referrer);
    UsageHit {
        file: file.to_string(),
        site,
        page,
        at,
    }
}

/// Cheap handle for recording hits off the request path
#[derive(Clone)]
pub struct TelemetryAggregator {
    sender: Option<mpsc::UnboundedSender<UsageHit>>,
}

impl TelemetryAggregator {
    /// Aggregator that drops every hit
    pub fn disabled() -> Self {
        Self { sender: None }
    }

    pub fn is_enabled(&self) -> bool {
        self.sender.is_some()
    }

    /// Enqueue a hit. Never blocks and never fails the caller.
    pub fn record(&self, hit: UsageHit) {
        if let Some(sender) = &self.sender {
            if let Err(e) = sender.send(hit) {
                warn!("Telemetry worker gone, dropping hit for {}", e.0.file);
            }
        }
    }

    pub fn record_serve(&self, file: &str, referrer: Option<&str>) {
        if self.is_enabled() {
            self.record(usage_hit(file, referrer, Utc::now()));
        }
    }
}

/// Drains queued hits into the usage store
pub struct TelemetryWorker {
    store: Arc<dyn UsageStore>,
    receiver: mpsc::UnboundedReceiver<UsageHit>,
}

impl TelemetryWorker {
    pub fn new(store: Arc<dyn UsageStore>) -> (TelemetryAggregator, Self) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (
            TelemetryAggregator {
                sender: Some(sender),
            },
            Self { store, receiver },
        )
    }

    /// Start the worker as a background task (non-blocking)
    pub fn start_background(mut self) -> JoinHandle<()> {
        info!("Starting telemetry worker");

        tokio::spawn(async move {
            let mut written = 0u64;
            while let Some(hit) = self.receiver.recv().await {
                if self.write(hit).await {
                    written += 1;
                }
            }
            info!("Telemetry worker drained after {} hits", written);
        })
    }

    async fn write(&self, hit: UsageHit) -> bool {
        let store = Arc::clone(&self.store);
        let file = hit.file.clone();
        match tokio::task::spawn_blocking(move || {
            with_request_tags("telemetry", &hit.file, || store.record_hit(&hit))
        })
        .await
        {
            Ok(Ok(())) => {
                debug!("Recorded hit for {}", file);
                true
            }
            Ok(Err(e)) => {
                error!("Failed to record hit for {}: {}", file, e);
                false
            }
            Err(e) => {
                error!("Telemetry write task failed for {}: {}", file, e);
                false
            }
        }
    }
}

/// Start the telemetry worker as a background task (non-blocking)
pub fn start_telemetry(store: Arc<dyn UsageStore>) -> (TelemetryAggregator, JoinHandle<()>) {
    let (aggregator, worker) = TelemetryWorker::new(store);
    (aggregator, worker.start_background())
}

/// Wait for the worker to flush, bounded by `timeout`.
/// Every aggregator clone must already be dropped.
pub async fn drain_telemetry(worker: JoinHandle<()>, timeout: Duration) {
    match tokio::time::timeout(timeout, worker).await {
        Ok(Ok(())) => info!("Telemetry flushed"),
        Ok(Err(e)) => error!("Telemetry worker panicked: {}", e),
        Err(_) => warn!(
            "Telemetry drain exceeded {}s, pending hits discarded",
            timeout.as_secs()
        ),
    }
}
