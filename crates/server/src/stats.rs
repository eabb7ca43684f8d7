//! Access statistics publication.
//!
//! The resolver hands every successful redirect to a [`StatsPublisher`]
//! without waiting. The channel-backed publisher queues events on a bounded
//! channel drained by a background task; when the queue is full the event is
//! dropped.

use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use time::OffsetDateTime;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::metrics;

/// One successful redirect.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct AccessEvent {
    pub full_short_url: String,
    pub gid: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub accessed_at: OffsetDateTime,
    pub remote_addr: Option<String>,
    pub user_agent: Option<String>,
    pub referer: Option<String>,
}

/// Request details that accompany a resolution, all optional.
#[derive(Clone, Debug, Default)]
pub struct AccessContext {
    pub remote_addr: Option<String>,
    pub user_agent: Option<String>,
    pub referer: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum StatsError {
    #[error("stats sink failed: {0}")]
    Sink(String),
}

/// Fire-and-forget publication. Implementations must return immediately.
pub trait StatsPublisher: Send + Sync + 'static {
    fn publish(&self, event: AccessEvent);
}

/// Destination the background task writes events to.
#[async_trait]
pub trait StatsSink: Send + Sync + 'static {
    async fn record(&self, event: AccessEvent) -> Result<(), StatsError>;
}

/// Discards everything.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopStatsPublisher;

impl StatsPublisher for NoopStatsPublisher {
    fn publish(&self, _event: AccessEvent) {}
}

/// Writes events to the log at debug level.
#[derive(Clone, Copy, Debug, Default)]
pub struct LoggingStatsSink;

#[async_trait]
impl StatsSink for LoggingStatsSink {
    async fn record(&self, event: AccessEvent) -> Result<(), StatsError> {
        let line = serde_json::to_string(&event).map_err(|e| StatsError::Sink(e.to_string()))?;
        tracing::debug!(target: "shortlink::access", event = %line, "Short link accessed");
        Ok(())
    }
}

/// Publisher backed by a bounded channel and a draining task.
#[derive(Clone)]
pub struct ChannelStatsPublisher {
    sender: mpsc::Sender<AccessEvent>,
}

impl ChannelStatsPublisher {
    /// Start the draining task. It exits once every publisher clone is
    /// dropped and the queue is empty.
    pub fn spawn(sink: Arc<dyn StatsSink>, capacity: usize) -> (Self, JoinHandle<()>) {
        let (sender, mut receiver) = mpsc::channel::<AccessEvent>(capacity.max(1));
        let handle = tokio::spawn(async move {
            while let Some(event) = receiver.recv().await {
                if let Err(e) = sink.record(event).await {
                    metrics::record_stats_dropped("sink_error");
                    tracing::warn!(error = %e, "Stats sink rejected access event");
                }
            }
            tracing::debug!("Stats publisher closed");
        });
        (Self { sender }, handle)
    }
}

impl StatsPublisher for ChannelStatsPublisher {
    fn publish(&self, event: AccessEvent) {
        match self.sender.try_send(event) {
            Ok(()) => metrics::STATS_PUBLISHED.inc(),
            Err(mpsc::error::TrySendError::Full(event)) => {
                metrics::record_stats_dropped("queue_full");
                tracing::warn!(
                    full_short_url = %event.full_short_url,
                    "Stats queue full, dropping access event"
                );
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                metrics::record_stats_dropped("closed");
                tracing::warn!("Stats queue closed, dropping access event");
            }
        }
    }
}
