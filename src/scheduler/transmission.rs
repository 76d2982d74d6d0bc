//! Transmission subsystem boundary.

use crate::model::{News, Rubric};
use chrono::{DateTime, Utc};

/// Consumer of scheduled broadcasts.
///
/// Calls are made while the caller holds a read lock on the state aggregate;
/// implementations must not block for long and must not touch the aggregate.
pub trait TransmissionSink: Send + Sync {
    /// Broadcast a rubric's label on its pager address.
    fn send_rubric(&self, rubric: &Rubric);

    /// Broadcast one news slot of a rubric.
    fn send_news(&self, rubric: &Rubric, news: &News);

    /// Broadcast the current time.
    fn handle_time(&self, now: DateTime<Utc>);

    /// Broadcast transmitter identification.
    fn handle_identification(&self);
}

/// Sink that only logs, standing in for transmitter hardware.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingTransmissionSink;

impl TransmissionSink for LoggingTransmissionSink {
    fn send_rubric(&self, rubric: &Rubric) {
        tracing::info!(
            rubric = %rubric.name,
            address = rubric.address(),
            label = %rubric.label,
            groups = ?rubric.transmitter_group_names,
            "transmit rubric name"
        );
    }

    fn send_news(&self, rubric: &Rubric, news: &News) {
        tracing::info!(
            rubric = %rubric.name,
            address = rubric.address(),
            slot = news.number,
            text = %news.text,
            "transmit news"
        );
    }

    fn handle_time(&self, now: DateTime<Utc>) {
        tracing::info!(time = %now.to_rfc3339(), "transmit time");
    }

    fn handle_identification(&self) {
        tracing::info!("transmit identification");
    }
}
