use crate::event::format_title_id;
use crate::event_queue::EventQueue;
use crate::payload::{DeviceContext, WebhookPayload};
use crate::titles::TitleMetadata;
use crate::transport::Transport;

/// Result of one [`Dispatcher::deliver_next`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// The head of the queue reached the endpoint and was removed.
    Delivered,
    /// Nothing was queued.
    Empty,
    /// Delivery failed; the head stays queued for the next attempt.
    Failed,
}

/// Turns queued records into webhook notifications, one at a time.
pub struct Dispatcher<M, T> {
    endpoint_url: String,
    device: DeviceContext,
    metadata: M,
    transport: T,
}

impl<M: TitleMetadata, T: Transport> Dispatcher<M, T> {
    pub fn new(endpoint_url: impl Into<String>, device: DeviceContext, metadata: M, transport: T) -> Self {
        Self {
            endpoint_url: endpoint_url.into(),
            device,
            metadata,
            transport,
        }
    }

    pub fn endpoint_url(&self) -> &str {
        &self.endpoint_url
    }

    /// Attempts to deliver the oldest queued record.
    ///
    /// The record is only removed from `queue` once the transport reports
    /// success, so a failed attempt leaves the queue exactly as it was.
    pub async fn deliver_next(&mut self, queue: &mut EventQueue) -> DeliveryOutcome {
        let Some(record) = queue.peek() else {
            return DeliveryOutcome::Empty;
        };
        let title_id = format_title_id(record.application_id);

        let title = match self.metadata.lookup(record.application_id) {
            Ok(info) => Some(info),
            Err(e) => {
                tracing::warn!(%title_id, error = %e, "Title metadata lookup failed; sending placeholders");
                None
            }
        };

        let body = match WebhookPayload::new(&record, title.as_ref(), &self.device).to_json() {
            Ok(body) => body,
            Err(e) => {
                tracing::error!(%title_id, error = %e, "Failed to serialize webhook payload");
                return DeliveryOutcome::Failed;
            }
        };

        match self.transport.post_json(&self.endpoint_url, body).await {
            Ok(()) => {
                queue.free();
                tracing::info!(%title_id, kind = ?record.kind, "Delivered play event");
                DeliveryOutcome::Delivered
            }
            Err(e) => {
                tracing::warn!(%title_id, error = %e, pending = queue.len(), "Failed to push webhook event");
                DeliveryOutcome::Failed
            }
        }
    }
}
