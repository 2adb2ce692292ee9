//! Broadcast events for external observers.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::models::{AccountStatus, CampaignStatus, QueueState};

/// Default buffer size for the broadcast channel.
const DEFAULT_CAPACITY: usize = 256;

/// An engine event published for UIs, logs and other observers.
///
/// Events are informational: no component takes decisions based on receiving
/// them, and losing events (slow or absent subscribers) is acceptable.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// An account's connection state changed.
    AccountStatus {
        account: String,
        status: AccountStatus,
    },

    /// The transport issued a pairing challenge (QR payload or code).
    PairingChallenge { account: String, data: String },

    /// A send queue changed state.
    QueueChanged { account: String, state: QueueState },

    /// The next send from this account is scheduled in `in_secs` seconds.
    NextSend {
        account: String,
        contact: String,
        in_secs: u64,
    },

    /// A queued item was dropped without a send attempt.
    SendSkipped {
        account: String,
        contact: String,
        reason: String,
    },

    /// Campaign counters moved.
    CampaignStats {
        campaign_id: String,
        sent: u64,
        errors: u64,
        total: u64,
    },

    /// A campaign changed lifecycle state.
    CampaignStatus {
        campaign_id: String,
        status: CampaignStatus,
    },

    /// An inbound reply was matched to a lead.
    LeadReplied { campaign_id: String, contact: String },

    /// The continuation engine sent an automated follow-up.
    AutoReply { account: String, contact: String },

    /// A conversation was terminated by the continuation engine.
    ConversationClosed { contact: String },
}

impl Event {
    /// Short human-readable description for logs.
    pub fn description(&self) -> String {
        match self {
            Self::AccountStatus { account, status } => {
                format!("{} -> {}", account, status.as_str())
            }
            Self::PairingChallenge { account, .. } => format!("pairing challenge for {}", account),
            Self::QueueChanged { account, state } => format!("queue {} {:?}", account, state),
            Self::NextSend {
                account, in_secs, ..
            } => format!("{} next send in {}s", account, in_secs),
            Self::SendSkipped {
                account, reason, ..
            } => format!("{} skipped: {}", account, reason),
            Self::CampaignStats {
                campaign_id,
                sent,
                errors,
                total,
            } => format!("{}: {}/{} sent, {} errors", campaign_id, sent, total, errors),
            Self::CampaignStatus {
                campaign_id,
                status,
            } => format!("{} -> {}", campaign_id, status.as_str()),
            Self::LeadReplied { contact, .. } => format!("reply from {}", contact),
            Self::AutoReply { contact, .. } => format!("auto-reply to {}", contact),
            Self::ConversationClosed { contact } => format!("conversation {} closed", contact),
        }
    }
}

/// Fire-and-forget broadcast sink shared by all components.
///
/// Publishing never blocks and never fails: with no subscribers the event is
/// simply dropped, and slow subscribers lag rather than back-pressure the
/// engine.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<Event>,
}

impl EventBus {
    /// Create a bus with the default buffer capacity.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Create a bus with a custom buffer capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Publish an event to all current subscribers.
    pub fn publish(&self, event: Event) {
        tracing::trace!("event: {}", event.description());
        // A send error only means nobody is listening right now.
        let _ = self.tx.send(event);
    }

    /// Subscribe to events published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }

    /// Number of live subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_publish_without_subscribers_is_silent() {
        let bus = EventBus::new();
        // Must not panic or block.
        bus.publish(Event::ConversationClosed {
            contact: "+15550001111".to_string(),
        });
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_subscriber_receives_events() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();

        bus.publish(Event::AccountStatus {
            account: "+15559990000".to_string(),
            status: AccountStatus::Online,
        });

        match rx.recv().await.unwrap() {
            Event::AccountStatus { account, status } => {
                assert_eq!(account, "+15559990000");
                assert_eq!(status, AccountStatus::Online);
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn test_event_serializes_tagged() {
        let event = Event::QueueChanged {
            account: "+15559990000".to_string(),
            state: QueueState::Running,
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains(r#""type":"queue_changed""#));
        assert!(json.contains(r#""state":"running""#));
    }
}
