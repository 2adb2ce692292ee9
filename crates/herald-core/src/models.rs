//! Entity models shared across the engine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Connection state of one sending account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountStatus {
    /// Not connected and not trying to connect.
    Offline,
    /// Connecting, or waiting out a reconnect backoff window.
    Initializing,
    /// Transport issued a QR pairing challenge; waiting for a scan.
    QrPending,
    /// Transport issued a pairing-code challenge; waiting for entry.
    PairingPending,
    /// Connected and able to send.
    Online,
    /// Blocked by the host platform. Terminal; never auto-reconnected.
    Banned,
}

impl AccountStatus {
    /// Stable string form used for persistence.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Offline => "offline",
            Self::Initializing => "initializing",
            Self::QrPending => "qr_pending",
            Self::PairingPending => "pairing_pending",
            Self::Online => "online",
            Self::Banned => "banned",
        }
    }

    /// Parse the persisted string form. Unknown values fall back to Offline.
    pub fn parse_str(s: &str) -> Self {
        match s {
            "initializing" => Self::Initializing,
            "qr_pending" => Self::QrPending,
            "pairing_pending" => Self::PairingPending,
            "online" => Self::Online,
            "banned" => Self::Banned,
            _ => Self::Offline,
        }
    }
}

/// One sending identity with its own connection lifecycle and daily quota.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    /// Stable contact address of the sending identity (phone-style).
    pub address: String,
    /// Operator-facing label.
    pub label: String,
    /// Opaque handle to stored transport credentials, if paired.
    /// Cleared when the platform rejects them twice in a row.
    pub credentials_ref: Option<String>,
    /// Current connection state.
    pub status: AccountStatus,
    /// When the account last reached [`AccountStatus::Online`].
    pub connected_at: Option<DateTime<Utc>>,
    /// Consecutive reconnect attempts since the last successful connect.
    pub reconnect_attempts: u32,
}

impl Account {
    /// Create a new offline account.
    pub fn new(address: impl Into<String>) -> Self {
        let address = address.into();
        Self {
            label: address.clone(),
            address,
            credentials_ref: None,
            status: AccountStatus::Offline,
            connected_at: None,
            reconnect_attempts: 0,
        }
    }

    /// Set the operator-facing label.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    /// Set the stored credentials handle.
    pub fn with_credentials(mut self, credentials_ref: impl Into<String>) -> Self {
        self.credentials_ref = Some(credentials_ref.into());
        self
    }
}

/// Lifecycle state of a campaign.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CampaignStatus {
    /// Created but never started.
    Draft,
    /// Leads distributed, queues running.
    Running,
    /// Queues hold before each send; items stay queued.
    Paused,
    /// Stopped by the operator; queues cleared.
    Stopped,
    /// Every lead reached a terminal status.
    Completed,
}

impl CampaignStatus {
    /// Stable string form used for persistence.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Running => "running",
            Self::Paused => "paused",
            Self::Stopped => "stopped",
            Self::Completed => "completed",
        }
    }

    /// Parse the persisted string form. Unknown values fall back to Draft.
    pub fn parse_str(s: &str) -> Self {
        match s {
            "running" => Self::Running,
            "paused" => Self::Paused,
            "stopped" => Self::Stopped,
            "completed" => Self::Completed,
            _ => Self::Draft,
        }
    }
}

/// A message template with interchangeable plain-text variants.
///
/// The send queue picks one variant uniformly at send time so repeated sends
/// don't produce byte-identical messages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageTemplate {
    /// At least one variant; all are complete messages.
    pub variants: Vec<String>,
}

impl MessageTemplate {
    /// Create a template from a list of variants.
    pub fn new(variants: Vec<String>) -> Self {
        Self { variants }
    }

    /// Create a single-variant template.
    pub fn single(text: impl Into<String>) -> Self {
        Self {
            variants: vec![text.into()],
        }
    }

    /// Whether the template has no usable variant.
    pub fn is_empty(&self) -> bool {
        self.variants.iter().all(|v| v.trim().is_empty())
    }
}

/// Criteria for AI-driven conversation continuation on a campaign.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContinuationCriteria {
    /// Data categories the conversation is trying to fill
    /// (e.g. "budget", "timeline").
    pub categories: Vec<String>,
    /// Hard cap on automated follow-ups for one conversation.
    pub max_replies: u32,
}

impl ContinuationCriteria {
    /// Default hard cap on automated follow-ups.
    pub const DEFAULT_MAX_REPLIES: u32 = 10;

    /// Create criteria for the given categories with the default reply cap.
    pub fn new(categories: Vec<String>) -> Self {
        Self {
            categories,
            max_replies: Self::DEFAULT_MAX_REPLIES,
        }
    }
}

/// A configured outbound campaign: template, pacing bounds and counters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Campaign {
    /// Unique id (UUID v4).
    pub id: String,
    /// Operator-facing name.
    pub name: String,
    /// Message template with randomizable variants.
    pub template: MessageTemplate,
    /// Lower pacing bound, seconds between sends.
    pub delay_min_secs: u64,
    /// Upper pacing bound, seconds between sends.
    pub delay_max_secs: u64,
    /// Lifecycle state.
    pub status: CampaignStatus,
    /// Optional AI continuation criteria.
    pub continuation: Option<ContinuationCriteria>,
    /// Successful sends so far.
    pub sent: u64,
    /// Failed sends so far.
    pub errors: u64,
    /// Total leads imported.
    pub total: u64,
}

impl Campaign {
    /// Create a draft campaign with the given name, template and pacing bounds.
    pub fn new(
        name: impl Into<String>,
        template: MessageTemplate,
        delay_min_secs: u64,
        delay_max_secs: u64,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            template,
            delay_min_secs,
            delay_max_secs,
            status: CampaignStatus::Draft,
            continuation: None,
            sent: 0,
            errors: 0,
            total: 0,
        }
    }

    /// Attach AI continuation criteria.
    pub fn with_continuation(mut self, criteria: ContinuationCriteria) -> Self {
        self.continuation = Some(criteria);
        self
    }
}

/// Delivery state of a single lead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeadStatus {
    /// Not yet attempted.
    Pending,
    /// Campaign message delivered.
    Sent,
    /// The contact wrote back.
    Replied,
    /// Send attempt failed.
    Failed,
    /// Dropped without a send attempt for a non-retryable reason (e.g. an
    /// empty template). Daily-cap skips instead leave the lead Pending.
    Skipped,
}

impl LeadStatus {
    /// Stable string form used for persistence.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Sent => "sent",
            Self::Replied => "replied",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
        }
    }

    /// Parse the persisted string form. Unknown values fall back to Pending.
    pub fn parse_str(s: &str) -> Self {
        match s {
            "sent" => Self::Sent,
            "replied" => Self::Replied,
            "failed" => Self::Failed,
            "skipped" => Self::Skipped,
            _ => Self::Pending,
        }
    }
}

/// One target contact scheduled to receive a campaign message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lead {
    /// Unique id (UUID v4).
    pub id: String,
    /// Owning campaign.
    pub campaign_id: String,
    /// Target contact address.
    pub contact: String,
    /// Delivery state.
    pub status: LeadStatus,
    /// Error message from the last failed attempt.
    pub error: Option<String>,
    /// When the campaign message was sent.
    pub sent_at: Option<DateTime<Utc>>,
    /// When the first reply arrived.
    pub replied_at: Option<DateTime<Utc>>,
}

impl Lead {
    /// Create a pending lead for a campaign.
    pub fn new(campaign_id: impl Into<String>, contact: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            campaign_id: campaign_id.into(),
            contact: contact.into(),
            status: LeadStatus::Pending,
            error: None,
            sent_at: None,
            replied_at: None,
        }
    }
}

/// State of one per-account send queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueState {
    /// No processing loop running.
    Stopped,
    /// Loop running and dispatching.
    Running,
    /// Loop running but holding before each send.
    Paused,
}

/// A materialized, in-flight unit of work: one lead assigned to one account.
///
/// Exists only while queued. The queue removes it *before* the send attempt,
/// so a crash mid-send surfaces as a failed lead on reconciliation rather
/// than a duplicate send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueItem {
    /// Lead this item was materialized from.
    pub lead_id: String,
    /// Owning campaign.
    pub campaign_id: String,
    /// Sending account address.
    pub account: String,
    /// Target contact address.
    pub contact: String,
    /// Template to expand at send time.
    pub template: MessageTemplate,
    /// Lower pacing bound, seconds.
    pub delay_min_secs: u64,
    /// Upper pacing bound, seconds.
    pub delay_max_secs: u64,
}

impl QueueItem {
    /// Materialize a queue item from a lead and its campaign.
    pub fn for_lead(lead: &Lead, campaign: &Campaign, account: impl Into<String>) -> Self {
        Self {
            lead_id: lead.id.clone(),
            campaign_id: campaign.id.clone(),
            account: account.into(),
            contact: lead.contact.clone(),
            template: campaign.template.clone(),
            delay_min_secs: campaign.delay_min_secs,
            delay_max_secs: campaign.delay_max_secs,
        }
    }
}

/// Direction of a conversation message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// Received from the contact.
    Inbound,
    /// Sent by one of our accounts.
    Outbound,
}

impl Direction {
    /// Stable string form used for persistence.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Inbound => "inbound",
            Self::Outbound => "outbound",
        }
    }

    /// Parse the persisted string form. Unknown values fall back to Inbound.
    pub fn parse_str(s: &str) -> Self {
        match s {
            "outbound" => Self::Outbound,
            _ => Self::Inbound,
        }
    }
}

/// One message in a conversation thread.
///
/// Threads are keyed by contact, independent of which account sent or
/// received; order within a thread is append-only and monotonic by arrival.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationMessage {
    /// Contact address the thread is keyed by (may start out as an
    /// unresolved alias and be migrated later).
    pub contact: String,
    /// Account that sent or received the message.
    pub account: String,
    /// Inbound or outbound.
    pub direction: Direction,
    /// Message text.
    pub text: String,
    /// True when the engine produced this message (campaign or follow-up).
    pub automated: bool,
    /// Arrival/send time.
    pub timestamp: DateTime<Utc>,
}

impl ConversationMessage {
    /// Record an inbound message from a contact.
    pub fn inbound(
        contact: impl Into<String>,
        account: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        Self {
            contact: contact.into(),
            account: account.into(),
            direction: Direction::Inbound,
            text: text.into(),
            automated: false,
            timestamp: Utc::now(),
        }
    }

    /// Record an outbound message sent through one of our accounts.
    pub fn outbound(
        contact: impl Into<String>,
        account: impl Into<String>,
        text: impl Into<String>,
        automated: bool,
    ) -> Self {
        Self {
            contact: contact.into(),
            account: account.into(),
            direction: Direction::Outbound,
            text: text.into(),
            automated,
            timestamp: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_string_round_trips() {
        for status in [
            AccountStatus::Offline,
            AccountStatus::Initializing,
            AccountStatus::QrPending,
            AccountStatus::PairingPending,
            AccountStatus::Online,
            AccountStatus::Banned,
        ] {
            assert_eq!(AccountStatus::parse_str(status.as_str()), status);
        }
        assert_eq!(AccountStatus::parse_str("garbage"), AccountStatus::Offline);
    }

    #[test]
    fn test_campaign_defaults() {
        let campaign = Campaign::new("spring", MessageTemplate::single("hi"), 30, 90);
        assert_eq!(campaign.status, CampaignStatus::Draft);
        assert_eq!(campaign.sent, 0);
        assert_eq!(campaign.errors, 0);
        assert!(campaign.continuation.is_none());
        assert!(!campaign.id.is_empty());
    }

    #[test]
    fn test_queue_item_from_lead() {
        let campaign = Campaign::new("spring", MessageTemplate::single("hi"), 30, 90);
        let lead = Lead::new(&campaign.id, "+15550001111");
        let item = QueueItem::for_lead(&lead, &campaign, "+15559990000");

        assert_eq!(item.lead_id, lead.id);
        assert_eq!(item.campaign_id, campaign.id);
        assert_eq!(item.contact, "+15550001111");
        assert_eq!(item.account, "+15559990000");
        assert_eq!(item.delay_min_secs, 30);
        assert_eq!(item.delay_max_secs, 90);
    }

    #[test]
    fn test_template_is_empty() {
        assert!(MessageTemplate::new(vec![]).is_empty());
        assert!(MessageTemplate::new(vec!["  ".to_string()]).is_empty());
        assert!(!MessageTemplate::single("hello").is_empty());
    }
}
