//! Database row models and their domain conversions.
//!
//! Rows keep SQLite-friendly shapes: TEXT timestamps in RFC 3339 and JSON
//! payload columns for templates, criteria and extraction results. The
//! conversions turn them back into `herald-core` entities.

use chrono::{DateTime, Utc};
use herald_core::{
    Account, AccountStatus, Campaign, CampaignCounters, CampaignStatus, ContinuationCriteria,
    ConversationMessage, Direction, Lead, LeadStatus, MessageTemplate,
};
use sqlx::FromRow;

use crate::error::Result;

/// Render a timestamp the way this store persists them.
pub(crate) fn format_ts(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339()
}

/// Parse a persisted timestamp. Unparseable values become `None`.
pub(crate) fn parse_ts(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// One row of the `accounts` table.
#[derive(Debug, Clone, FromRow)]
pub struct AccountRow {
    pub address: String,
    pub label: String,
    pub credentials_ref: Option<String>,
    pub status: String,
    pub connected_at: Option<String>,
    pub reconnect_attempts: i64,
}

impl From<AccountRow> for Account {
    fn from(row: AccountRow) -> Self {
        Account {
            address: row.address,
            label: row.label,
            credentials_ref: row.credentials_ref,
            status: AccountStatus::parse_str(&row.status),
            connected_at: row.connected_at.as_deref().and_then(parse_ts),
            reconnect_attempts: u32::try_from(row.reconnect_attempts).unwrap_or(0),
        }
    }
}

/// One row of the `campaigns` table.
#[derive(Debug, Clone, FromRow)]
pub struct CampaignRow {
    pub id: String,
    pub name: String,
    pub template: String,
    pub delay_min_secs: i64,
    pub delay_max_secs: i64,
    pub status: String,
    pub continuation: Option<String>,
    pub sent: i64,
    pub errors: i64,
    pub total: i64,
}

impl CampaignRow {
    /// Decode the JSON payload columns into a domain campaign.
    pub fn into_domain(self) -> Result<Campaign> {
        let variants: Vec<String> = serde_json::from_str(&self.template)?;
        let continuation: Option<ContinuationCriteria> = match self.continuation.as_deref() {
            Some(raw) => Some(serde_json::from_str(raw)?),
            None => None,
        };
        Ok(Campaign {
            id: self.id,
            name: self.name,
            template: MessageTemplate::new(variants),
            delay_min_secs: self.delay_min_secs.max(0) as u64,
            delay_max_secs: self.delay_max_secs.max(0) as u64,
            status: CampaignStatus::parse_str(&self.status),
            continuation,
            sent: self.sent.max(0) as u64,
            errors: self.errors.max(0) as u64,
            total: self.total.max(0) as u64,
        })
    }
}

/// Counters returned by the atomic increment statements.
#[derive(Debug, Clone, Copy, FromRow)]
pub struct CountersRow {
    pub sent: i64,
    pub errors: i64,
    pub total: i64,
}

impl From<CountersRow> for CampaignCounters {
    fn from(row: CountersRow) -> Self {
        CampaignCounters {
            sent: row.sent.max(0) as u64,
            errors: row.errors.max(0) as u64,
            total: row.total.max(0) as u64,
        }
    }
}

/// One row of the `leads` table (the extraction payload is read separately).
#[derive(Debug, Clone, FromRow)]
pub struct LeadRow {
    pub id: String,
    pub campaign_id: String,
    pub contact: String,
    pub status: String,
    pub error: Option<String>,
    pub sent_at: Option<String>,
    pub replied_at: Option<String>,
}

impl From<LeadRow> for Lead {
    fn from(row: LeadRow) -> Self {
        Lead {
            id: row.id,
            campaign_id: row.campaign_id,
            contact: row.contact,
            status: LeadStatus::parse_str(&row.status),
            error: row.error,
            sent_at: row.sent_at.as_deref().and_then(parse_ts),
            replied_at: row.replied_at.as_deref().and_then(parse_ts),
        }
    }
}

/// One row of the `messages` table.
#[derive(Debug, Clone, FromRow)]
pub struct MessageRow {
    pub contact: String,
    pub account: String,
    pub direction: String,
    pub body: String,
    pub automated: bool,
    pub timestamp: String,
}

impl From<MessageRow> for ConversationMessage {
    fn from(row: MessageRow) -> Self {
        ConversationMessage {
            contact: row.contact,
            account: row.account,
            direction: Direction::parse_str(&row.direction),
            text: row.body,
            automated: row.automated,
            timestamp: parse_ts(&row.timestamp).unwrap_or(DateTime::<Utc>::MIN_UTC),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timestamp_round_trip() {
        let now = Utc::now();
        let parsed = parse_ts(&format_ts(&now)).unwrap();
        assert_eq!(parsed, now);
    }

    #[test]
    fn test_unparseable_timestamp_is_none() {
        assert!(parse_ts("not a timestamp").is_none());
    }

    #[test]
    fn test_campaign_row_decodes_payload_columns() {
        let row = CampaignRow {
            id: "c-1".to_string(),
            name: "spring".to_string(),
            template: r#"["hi there","hello!"]"#.to_string(),
            delay_min_secs: 30,
            delay_max_secs: 90,
            status: "running".to_string(),
            continuation: Some(r#"{"categories":["budget"],"max_replies":5}"#.to_string()),
            sent: 3,
            errors: 1,
            total: 10,
        };
        let campaign = row.into_domain().unwrap();
        assert_eq!(campaign.template.variants.len(), 2);
        assert_eq!(campaign.status, CampaignStatus::Running);
        let criteria = campaign.continuation.unwrap();
        assert_eq!(criteria.categories, vec!["budget".to_string()]);
        assert_eq!(criteria.max_replies, 5);
    }

    #[test]
    fn test_campaign_row_rejects_corrupt_template() {
        let row = CampaignRow {
            id: "c-1".to_string(),
            name: "spring".to_string(),
            template: "not json".to_string(),
            delay_min_secs: 30,
            delay_max_secs: 90,
            status: "draft".to_string(),
            continuation: None,
            sent: 0,
            errors: 0,
            total: 0,
        };
        assert!(row.into_domain().is_err());
    }
}
