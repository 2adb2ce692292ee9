//! Lead persistence operations.

use std::collections::HashMap;

use chrono::Utc;
use herald_core::Lead;
use sqlx::SqlitePool;

use crate::error::{Result, StoreError};
use crate::models::{format_ts, LeadRow};

const SELECT_COLUMNS: &str = "id, campaign_id, contact, status, error, sent_at, replied_at";

/// Bulk-insert leads and grow the owning campaigns' totals.
pub async fn add_leads(pool: &SqlitePool, leads: &[Lead]) -> Result<()> {
    let mut tx = pool.begin().await?;

    for lead in leads {
        sqlx::query(
            r#"
            INSERT INTO leads (id, campaign_id, contact, status, error, sent_at, replied_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&lead.id)
        .bind(&lead.campaign_id)
        .bind(&lead.contact)
        .bind(lead.status.as_str())
        .bind(&lead.error)
        .bind(lead.sent_at.as_ref().map(format_ts))
        .bind(lead.replied_at.as_ref().map(format_ts))
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(ref db_err) = e {
                if db_err.is_unique_violation() {
                    return StoreError::AlreadyExists {
                        entity: "Lead",
                        id: lead.id.clone(),
                    };
                }
            }
            StoreError::Sqlx(e)
        })?;
    }

    let mut by_campaign: HashMap<&str, i64> = HashMap::new();
    for lead in leads {
        *by_campaign.entry(lead.campaign_id.as_str()).or_default() += 1;
    }
    for (campaign_id, count) in by_campaign {
        sqlx::query(
            r#"
            UPDATE campaigns
            SET total = total + ?
            WHERE id = ?
            "#,
        )
        .bind(count)
        .bind(campaign_id)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;
    Ok(())
}

/// Pending leads of a campaign, oldest first.
pub async fn pending_leads(pool: &SqlitePool, campaign_id: &str) -> Result<Vec<Lead>> {
    let rows = sqlx::query_as::<_, LeadRow>(&format!(
        r#"
        SELECT {SELECT_COLUMNS}
        FROM leads
        WHERE campaign_id = ? AND status = 'pending'
        ORDER BY rowid
        "#
    ))
    .bind(campaign_id)
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(Lead::from).collect())
}

/// Mark a lead sent, stamping `sent_at`.
pub async fn mark_sent(pool: &SqlitePool, lead_id: &str) -> Result<()> {
    let result = sqlx::query(
        r#"
        UPDATE leads
        SET status = 'sent', sent_at = ?, error = NULL
        WHERE id = ?
        "#,
    )
    .bind(format_ts(&Utc::now()))
    .bind(lead_id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(StoreError::NotFound {
            entity: "Lead",
            id: lead_id.to_string(),
        });
    }

    Ok(())
}

/// Mark a lead failed with the error message.
pub async fn mark_failed(pool: &SqlitePool, lead_id: &str, error: &str) -> Result<()> {
    let result = sqlx::query(
        r#"
        UPDATE leads
        SET status = 'failed', error = ?
        WHERE id = ?
        "#,
    )
    .bind(error)
    .bind(lead_id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(StoreError::NotFound {
            entity: "Lead",
            id: lead_id.to_string(),
        });
    }

    Ok(())
}

/// Mark a lead skipped (dropped without a send attempt).
pub async fn mark_skipped(pool: &SqlitePool, lead_id: &str, reason: &str) -> Result<()> {
    let result = sqlx::query(
        r#"
        UPDATE leads
        SET status = 'skipped', error = ?
        WHERE id = ?
        "#,
    )
    .bind(reason)
    .bind(lead_id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(StoreError::NotFound {
            entity: "Lead",
            id: lead_id.to_string(),
        });
    }

    Ok(())
}

/// Mark the most recent not-yet-replied lead for this contact as replied.
/// Returns the lead touched, if any.
pub async fn mark_replied(pool: &SqlitePool, contact: &str) -> Result<Option<Lead>> {
    let row = sqlx::query_as::<_, LeadRow>(&format!(
        r#"
        SELECT {SELECT_COLUMNS}
        FROM leads
        WHERE contact = ? AND status != 'replied'
        ORDER BY rowid DESC
        LIMIT 1
        "#
    ))
    .bind(contact)
    .fetch_optional(pool)
    .await?;

    let row = match row {
        Some(row) => row,
        None => return Ok(None),
    };

    let now = Utc::now();
    sqlx::query(
        r#"
        UPDATE leads
        SET status = 'replied', replied_at = ?
        WHERE id = ?
        "#,
    )
    .bind(format_ts(&now))
    .bind(&row.id)
    .execute(pool)
    .await?;

    let mut lead = Lead::from(row);
    lead.status = herald_core::LeadStatus::Replied;
    lead.replied_at = Some(now);
    Ok(Some(lead))
}

/// The most recent lead targeting this contact.
pub async fn latest_for_contact(pool: &SqlitePool, contact: &str) -> Result<Option<Lead>> {
    let row = sqlx::query_as::<_, LeadRow>(&format!(
        r#"
        SELECT {SELECT_COLUMNS}
        FROM leads
        WHERE contact = ?
        ORDER BY rowid DESC
        LIMIT 1
        "#
    ))
    .bind(contact)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(Lead::from))
}

/// Store the structured extraction result against a lead.
pub async fn store_analysis(
    pool: &SqlitePool,
    lead_id: &str,
    analysis: &serde_json::Value,
) -> Result<()> {
    let payload = serde_json::to_string(analysis)?;
    let result = sqlx::query(
        r#"
        UPDATE leads
        SET analysis = ?
        WHERE id = ?
        "#,
    )
    .bind(&payload)
    .bind(lead_id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(StoreError::NotFound {
            entity: "Lead",
            id: lead_id.to_string(),
        });
    }

    Ok(())
}

/// Read back a lead's stored extraction result.
pub async fn get_analysis(pool: &SqlitePool, lead_id: &str) -> Result<Option<serde_json::Value>> {
    let raw: Option<Option<String>> = sqlx::query_scalar(
        r#"
        SELECT analysis
        FROM leads
        WHERE id = ?
        "#,
    )
    .bind(lead_id)
    .fetch_optional(pool)
    .await?;

    match raw {
        None => Err(StoreError::NotFound {
            entity: "Lead",
            id: lead_id.to_string(),
        }),
        Some(None) => Ok(None),
        Some(Some(raw)) => Ok(Some(serde_json::from_str(&raw)?)),
    }
}
