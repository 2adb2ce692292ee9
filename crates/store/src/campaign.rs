//! Campaign persistence operations.

use herald_core::{Campaign, CampaignCounters, CampaignStatus};
use sqlx::SqlitePool;

use crate::error::{Result, StoreError};
use crate::models::{CampaignRow, CountersRow};

/// Insert a new campaign.
pub async fn create_campaign(pool: &SqlitePool, campaign: &Campaign) -> Result<()> {
    let template = serde_json::to_string(&campaign.template.variants)?;
    let continuation = campaign
        .continuation
        .as_ref()
        .map(serde_json::to_string)
        .transpose()?;

    sqlx::query(
        r#"
        INSERT INTO campaigns
            (id, name, template, delay_min_secs, delay_max_secs, status, continuation, sent, errors, total)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&campaign.id)
    .bind(&campaign.name)
    .bind(&template)
    .bind(campaign.delay_min_secs as i64)
    .bind(campaign.delay_max_secs as i64)
    .bind(campaign.status.as_str())
    .bind(&continuation)
    .bind(campaign.sent as i64)
    .bind(campaign.errors as i64)
    .bind(campaign.total as i64)
    .execute(pool)
    .await
    .map_err(|e| {
        if let sqlx::Error::Database(ref db_err) = e {
            if db_err.is_unique_violation() {
                return StoreError::AlreadyExists {
                    entity: "Campaign",
                    id: campaign.id.clone(),
                };
            }
        }
        StoreError::Sqlx(e)
    })?;

    Ok(())
}

/// Get a campaign by id.
pub async fn get_campaign(pool: &SqlitePool, id: &str) -> Result<Campaign> {
    let row = sqlx::query_as::<_, CampaignRow>(
        r#"
        SELECT id, name, template, delay_min_secs, delay_max_secs, status, continuation, sent, errors, total
        FROM campaigns
        WHERE id = ?
        "#,
    )
    .bind(id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| StoreError::NotFound {
        entity: "Campaign",
        id: id.to_string(),
    })?;

    row.into_domain()
}

/// List all campaigns, oldest first.
pub async fn list_campaigns(pool: &SqlitePool) -> Result<Vec<Campaign>> {
    let rows = sqlx::query_as::<_, CampaignRow>(
        r#"
        SELECT id, name, template, delay_min_secs, delay_max_secs, status, continuation, sent, errors, total
        FROM campaigns
        ORDER BY rowid
        "#,
    )
    .fetch_all(pool)
    .await?;

    rows.into_iter().map(CampaignRow::into_domain).collect()
}

/// Persist a campaign's lifecycle status.
pub async fn set_status(pool: &SqlitePool, id: &str, status: CampaignStatus) -> Result<()> {
    let result = sqlx::query(
        r#"
        UPDATE campaigns
        SET status = ?
        WHERE id = ?
        "#,
    )
    .bind(status.as_str())
    .bind(id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(StoreError::NotFound {
            entity: "Campaign",
            id: id.to_string(),
        });
    }

    Ok(())
}

/// Atomically bump the sent counter and return the fresh counters.
pub async fn increment_sent(pool: &SqlitePool, id: &str) -> Result<CampaignCounters> {
    let row = sqlx::query_as::<_, CountersRow>(
        r#"
        UPDATE campaigns
        SET sent = sent + 1
        WHERE id = ?
        RETURNING sent, errors, total
        "#,
    )
    .bind(id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| StoreError::NotFound {
        entity: "Campaign",
        id: id.to_string(),
    })?;

    Ok(row.into())
}

/// Atomically bump the error counter and return the fresh counters.
pub async fn increment_errors(pool: &SqlitePool, id: &str) -> Result<CampaignCounters> {
    let row = sqlx::query_as::<_, CountersRow>(
        r#"
        UPDATE campaigns
        SET errors = errors + 1
        WHERE id = ?
        RETURNING sent, errors, total
        "#,
    )
    .bind(id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| StoreError::NotFound {
        entity: "Campaign",
        id: id.to_string(),
    })?;

    Ok(row.into())
}
