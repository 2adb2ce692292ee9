//! Account persistence operations.

use herald_core::{Account, AccountStatus};
use sqlx::SqlitePool;

use crate::error::{Result, StoreError};
use crate::models::{format_ts, AccountRow};

/// Insert or replace an account record.
pub async fn upsert_account(pool: &SqlitePool, account: &Account) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO accounts (address, label, credentials_ref, status, connected_at, reconnect_attempts)
        VALUES (?, ?, ?, ?, ?, ?)
        ON CONFLICT(address) DO UPDATE SET
            label = excluded.label,
            credentials_ref = excluded.credentials_ref,
            status = excluded.status,
            connected_at = excluded.connected_at,
            reconnect_attempts = excluded.reconnect_attempts
        "#,
    )
    .bind(&account.address)
    .bind(&account.label)
    .bind(&account.credentials_ref)
    .bind(account.status.as_str())
    .bind(account.connected_at.as_ref().map(format_ts))
    .bind(account.reconnect_attempts as i64)
    .execute(pool)
    .await?;

    Ok(())
}

/// Get an account by address.
pub async fn get_account(pool: &SqlitePool, address: &str) -> Result<Account> {
    sqlx::query_as::<_, AccountRow>(
        r#"
        SELECT address, label, credentials_ref, status, connected_at, reconnect_attempts
        FROM accounts
        WHERE address = ?
        "#,
    )
    .bind(address)
    .fetch_optional(pool)
    .await?
    .map(Account::from)
    .ok_or_else(|| StoreError::NotFound {
        entity: "Account",
        id: address.to_string(),
    })
}

/// List all accounts.
pub async fn list_accounts(pool: &SqlitePool) -> Result<Vec<Account>> {
    let rows = sqlx::query_as::<_, AccountRow>(
        r#"
        SELECT address, label, credentials_ref, status, connected_at, reconnect_attempts
        FROM accounts
        ORDER BY address
        "#,
    )
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(Account::from).collect())
}

/// Persist an account's connection status.
pub async fn update_status(pool: &SqlitePool, address: &str, status: AccountStatus) -> Result<()> {
    let result = sqlx::query(
        r#"
        UPDATE accounts
        SET status = ?
        WHERE address = ?
        "#,
    )
    .bind(status.as_str())
    .bind(address)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(StoreError::NotFound {
            entity: "Account",
            id: address.to_string(),
        });
    }

    Ok(())
}

/// Drop the stored credentials handle.
pub async fn clear_credentials(pool: &SqlitePool, address: &str) -> Result<()> {
    let result = sqlx::query(
        r#"
        UPDATE accounts
        SET credentials_ref = NULL
        WHERE address = ?
        "#,
    )
    .bind(address)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(StoreError::NotFound {
            entity: "Account",
            id: address.to_string(),
        });
    }

    Ok(())
}

/// Delete an account by address.
pub async fn delete_account(pool: &SqlitePool, address: &str) -> Result<()> {
    let result = sqlx::query(
        r#"
        DELETE FROM accounts
        WHERE address = ?
        "#,
    )
    .bind(address)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(StoreError::NotFound {
            entity: "Account",
            id: address.to_string(),
        });
    }

    Ok(())
}
