//! Conversation persistence operations.
//!
//! Threads are keyed by contact address. Ordering within a thread follows
//! the autoincrement id, which matches arrival order.

use chrono::Utc;
use herald_core::ConversationMessage;
use sqlx::SqlitePool;

use crate::error::Result;
use crate::models::{format_ts, MessageRow};

/// Append a message to a contact's thread.
pub async fn append_message(pool: &SqlitePool, message: &ConversationMessage) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO messages (contact, account, direction, body, automated, timestamp)
        VALUES (?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&message.contact)
    .bind(&message.account)
    .bind(message.direction.as_str())
    .bind(&message.text)
    .bind(message.automated)
    .bind(format_ts(&message.timestamp))
    .execute(pool)
    .await?;

    Ok(())
}

/// Full thread for a contact, oldest first.
pub async fn thread(pool: &SqlitePool, contact: &str) -> Result<Vec<ConversationMessage>> {
    let rows = sqlx::query_as::<_, MessageRow>(
        r#"
        SELECT contact, account, direction, body, automated, timestamp
        FROM messages
        WHERE contact = ?
        ORDER BY id
        "#,
    )
    .bind(contact)
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(ConversationMessage::from).collect())
}

/// Re-key history stored under an alias to the resolved contact.
/// Returns how many messages moved.
pub async fn migrate_thread(pool: &SqlitePool, from_alias: &str, to_contact: &str) -> Result<u64> {
    let result = sqlx::query(
        r#"
        UPDATE messages
        SET contact = ?
        WHERE contact = ?
        "#,
    )
    .bind(to_contact)
    .bind(from_alias)
    .execute(pool)
    .await?;

    Ok(result.rows_affected())
}

/// The most recent contact this account sent to with no later inbound
/// message under that contact's address.
pub async fn latest_unanswered_outbound(
    pool: &SqlitePool,
    account: &str,
) -> Result<Option<String>> {
    let contact = sqlx::query_scalar::<_, String>(
        r#"
        SELECT m.contact
        FROM messages m
        WHERE m.account = ? AND m.direction = 'outbound'
          AND NOT EXISTS (
              SELECT 1 FROM messages r
              WHERE r.contact = m.contact AND r.direction = 'inbound' AND r.id > m.id
          )
        ORDER BY m.id DESC
        LIMIT 1
        "#,
    )
    .bind(account)
    .fetch_optional(pool)
    .await?;

    Ok(contact)
}

/// Contacts whose thread ends with an inbound message and is not closed,
/// oldest thread first.
pub async fn awaiting_reply(pool: &SqlitePool) -> Result<Vec<String>> {
    let contacts = sqlx::query_scalar::<_, String>(
        r#"
        SELECT m.contact
        FROM messages m
        JOIN (SELECT contact, MAX(id) AS last_id FROM messages GROUP BY contact) t
          ON m.contact = t.contact AND m.id = t.last_id
        WHERE m.direction = 'inbound'
          AND m.contact NOT IN (SELECT contact FROM closed_conversations)
        ORDER BY m.id
        "#,
    )
    .fetch_all(pool)
    .await?;

    Ok(contacts)
}

/// Mark a conversation closed. Idempotent.
pub async fn close(pool: &SqlitePool, contact: &str) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO closed_conversations (contact, closed_at)
        VALUES (?, ?)
        ON CONFLICT(contact) DO NOTHING
        "#,
    )
    .bind(contact)
    .bind(format_ts(&Utc::now()))
    .execute(pool)
    .await?;

    Ok(())
}

/// Whether a conversation has been closed.
pub async fn is_closed(pool: &SqlitePool, contact: &str) -> Result<bool> {
    let count: i64 = sqlx::query_scalar(
        r#"
        SELECT COUNT(*)
        FROM closed_conversations
        WHERE contact = ?
        "#,
    )
    .bind(contact)
    .fetch_one(pool)
    .await?;

    Ok(count > 0)
}
