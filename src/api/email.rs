//! Transactional email outbox.
//!
//! Flows that need to send mail insert a row into `email_outbox` inside the
//! same transaction that stores the related token state, so a secret is
//! never persisted without its delivery being queued (and vice versa). A
//! background task polls the table, locks a batch with
//! `FOR UPDATE SKIP LOCKED` and hands each row to an [`EmailSender`].
//! Failed rows are retried with exponential backoff and jitter until a max
//! attempt threshold, then marked `failed`.
//!
//! The default sender for local dev is [`LogEmailSender`], which logs the
//! payload instead of delivering it.

use anyhow::{Context, Result};
use rand::Rng;
use sqlx::{PgPool, Row};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{error, info, info_span, Instrument};
use uuid::Uuid;

#[derive(Clone, Debug)]
pub struct EmailMessage {
    pub to_email: String,
    pub template: String,
    pub payload_json: String,
}

/// Email delivery abstraction used by the outbox worker.
pub trait EmailSender: Send + Sync {
    /// Deliver a message or return an error to mark it as failed.
    fn send(&self, message: &EmailMessage) -> Result<()>;
}

/// Local dev sender that logs the payload instead of sending real email.
#[derive(Clone, Debug)]
pub struct LogEmailSender;

impl EmailSender for LogEmailSender {
    fn send(&self, message: &EmailMessage) -> Result<()> {
        info!(
            to_email = %message.to_email,
            template = %message.template,
            payload = %message.payload_json,
            "email outbox send stub"
        );
        Ok(())
    }
}

#[derive(Clone, Copy, Debug)]
pub struct EmailWorkerConfig {
    poll_interval: Duration,
    batch_size: usize,
    max_attempts: u32,
    backoff_base: Duration,
    backoff_max: Duration,
}

impl EmailWorkerConfig {
    /// Default worker config: 5s poll interval, 10 messages per batch,
    /// 5 max attempts, and 5s->5m exponential backoff with jitter.
    #[must_use]
    pub fn new() -> Self {
        Self {
            poll_interval: Duration::from_secs(5),
            batch_size: 10,
            max_attempts: 5,
            backoff_base: Duration::from_secs(5),
            backoff_max: Duration::from_secs(300),
        }
    }

    #[must_use]
    pub fn normalize(self) -> Self {
        let poll_interval = if self.poll_interval.is_zero() {
            Duration::from_secs(1)
        } else {
            self.poll_interval
        };
        let batch_size = if self.batch_size == 0 {
            1
        } else {
            self.batch_size
        };
        let max_attempts = self.max_attempts.max(1);
        let backoff_base = if self.backoff_base.is_zero() {
            Duration::from_secs(1)
        } else {
            self.backoff_base
        };
        let backoff_max = if self.backoff_max < backoff_base {
            backoff_base
        } else {
            self.backoff_max
        };
        Self {
            poll_interval,
            batch_size,
            max_attempts,
            backoff_base,
            backoff_max,
        }
    }

    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    #[must_use]
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    #[must_use]
    pub fn backoff_base(&self) -> Duration {
        self.backoff_base
    }

    #[must_use]
    pub fn backoff_max(&self) -> Duration {
        self.backoff_max
    }
}

impl Default for EmailWorkerConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Queue a message inside the caller's transaction.
pub async fn enqueue(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    to_email: &str,
    template: &str,
    payload: &serde_json::Value,
) -> Result<()> {
    let query = r"
        INSERT INTO email_outbox (to_email, template, payload_json)
        VALUES ($1, $2, $3::jsonb)
    ";
    let span = info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query
    );
    sqlx::query(query)
        .bind(to_email)
        .bind(template)
        .bind(payload.to_string())
        .execute(&mut **tx)
        .instrument(span)
        .await
        .context("failed to insert email outbox row")?;

    Ok(())
}

/// Queue a message in its own short transaction. For notices that do not
/// need to be atomic with other writes.
pub async fn enqueue_via_pool(
    pool: &PgPool,
    to_email: &str,
    template: &str,
    payload: &serde_json::Value,
) -> Result<()> {
    let mut tx = pool.begin().await.context("begin outbox transaction")?;
    enqueue(&mut tx, to_email, template, payload).await?;
    tx.commit().await.context("commit outbox transaction")?;

    Ok(())
}

/// Spawn a background task that polls and processes the email outbox.
pub fn spawn_outbox_worker(
    pool: PgPool,
    sender: Arc<dyn EmailSender>,
    config: EmailWorkerConfig,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let config = config.normalize();
        let poll_interval = config.poll_interval();

        loop {
            let batch_result = process_outbox_batch(&pool, sender.as_ref(), &config).await;
            if let Err(err) = batch_result {
                error!("email outbox batch failed: {err}");
            }

            sleep(poll_interval).await;
        }
    })
}

async fn process_outbox_batch(
    pool: &PgPool,
    sender: &dyn EmailSender,
    config: &EmailWorkerConfig,
) -> Result<usize> {
    let mut tx = pool
        .begin()
        .await
        .context("failed to start email outbox transaction")?;

    // Grab a locked batch so multiple workers can run without double-sending.
    let query = r"
        SELECT id, to_email, template, payload_json::text AS payload_json, attempts
        FROM email_outbox
        WHERE status = 'pending'
          AND next_attempt_at <= NOW()
        ORDER BY next_attempt_at ASC, created_at ASC
        LIMIT $1
        FOR UPDATE SKIP LOCKED
    ";
    let span = info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let rows = sqlx::query(query)
        .bind(i64::try_from(config.batch_size()).unwrap_or(0))
        .fetch_all(&mut *tx)
        .instrument(span)
        .await
        .context("failed to load email outbox batch")?;

    if rows.is_empty() {
        // Commit even on empty to release locks and keep poll loop consistent.
        tx.commit()
            .await
            .context("failed to commit empty outbox batch")?;
        return Ok(0);
    }

    let row_count = rows.len();
    for row in rows {
        let id: Uuid = row.get("id");
        let attempts: i32 = row.get("attempts");
        let attempts = u32::try_from(attempts).unwrap_or(0);
        let message = EmailMessage {
            to_email: row.get("to_email"),
            template: row.get("template"),
            payload_json: row.get("payload_json"),
        };

        let send_result = sender.send(&message);
        update_outbox_status(&mut tx, id, attempts, send_result, config).await?;
    }

    tx.commit()
        .await
        .context("failed to commit email outbox batch")?;

    Ok(row_count)
}

async fn update_outbox_status(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    id: Uuid,
    attempts: u32,
    send_result: Result<()>,
    config: &EmailWorkerConfig,
) -> Result<()> {
    let next_attempt = attempts.saturating_add(1);
    let next_attempts_i32 = i32::try_from(next_attempt).unwrap_or(i32::MAX);
    match send_result {
        Ok(()) => {
            let query = r"
                UPDATE email_outbox
                SET status = 'sent',
                    attempts = $2,
                    last_error = NULL,
                    sent_at = NOW(),
                    next_attempt_at = NOW()
                WHERE id = $1
            ";
            let span = info_span!(
                "db.query",
                db.system = "postgresql",
                db.operation = "UPDATE",
                db.statement = query
            );
            sqlx::query(query)
                .bind(id)
                .bind(next_attempts_i32)
                .execute(&mut **tx)
                .instrument(span)
                .await
                .context("failed to update outbox status to sent")?;
        }
        Err(err) => {
            if next_attempt >= config.max_attempts() {
                let query = r"
                    UPDATE email_outbox
                    SET status = 'failed',
                        attempts = $2,
                        last_error = $3,
                        next_attempt_at = NOW()
                    WHERE id = $1
                ";
                let span = info_span!(
                    "db.query",
                    db.system = "postgresql",
                    db.operation = "UPDATE",
                    db.statement = query
                );
                sqlx::query(query)
                    .bind(id)
                    .bind(next_attempts_i32)
                    .bind(err.to_string())
                    .execute(&mut **tx)
                    .instrument(span)
                    .await
                    .context("failed to update outbox status to failed")?;
            } else {
                let delay =
                    backoff_delay(next_attempt, config.backoff_base(), config.backoff_max());
                let delay_ms = i64::try_from(delay.as_millis()).unwrap_or(i64::MAX);
                let query = r"
                    UPDATE email_outbox
                    SET status = 'pending',
                        attempts = $2,
                        last_error = $3,
                        next_attempt_at = NOW() + ($4 * INTERVAL '1 millisecond')
                    WHERE id = $1
                ";
                let span = info_span!(
                    "db.query",
                    db.system = "postgresql",
                    db.operation = "UPDATE",
                    db.statement = query
                );
                sqlx::query(query)
                    .bind(id)
                    .bind(next_attempts_i32)
                    .bind(err.to_string())
                    .bind(delay_ms)
                    .execute(&mut **tx)
                    .instrument(span)
                    .await
                    .context("failed to update outbox retry schedule")?;
            }
        }
    }

    Ok(())
}

fn backoff_delay(attempt: u32, base: Duration, max: Duration) -> Duration {
    let shift = attempt.saturating_sub(1).min(31);
    let factor = 1u32 << shift;
    let delay = base.checked_mul(factor).unwrap_or(max);
    let capped = if delay > max { max } else { delay };
    jitter_delay(capped)
}

fn jitter_delay(delay: Duration) -> Duration {
    let delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
    if delay_ms < 2 {
        return delay;
    }
    let half = delay_ms / 2;
    let jitter = rand::thread_rng().gen_range(0..=half);
    Duration::from_millis(half + jitter)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_fixes_zero_values() {
        let config = EmailWorkerConfig {
            poll_interval: Duration::ZERO,
            batch_size: 0,
            max_attempts: 0,
            backoff_base: Duration::ZERO,
            backoff_max: Duration::ZERO,
        }
        .normalize();

        assert_eq!(config.poll_interval(), Duration::from_secs(1));
        assert_eq!(config.batch_size(), 1);
        assert_eq!(config.max_attempts(), 1);
        assert_eq!(config.backoff_base(), Duration::from_secs(1));
        assert!(config.backoff_max() >= config.backoff_base());
    }

    #[test]
    fn backoff_grows_and_caps() {
        let base = Duration::from_secs(5);
        let max = Duration::from_secs(300);

        // Jitter keeps the result within [delay/2, delay].
        let first = backoff_delay(1, base, max);
        assert!(first <= base);

        let late = backoff_delay(30, base, max);
        assert!(late <= max);
    }

    #[test]
    fn jitter_stays_within_bounds() {
        let delay = Duration::from_millis(1000);
        for _ in 0..32 {
            let jittered = jitter_delay(delay);
            assert!(jittered >= Duration::from_millis(500));
            assert!(jittered <= delay);
        }
    }

    #[test]
    fn log_sender_always_succeeds() {
        let message = EmailMessage {
            to_email: "a@b.cl".to_string(),
            template: "verify_account".to_string(),
            payload_json: "{}".to_string(),
        };
        assert!(LogEmailSender.send(&message).is_ok());
    }
}
