use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use diesel::prelude::*;
use diesel_async::{pooled_connection::bb8::Pool, AsyncPgConnection, RunQueryDsl};
use shared::{NotificationJob, NotificationStatus};
use uuid::Uuid;

use crate::models::*;
use crate::schema::notifications;

pub type DbPool = Pool<AsyncPgConnection>;

/// Side record of delivery attempts. Callers treat every error from here as
/// non-fatal.
#[async_trait]
pub trait AuditLog: Send + Sync {
    async fn record_pending(&self, job: &NotificationJob) -> Result<Uuid>;

    async fn record_outcome(
        &self,
        id: Uuid,
        status: NotificationStatus,
        attempts: u32,
        last_error: Option<String>,
    ) -> Result<()>;
}

pub struct PgAuditLog {
    pool: DbPool,
}

impl PgAuditLog {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AuditLog for PgAuditLog {
    async fn record_pending(&self, job: &NotificationJob) -> Result<Uuid> {
        let mut conn = self.pool.get().await?;
        let record = NewNotificationRecord {
            id: Uuid::new_v4(),
            template: job.template.clone(),
            medium: job.medium.as_str().to_string(),
            recipients: job.recipients.clone(),
            status: NotificationStatus::Pending,
            attempts: 0,
        };

        diesel::insert_into(notifications::table)
            .values(&record)
            .execute(&mut conn)
            .await?;

        Ok(record.id)
    }

    async fn record_outcome(
        &self,
        id: Uuid,
        status: NotificationStatus,
        attempts: u32,
        last_error: Option<String>,
    ) -> Result<()> {
        let status = NotificationStatus::Pending.transition(status)?;
        let mut conn = self.pool.get().await?;

        let updated = diesel::update(
            notifications::table
                .filter(notifications::id.eq(id))
                .filter(notifications::status.eq(NotificationStatus::Pending)),
        )
        .set((
            notifications::status.eq(status),
            notifications::attempts.eq(i32::try_from(attempts).unwrap_or(i32::MAX)),
            notifications::last_error.eq(last_error),
            notifications::updated_at.eq(Utc::now()),
        ))
        .execute(&mut conn)
        .await?;

        if updated == 0 {
            anyhow::bail!("notification record {} is not pending", id);
        }
        Ok(())
    }
}
