use diesel::prelude::*;
use shared::NotificationStatus;
use uuid::Uuid;

/// Audit trail row opened when a delivery tier picks up a job.
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = crate::schema::notifications)]
pub struct NewNotificationRecord {
    pub id: Uuid,
    pub template: String,
    pub medium: String,
    pub recipients: Vec<String>,
    pub status: NotificationStatus,
    pub attempts: i32,
}
