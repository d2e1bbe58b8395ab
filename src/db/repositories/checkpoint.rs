use crate::entities::{last_updates, prelude::*};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sea_orm::sea_query::OnConflict;
use sea_orm::{DatabaseConnection, EntityTrait, Set};

pub struct CheckpointRepository {
    conn: DatabaseConnection,
}

impl CheckpointRepository {
    #[must_use]
    pub const fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }

    pub async fn load(&self, job_name: &str) -> Result<Option<DateTime<Utc>>> {
        let Some(row) = LastUpdates::find_by_id(job_name.to_string())
            .one(&self.conn)
            .await?
        else {
            return Ok(None);
        };

        let last_run = DateTime::parse_from_rfc3339(&row.last_run)
            .with_context(|| format!("Invalid checkpoint for {job_name}: {}", row.last_run))?
            .with_timezone(&Utc);

        Ok(Some(last_run))
    }

    pub async fn save(&self, job_name: &str, last_run: DateTime<Utc>) -> Result<()> {
        let model = last_updates::ActiveModel {
            job_name: Set(job_name.to_string()),
            last_run: Set(last_run.to_rfc3339()),
            updated_at: Set(Utc::now().to_rfc3339()),
        };

        LastUpdates::insert(model)
            .on_conflict(
                OnConflict::column(last_updates::Column::JobName)
                    .update_columns([
                        last_updates::Column::LastRun,
                        last_updates::Column::UpdatedAt,
                    ])
                    .to_owned(),
            )
            .exec_without_returning(&self.conn)
            .await?;

        Ok(())
    }
}
