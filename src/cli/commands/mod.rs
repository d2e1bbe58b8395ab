mod backup;
mod snapshots;
mod status;
mod update;

pub use backup::{cmd_backup, cmd_verify_backup};
pub use snapshots::{cmd_snapshots_create, cmd_snapshots_list, cmd_snapshots_restore};
pub use status::cmd_status;
pub use update::cmd_update;

use crate::config::Config;
use crate::db::Store;
use crate::services::{ArtifactStore, DirectoryArtifactStore};
use std::sync::Arc;

pub async fn open_store(config: &Config) -> anyhow::Result<Store> {
    Store::with_pool_options(
        &config.general.database_path,
        config.general.max_db_connections,
        config.general.min_db_connections,
    )
    .await
}

#[must_use]
pub fn artifact_store(config: &Config) -> Arc<dyn ArtifactStore> {
    Arc::new(DirectoryArtifactStore::new(&config.backup.artifact_dir))
}
