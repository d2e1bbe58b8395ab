pub mod backup;
pub use backup::{
    ArtifactInfo, ArtifactStore, BackupError, BackupJob, BackupReport, BackupVerifier,
    DirectoryArtifactStore, GateVerdict,
};

pub mod changes;
pub use changes::{ChangeSet, ChangeSetResolver};

pub mod coordinator;
pub use coordinator::{KindReport, RunCoordinator, RunFailure, RunOptions, RunReport, SyncError};

pub mod fetcher;
pub use fetcher::{FetchOutcome, FetchResults, RecordFetcher};

pub mod preview;

pub mod retry;
pub use retry::RetryPolicy;

pub mod scheduler;
pub use scheduler::Scheduler;

pub mod snapshot;
pub use snapshot::{SnapshotError, SnapshotManager, SnapshotOutcome};
