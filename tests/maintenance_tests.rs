//! Integration tests for snapshot rotation and restore, and the offsite
//! backup job.

mod common;

use chrono::Duration;
use common::{Harness, movie, now};
use reelsync::clients::tmdb::{MovieCastMember, MovieCredits};
use reelsync::constants::tables;
use reelsync::db::snapshot_table_name;
use reelsync::services::backup::artifact_name;
use reelsync::services::{ArtifactStore, BackupJob, BackupVerifier, SnapshotError, SnapshotManager};
use sea_orm::ConnectionTrait;

fn live_tables() -> Vec<String> {
    tables::LIVE.iter().map(|t| (*t).to_string()).collect()
}

#[tokio::test]
async fn test_rotation_keeps_newest_sets() {
    let h = Harness::new().await;
    let manager = SnapshotManager::new(h.store.clone(), live_tables(), 2);

    let mut taken = Vec::new();
    for hours in 0..3 {
        let outcome = manager
            .snapshot(now() + Duration::hours(hours))
            .await
            .unwrap();
        taken.push(outcome.timestamp);
    }

    let sets = manager.list().await.unwrap();
    let kept: Vec<&str> = sets.iter().map(|s| s.timestamp.as_str()).collect();
    assert_eq!(kept, vec![taken[2].as_str(), taken[1].as_str()]);
    assert_eq!(sets[0].tables.len(), tables::LIVE.len());

    assert!(
        !h.store
            .table_exists(&snapshot_table_name(tables::MOVIES, &taken[0]))
            .await
            .unwrap()
    );
}

#[tokio::test]
async fn test_failed_copy_leaves_no_partial_set() {
    let h = Harness::new().await;
    let good = SnapshotManager::new(h.store.clone(), live_tables(), 2);
    good.snapshot(now()).await.unwrap();
    good.snapshot(now() + Duration::hours(1)).await.unwrap();
    let before = good.list().await.unwrap();

    let mut broken_tables = live_tables();
    broken_tables.push("no_such_table".to_string());
    let broken = SnapshotManager::new(h.store.clone(), broken_tables, 2);

    let at = now() + Duration::hours(2);
    let err = broken.snapshot(at).await.unwrap_err();
    assert!(matches!(err, SnapshotError::Copy(_)), "{err}");

    let ts = SnapshotManager::timestamp_for(at);
    assert!(
        !h.store
            .table_exists(&snapshot_table_name(tables::MOVIES, &ts))
            .await
            .unwrap()
    );
    assert_eq!(good.list().await.unwrap(), before);
}

#[tokio::test]
async fn test_same_second_snapshot_is_rejected() {
    let h = Harness::new().await;
    let manager = SnapshotManager::new(h.store.clone(), live_tables(), 2);

    manager.snapshot(now()).await.unwrap();
    let err = manager.snapshot(now()).await.unwrap_err();
    assert!(matches!(err, SnapshotError::Invalid(_)), "{err}");
    assert_eq!(manager.list().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_parent_without_credit_tables_is_never_snapshotted_or_restored() {
    let h = Harness::new().await;
    let mut details = movie(1, "Kept");
    details.credits = Some(MovieCredits {
        cast: vec![MovieCastMember {
            id: 9,
            character: Some("Lead".into()),
            ..Default::default()
        }],
        crew: Vec::new(),
    });
    h.store.upsert_movies(&[details.into()], true).await.unwrap();

    let partial = SnapshotManager::new(h.store.clone(), vec![tables::MOVIES.to_string()], 2);
    let err = partial.snapshot(now()).await.unwrap_err();
    assert!(matches!(err, SnapshotError::Invalid(_)), "{err}");
    assert!(partial.list().await.unwrap().is_empty());

    // A set left behind by an older configuration.
    h.store
        .conn
        .execute_unprepared(&format!(
            "CREATE TABLE {} AS SELECT * FROM movies",
            snapshot_table_name(tables::MOVIES, "20261018_030000")
        ))
        .await
        .unwrap();

    let manager = SnapshotManager::new(h.store.clone(), live_tables(), 2);
    let err = manager.restore("20261018_030000").await.unwrap_err();
    assert!(matches!(err, SnapshotError::Invalid(_)), "{err}");

    assert_eq!(h.count(tables::MOVIES).await, 1);
    assert_eq!(h.count(tables::MOVIE_CAST).await, 1);
}

#[tokio::test]
async fn test_restore_replaces_live_rows() {
    let h = Harness::new().await;
    h.store
        .upsert_movies(&[movie(1, "Kept").into(), movie(2, "Original").into()], true)
        .await
        .unwrap();

    let manager = SnapshotManager::new(h.store.clone(), live_tables(), 2);
    let outcome = manager.snapshot(now()).await.unwrap();

    h.store
        .upsert_movies(&[movie(2, "Broken").into(), movie(3, "Added").into()], true)
        .await
        .unwrap();
    assert_eq!(h.count(tables::MOVIES).await, 3);

    let set = manager.restore(&outcome.timestamp).await.unwrap();
    assert_eq!(set.timestamp, outcome.timestamp);

    assert_eq!(h.count(tables::MOVIES).await, 2);
    let restored = h.store.get_movie(2).await.unwrap().unwrap();
    assert_eq!(restored.title.as_deref(), Some("Original"));
    assert!(h.store.get_movie(3).await.unwrap().is_none());

    let err = manager.restore("20000101_000000").await.unwrap_err();
    assert!(matches!(err, SnapshotError::NotFound(_)), "{err}");
}

#[tokio::test]
async fn test_backup_job_uploads_and_applies_retention() {
    let h = Harness::new().await;
    h.clear_backups();
    for days in [1, 2, 3, 100] {
        h.place_backup(now() - Duration::days(days));
    }
    h.store
        .upsert_movies(&[movie(1, "Backed Up").into()], true)
        .await
        .unwrap();

    let mut config = h.config.backup.clone();
    config.keep_versions = 2;
    config.retention_days = 90;
    let job = BackupJob::new(h.store.clone(), h.artifacts.clone(), config);

    let report = job.run(now()).await.unwrap();
    let prefix = &h.config.backup.artifact_prefix;
    assert_eq!(report.artifact, artifact_name(prefix, now()));
    assert!(report.size > 0);

    let mut deleted = report.deleted.clone();
    deleted.sort();
    let mut expected = vec![
        artifact_name(prefix, now() - Duration::days(3)),
        artifact_name(prefix, now() - Duration::days(100)),
    ];
    expected.sort();
    assert_eq!(deleted, expected);

    let mut remaining: Vec<String> = h
        .artifacts
        .list()
        .await
        .unwrap()
        .into_iter()
        .map(|a| a.name)
        .collect();
    remaining.sort();
    assert_eq!(
        remaining,
        vec![
            artifact_name(prefix, now() - Duration::days(2)),
            artifact_name(prefix, now() - Duration::days(1)),
            artifact_name(prefix, now()),
        ]
    );

    let verifier = BackupVerifier::new(h.artifacts.clone(), prefix.clone());
    let verdict = verifier.verify(Duration::hours(1), now()).await.unwrap();
    assert!(verdict.passed, "{}", verdict.reason);
    assert_eq!(verdict.artifact, Some(report.artifact));
}

#[tokio::test]
async fn test_uploaded_artifact_is_a_readable_copy() {
    let h = Harness::new().await;
    h.clear_backups();
    h.store
        .upsert_movies(&[movie(42, "In The Copy").into()], true)
        .await
        .unwrap();

    let job = BackupJob::new(h.store.clone(), h.artifacts.clone(), h.config.backup.clone());
    let report = job.run(now()).await.unwrap();

    let copy = h.backup_dir().join(&report.artifact);
    let restored = reelsync::db::Store::new(&format!("sqlite:{}", copy.display()))
        .await
        .unwrap();
    let row = restored.get_movie(42).await.unwrap().unwrap();
    assert_eq!(row.title.as_deref(), Some("In The Copy"));
}
