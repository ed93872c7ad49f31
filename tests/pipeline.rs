//! Library-level pipeline tests against a real SQLite database, including
//! the rollback path via a store that fails mid-write.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{Duration, NaiveDateTime};
use sqlx::SqlitePool;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

use geolife_ingest::dataset::scan_dataset;
use geolife_ingest::db;
use geolife_ingest::ingest::{ingest_dataset, IngestReport};
use geolife_ingest::migrate;
use geolife_ingest::models::RawPoint;
use geolife_ingest::progress::NoProgress;
use geolife_ingest::store::{SqliteStore, Store};

const PLT_HEADER: &str = "Geolife trajectory\nWGS 84\nAltitude is in Feet\nReserved 3\n\
                          0,2,255,My Track,0,0,2,8421376\n0\n";

fn ts(s: &str) -> NaiveDateTime {
    NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").unwrap()
}

/// Write a `.plt` with `n` points at 5-second intervals from `start`.
/// Returns the end timestamp.
fn write_plt(dir: &Path, name: &str, start: NaiveDateTime, n: usize) -> NaiveDateTime {
    let mut content = String::from(PLT_HEADER);
    let mut end = start;
    for i in 0..n {
        let t = start + Duration::seconds(5 * i as i64);
        end = t;
        content.push_str(&format!(
            "39.9{0:04},116.3{0:04},0,492,39744.1,{1}\n",
            i % 10000,
            t.format("%Y-%m-%d,%H:%M:%S")
        ));
    }
    fs::write(dir.join(name), content).unwrap();
    end
}

fn write_labels(user_dir: &Path, records: &[(NaiveDateTime, NaiveDateTime, &str)]) {
    let mut content = String::from("Start Time\tEnd Time\tTransportation Mode\n");
    for (start, end, mode) in records {
        content.push_str(&format!(
            "{}\t{}\t{}\n",
            start.format("%Y/%m/%d %H:%M:%S"),
            end.format("%Y/%m/%d %H:%M:%S"),
            mode
        ));
    }
    fs::write(user_dir.join("labels.txt"), content).unwrap();
}

struct TestEnv {
    _tmp: TempDir,
    pub root: PathBuf,
    pub pool: SqlitePool,
}

async fn setup() -> TestEnv {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().join("Data");
    fs::create_dir_all(&root).unwrap();

    let pool = db::connect_path(&tmp.path().join("geolife.sqlite"))
        .await
        .unwrap();
    migrate::apply_schema(&pool).await.unwrap();

    TestEnv {
        _tmp: tmp,
        root,
        pool,
    }
}

fn user_dir(root: &Path, id: &str) -> PathBuf {
    let dir = root.join(id).join("Trajectory");
    fs::create_dir_all(&dir).unwrap();
    dir
}

async fn run(env: &TestEnv, batch_size: usize) -> IngestReport {
    let users = scan_dataset(&env.root).unwrap();
    let store = SqliteStore::new(env.pool.clone(), batch_size);
    ingest_dataset(&store, &users, &NoProgress, false, None)
        .await
        .unwrap()
}

async fn count(pool: &SqlitePool, table: &str) -> i64 {
    sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {}", table))
        .fetch_one(pool)
        .await
        .unwrap()
}

#[tokio::test]
async fn matched_trajectory_commits_activity_and_points() {
    let env = setup().await;
    let traj = user_dir(&env.root, "010");
    let start = ts("2008-10-23 02:53:04");
    let end = write_plt(&traj, "20081023025304.plt", start, 12);
    write_labels(&env.root.join("010"), &[(start, end, "walk")]);

    let report = run(&env, 1000).await;
    assert_eq!(report.activities_committed, 1);
    assert_eq!(report.trackpoints_written, 12);
    assert!(report.skipped.is_empty());

    assert_eq!(count(&env.pool, "users").await, 1);
    assert_eq!(count(&env.pool, "activities").await, 1);
    assert_eq!(count(&env.pool, "trackpoints").await, 12);

    let mode: String = sqlx::query_scalar("SELECT transportation_mode FROM activities")
        .fetch_one(&env.pool)
        .await
        .unwrap();
    assert_eq!(mode, "walk");

    let has_label: i64 = sqlx::query_scalar("SELECT has_label FROM users WHERE id = '010'")
        .fetch_one(&env.pool)
        .await
        .unwrap();
    assert_eq!(has_label, 1);
}

#[tokio::test]
async fn label_off_by_one_second_writes_nothing() {
    let env = setup().await;
    let traj = user_dir(&env.root, "010");
    let start = ts("2008-10-23 02:53:04");
    let end = write_plt(&traj, "a.plt", start, 10);
    // End label bound is one second late.
    write_labels(
        &env.root.join("010"),
        &[(start, end + Duration::seconds(1), "walk")],
    );

    let report = run(&env, 1000).await;
    assert_eq!(report.activities_committed, 0);
    assert_eq!(report.skipped.len(), 1);
    assert_eq!(report.skipped[0].1.kind(), "no label");

    assert_eq!(count(&env.pool, "activities").await, 0);
    assert_eq!(count(&env.pool, "trackpoints").await, 0);
}

#[tokio::test]
async fn oversized_trajectory_rejected_despite_matching_label() {
    let env = setup().await;
    let traj = user_dir(&env.root, "010");
    let start = ts("2008-10-23 02:53:04");
    let end = write_plt(&traj, "big.plt", start, 2501);
    write_labels(&env.root.join("010"), &[(start, end, "bus")]);

    let report = run(&env, 1000).await;
    assert_eq!(report.activities_committed, 0);
    assert_eq!(report.skipped.len(), 1);
    assert_eq!(report.skipped[0].1.kind(), "size cap");
    assert_eq!(count(&env.pool, "trackpoints").await, 0);
}

#[tokio::test]
async fn malformed_interior_point_is_dropped_not_the_file() {
    let env = setup().await;
    let traj = user_dir(&env.root, "010");
    let start = ts("2008-10-23 02:53:04");
    let end = write_plt(&traj, "a.plt", start, 10);

    // Corrupt one interior line's time field.
    let path = traj.join("a.plt");
    let content = fs::read_to_string(&path)
        .unwrap()
        .replace("02:53:24", "garbage");
    fs::write(&path, content).unwrap();

    write_labels(&env.root.join("010"), &[(start, end, "walk")]);

    let report = run(&env, 1000).await;
    assert_eq!(report.activities_committed, 1);
    assert_eq!(report.trackpoints_written, 9);
    assert_eq!(report.points_dropped, 1);
    assert_eq!(count(&env.pool, "trackpoints").await, 9);
}

#[tokio::test]
async fn unlabeled_user_gets_row_but_no_activities() {
    let env = setup().await;
    let traj = user_dir(&env.root, "011");
    write_plt(&traj, "a.plt", ts("2008-10-23 02:53:04"), 5);

    let report = run(&env, 1000).await;
    assert_eq!(report.users, 1);
    assert_eq!(report.activities_committed, 0);
    assert_eq!(report.skipped.len(), 1);

    assert_eq!(count(&env.pool, "users").await, 1);
    let has_label: i64 = sqlx::query_scalar("SELECT has_label FROM users WHERE id = '011'")
        .fetch_one(&env.pool)
        .await
        .unwrap();
    assert_eq!(has_label, 0);
}

#[tokio::test]
async fn broken_label_file_is_surfaced_and_user_runs_unlabeled() {
    let env = setup().await;
    let traj = user_dir(&env.root, "010");
    write_plt(&traj, "a.plt", ts("2008-10-23 02:53:04"), 5);
    fs::write(env.root.join("010/labels.txt"), "header\nnot a label\n").unwrap();

    let report = run(&env, 1000).await;
    assert_eq!(report.label_errors.len(), 1);
    assert_eq!(report.label_errors[0].0, "010");
    assert_eq!(report.activities_committed, 0);
    assert_eq!(report.skipped.len(), 1);
    assert_eq!(report.skipped[0].1.kind(), "no label");
}

#[tokio::test]
async fn user_upsert_is_idempotent_across_runs() {
    let env = setup().await;
    let traj = user_dir(&env.root, "010");
    let start = ts("2008-10-23 02:53:04");
    let end = write_plt(&traj, "a.plt", start, 3);
    write_labels(&env.root.join("010"), &[(start, end, "walk")]);

    run(&env, 1000).await;
    run(&env, 1000).await;

    assert_eq!(count(&env.pool, "users").await, 1);
}

#[tokio::test]
async fn trackpoint_order_survives_batch_splitting() {
    let env = setup().await;
    let traj = user_dir(&env.root, "010");
    let start = ts("2008-10-23 02:53:04");
    let end = write_plt(&traj, "a.plt", start, 25);
    write_labels(&env.root.join("010"), &[(start, end, "bike")]);

    // Batch size far below the point count forces several statements.
    let report = run(&env, 7).await;
    assert_eq!(report.trackpoints_written, 25);

    let stamps: Vec<String> = sqlx::query_scalar("SELECT timestamp FROM trackpoints ORDER BY id")
        .fetch_all(&env.pool)
        .await
        .unwrap();
    assert_eq!(stamps.len(), 25);
    let expected: Vec<String> = (0..25)
        .map(|i| {
            (start + Duration::seconds(5 * i))
                .format("%Y-%m-%d %H:%M:%S")
                .to_string()
        })
        .collect();
    assert_eq!(stamps, expected);
}

#[tokio::test]
async fn dry_run_writes_nothing() {
    let env = setup().await;
    let traj = user_dir(&env.root, "010");
    let start = ts("2008-10-23 02:53:04");
    let end = write_plt(&traj, "a.plt", start, 8);
    write_labels(&env.root.join("010"), &[(start, end, "walk")]);

    let users = scan_dataset(&env.root).unwrap();
    let store = SqliteStore::new(env.pool.clone(), 1000);
    let report = ingest_dataset(&store, &users, &NoProgress, true, None)
        .await
        .unwrap();

    assert_eq!(report.activities_committed, 1);
    assert_eq!(report.trackpoints_written, 8);
    assert_eq!(count(&env.pool, "users").await, 0);
    assert_eq!(count(&env.pool, "activities").await, 0);
    assert_eq!(count(&env.pool, "trackpoints").await, 0);
}

#[tokio::test]
async fn file_limit_caps_processing() {
    let env = setup().await;
    let traj = user_dir(&env.root, "010");
    let s1 = ts("2008-10-23 02:53:04");
    let e1 = write_plt(&traj, "a.plt", s1, 3);
    let s2 = ts("2008-10-24 02:53:04");
    let e2 = write_plt(&traj, "b.plt", s2, 3);
    write_labels(&env.root.join("010"), &[(s1, e1, "walk"), (s2, e2, "bus")]);

    let users = scan_dataset(&env.root).unwrap();
    let store = SqliteStore::new(env.pool.clone(), 1000);
    let report = ingest_dataset(&store, &users, &NoProgress, false, Some(1))
        .await
        .unwrap();

    assert_eq!(report.files_scanned, 1);
    assert_eq!(report.activities_committed, 1);
}

/// Store wrapper that fails trackpoint writes, and optionally the rollback
/// delete too, to exercise the orphan-handling paths.
struct FailingStore {
    inner: SqliteStore,
    fail_delete: bool,
}

#[async_trait]
impl Store for FailingStore {
    async fn upsert_user(&self, id: &str, has_label: bool) -> Result<()> {
        self.inner.upsert_user(id, has_label).await
    }

    async fn mark_labeled(&self, ids: &[String]) -> Result<u64> {
        self.inner.mark_labeled(ids).await
    }

    async fn insert_activity(
        &self,
        user_id: &str,
        mode: Option<&str>,
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) -> Result<i64> {
        self.inner.insert_activity(user_id, mode, start, end).await
    }

    async fn insert_trackpoints(&self, _activity_id: i64, _points: &[RawPoint]) -> Result<()> {
        Err(anyhow!("simulated trackpoint write failure"))
    }

    async fn delete_activity(&self, activity_id: i64) -> Result<()> {
        if self.fail_delete {
            Err(anyhow!("simulated rollback failure"))
        } else {
            self.inner.delete_activity(activity_id).await
        }
    }
}

#[tokio::test]
async fn failed_trackpoint_write_rolls_back_the_activity() {
    let env = setup().await;
    let traj = user_dir(&env.root, "010");
    let start = ts("2008-10-23 02:53:04");
    let end = write_plt(&traj, "a.plt", start, 5);
    write_labels(&env.root.join("010"), &[(start, end, "walk")]);

    let users = scan_dataset(&env.root).unwrap();
    let store = FailingStore {
        inner: SqliteStore::new(env.pool.clone(), 1000),
        fail_delete: false,
    };
    let report = ingest_dataset(&store, &users, &NoProgress, false, None)
        .await
        .unwrap();

    assert_eq!(report.activities_committed, 0);
    assert_eq!(report.skipped.len(), 1);
    assert_eq!(report.skipped[0].1.kind(), "persistence");

    // Either both the activity and its points exist, or neither does.
    assert_eq!(count(&env.pool, "activities").await, 0);
    assert_eq!(count(&env.pool, "trackpoints").await, 0);
}

#[tokio::test]
async fn failed_rollback_is_fatal_for_the_run() {
    let env = setup().await;
    let traj = user_dir(&env.root, "010");
    let start = ts("2008-10-23 02:53:04");
    let end = write_plt(&traj, "a.plt", start, 5);
    write_labels(&env.root.join("010"), &[(start, end, "walk")]);

    let users = scan_dataset(&env.root).unwrap();
    let store = FailingStore {
        inner: SqliteStore::new(env.pool.clone(), 1000),
        fail_delete: true,
    };
    let err = ingest_dataset(&store, &users, &NoProgress, false, None)
        .await
        .unwrap_err();
    assert!(
        err.to_string().contains("orphaned activity"),
        "got: {:#}",
        err
    );
}

/// Store wrapper that refuses to upsert one specific user, to exercise the
/// per-user skip path.
struct UserRejectingStore {
    inner: SqliteStore,
    reject_id: String,
}

#[async_trait]
impl Store for UserRejectingStore {
    async fn upsert_user(&self, id: &str, has_label: bool) -> Result<()> {
        if id == self.reject_id {
            Err(anyhow!("simulated upsert failure"))
        } else {
            self.inner.upsert_user(id, has_label).await
        }
    }

    async fn mark_labeled(&self, ids: &[String]) -> Result<u64> {
        self.inner.mark_labeled(ids).await
    }

    async fn insert_activity(
        &self,
        user_id: &str,
        mode: Option<&str>,
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) -> Result<i64> {
        self.inner.insert_activity(user_id, mode, start, end).await
    }

    async fn insert_trackpoints(&self, activity_id: i64, points: &[RawPoint]) -> Result<()> {
        self.inner.insert_trackpoints(activity_id, points).await
    }

    async fn delete_activity(&self, activity_id: i64) -> Result<()> {
        self.inner.delete_activity(activity_id).await
    }
}

#[tokio::test]
async fn failed_user_upsert_skips_that_user_and_continues() {
    let env = setup().await;

    let traj_a = user_dir(&env.root, "010");
    let s_a = ts("2008-10-23 02:53:04");
    let e_a = write_plt(&traj_a, "a.plt", s_a, 4);
    write_labels(&env.root.join("010"), &[(s_a, e_a, "walk")]);

    let traj_b = user_dir(&env.root, "011");
    let s_b = ts("2008-10-24 02:53:04");
    let e_b = write_plt(&traj_b, "b.plt", s_b, 6);
    write_labels(&env.root.join("011"), &[(s_b, e_b, "bus")]);

    let users = scan_dataset(&env.root).unwrap();
    let store = UserRejectingStore {
        inner: SqliteStore::new(env.pool.clone(), 1000),
        reject_id: "010".to_string(),
    };
    let report = ingest_dataset(&store, &users, &NoProgress, false, None)
        .await
        .unwrap();

    // User 010 is skipped wholesale; user 011 still commits.
    assert_eq!(report.users, 2);
    assert_eq!(report.activities_committed, 1);
    assert_eq!(report.trackpoints_written, 6);
    assert_eq!(report.skipped.len(), 1);
    assert!(report.skipped[0].0.ends_with("a.plt"));
    assert_eq!(report.skipped[0].1.kind(), "persistence");

    assert_eq!(count(&env.pool, "users").await, 1);
    assert_eq!(count(&env.pool, "activities").await, 1);
}

#[tokio::test]
async fn deleting_a_user_cascades_to_activities_and_points() {
    let env = setup().await;
    let traj = user_dir(&env.root, "010");
    let start = ts("2008-10-23 02:53:04");
    let end = write_plt(&traj, "a.plt", start, 6);
    write_labels(&env.root.join("010"), &[(start, end, "walk")]);
    run(&env, 1000).await;

    sqlx::query("DELETE FROM users WHERE id = '010'")
        .execute(&env.pool)
        .await
        .unwrap();

    assert_eq!(count(&env.pool, "activities").await, 0);
    assert_eq!(count(&env.pool, "trackpoints").await, 0);
}

#[tokio::test]
async fn mark_labeled_updates_only_known_users() {
    let env = setup().await;
    user_dir(&env.root, "010");
    user_dir(&env.root, "011");
    run(&env, 1000).await;

    let store = SqliteStore::new(env.pool.clone(), 1000);
    let changed = store
        .mark_labeled(&["010".to_string(), "999".to_string()])
        .await
        .unwrap();
    assert_eq!(changed, 1);

    let has_label: i64 = sqlx::query_scalar("SELECT has_label FROM users WHERE id = '010'")
        .fetch_one(&env.pool)
        .await
        .unwrap();
    assert_eq!(has_label, 1);
}
