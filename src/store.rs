//! The persistence boundary.
//!
//! The pipeline only ever talks to a [`Store`]: idempotent user upsert,
//! activity insert returning the generated id, ordered batched trackpoint
//! insert, and activity delete for rollback. Keeping the seam a trait lets
//! tests substitute a store that fails mid-write to exercise the rollback
//! path without touching SQLite internals.

use anyhow::Result;
use async_trait::async_trait;
use chrono::NaiveDateTime;
use sqlx::SqlitePool;

use crate::models::{format_ts, RawPoint};

#[async_trait]
pub trait Store: Send + Sync {
    /// Insert the user if absent; never duplicates a row. The label flag is
    /// monotone: once true it stays true across upserts.
    async fn upsert_user(&self, id: &str, has_label: bool) -> Result<()>;

    /// Bulk `has_label = true` update from an explicit manifest. Returns the
    /// number of rows changed.
    async fn mark_labeled(&self, ids: &[String]) -> Result<u64>;

    /// Insert one activity and return its generated id.
    async fn insert_activity(
        &self,
        user_id: &str,
        mode: Option<&str>,
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) -> Result<i64>;

    /// Insert an activity's trackpoints in input order. Order must survive
    /// any internal batching; the persisted row ids are the order key.
    async fn insert_trackpoints(&self, activity_id: i64, points: &[RawPoint]) -> Result<()>;

    /// Remove an activity (and, via cascade, any of its trackpoints). Used
    /// only to roll back a partially committed activity.
    async fn delete_activity(&self, activity_id: i64) -> Result<()>;
}

/// SQLite-backed store.
pub struct SqliteStore {
    pool: SqlitePool,
    batch_size: usize,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool, batch_size: usize) -> Self {
        assert!(batch_size > 0, "batch_size must be > 0");
        Self { pool, batch_size }
    }
}

#[async_trait]
impl Store for SqliteStore {
    async fn upsert_user(&self, id: &str, has_label: bool) -> Result<()> {
        // Single conditional write, not check-then-insert, so concurrent
        // upserts of the same id cannot race into a duplicate-key error.
        sqlx::query(
            r#"
            INSERT INTO users (id, has_label) VALUES (?, ?)
            ON CONFLICT(id) DO UPDATE SET has_label = MAX(users.has_label, excluded.has_label)
            "#,
        )
        .bind(id)
        .bind(has_label as i64)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn mark_labeled(&self, ids: &[String]) -> Result<u64> {
        let mut tx = self.pool.begin().await?;
        let mut changed = 0u64;
        for id in ids {
            let result = sqlx::query("UPDATE users SET has_label = 1 WHERE id = ?")
                .bind(id)
                .execute(&mut *tx)
                .await?;
            changed += result.rows_affected();
        }
        tx.commit().await?;
        Ok(changed)
    }

    async fn insert_activity(
        &self,
        user_id: &str,
        mode: Option<&str>,
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) -> Result<i64> {
        let result = sqlx::query(
            r#"
            INSERT INTO activities (user_id, transportation_mode, start_time, end_time)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(user_id)
        .bind(mode)
        .bind(format_ts(start))
        .bind(format_ts(end))
        .execute(&self.pool)
        .await?;

        Ok(result.last_insert_rowid())
    }

    async fn insert_trackpoints(&self, activity_id: i64, points: &[RawPoint]) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        // One multi-row statement per batch. Batches are written in order
        // inside a single transaction, so the generated ids preserve
        // trajectory order across batch boundaries.
        for batch in points.chunks(self.batch_size) {
            let mut builder: sqlx::QueryBuilder<sqlx::Sqlite> = sqlx::QueryBuilder::new(
                "INSERT INTO trackpoints (activity_id, latitude, longitude, altitude, timestamp) ",
            );
            builder.push_values(batch, |mut row, point| {
                row.push_bind(activity_id)
                    .push_bind(point.latitude)
                    .push_bind(point.longitude)
                    .push_bind(point.altitude)
                    .push_bind(format_ts(point.time));
            });
            builder.build().execute(&mut *tx).await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn delete_activity(&self, activity_id: i64) -> Result<()> {
        sqlx::query("DELETE FROM activities WHERE id = ?")
            .bind(activity_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
