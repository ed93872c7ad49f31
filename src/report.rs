//! Analytical reports over the loaded data.
//!
//! Parameterized read-only queries: counts, top-k rankings, per-mode
//! breakdowns, haversine distance, altitude gain, sampling gaps, and
//! geographic containment. All of them run against whatever the ingest
//! pipeline committed; none of them mutate anything.

use anyhow::Result;
use sqlx::{Row, SqlitePool};

use crate::config::Config;
use crate::db;
use crate::models::ALTITUDE_SENTINEL;

/// Mean Earth radius in kilometers, used for haversine distance.
const EARTH_RADIUS_KM: f64 = 6371.0;

/// Great-circle distance between two coordinates, in kilometers.
pub fn haversine_km(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let d_lat = (lat2 - lat1).to_radians();
    let d_lon = (lon2 - lon1).to_radians();
    let a = (d_lat / 2.0).sin().powi(2)
        + lat1.to_radians().cos() * lat2.to_radians().cos() * (d_lon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());
    EARTH_RADIUS_KM * c
}

async fn counts(pool: &SqlitePool) -> Result<(i64, i64, i64)> {
    let users: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users")
        .fetch_one(pool)
        .await?;
    let activities: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM activities")
        .fetch_one(pool)
        .await?;
    let trackpoints: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM trackpoints")
        .fetch_one(pool)
        .await?;
    Ok((users, activities, trackpoints))
}

/// Row counts for all three tables.
pub async fn run_summary(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    let (users, activities, trackpoints) = counts(&pool).await?;

    println!(
        "users: {}  activities: {}  trackpoints: {}",
        users, activities, trackpoints
    );

    pool.close().await;
    Ok(())
}

/// Average number of activities per user.
pub async fn run_avg_activities(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    let (users, activities, _) = counts(&pool).await?;

    if users == 0 {
        println!("no users loaded");
    } else {
        println!(
            "average activities per user: {:.2}",
            activities as f64 / users as f64
        );
    }

    pool.close().await;
    Ok(())
}

/// Users ranked by activity count.
pub async fn run_top_users(config: &Config, limit: i64) -> Result<()> {
    let pool = db::connect(config).await?;

    let rows = sqlx::query(
        r#"
        SELECT user_id, COUNT(*) AS activity_count
        FROM activities
        GROUP BY user_id
        ORDER BY activity_count DESC, user_id
        LIMIT ?
        "#,
    )
    .bind(limit)
    .fetch_all(&pool)
    .await?;

    println!("{:<8} {:>10}", "USER", "ACTIVITIES");
    for row in &rows {
        let user: String = row.get("user_id");
        let count: i64 = row.get("activity_count");
        println!("{:<8} {:>10}", user, count);
    }

    pool.close().await;
    Ok(())
}

/// Distinct users that have at least one activity with the given mode.
pub async fn run_mode_users(config: &Config, mode: &str) -> Result<()> {
    let pool = db::connect(config).await?;

    let users: Vec<String> = sqlx::query_scalar(
        r#"
        SELECT DISTINCT user_id
        FROM activities
        WHERE transportation_mode = ?
        ORDER BY user_id
        "#,
    )
    .bind(mode)
    .fetch_all(&pool)
    .await?;

    println!("users with mode '{}': {}", mode, users.len());
    for user in &users {
        println!("  {}", user);
    }

    pool.close().await;
    Ok(())
}

/// Activity count per (non-null) transportation mode.
pub async fn run_modes(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;

    let rows = sqlx::query(
        r#"
        SELECT transportation_mode, COUNT(*) AS activity_count
        FROM activities
        WHERE transportation_mode IS NOT NULL
        GROUP BY transportation_mode
        ORDER BY activity_count DESC, transportation_mode
        "#,
    )
    .fetch_all(&pool)
    .await?;

    println!("{:<12} {:>10}", "MODE", "ACTIVITIES");
    for row in &rows {
        let mode: String = row.get("transportation_mode");
        let count: i64 = row.get("activity_count");
        println!("{:<12} {:>10}", mode, count);
    }

    pool.close().await;
    Ok(())
}

/// Year with the most activities and year with the most recorded hours.
pub async fn run_busiest_year(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;

    let by_count = sqlx::query(
        r#"
        SELECT CAST(strftime('%Y', start_time) AS INTEGER) AS year,
               COUNT(*) AS activity_count
        FROM activities
        GROUP BY year
        ORDER BY activity_count DESC
        LIMIT 1
        "#,
    )
    .fetch_optional(&pool)
    .await?;

    match by_count {
        Some(row) => {
            let year: i64 = row.get("year");
            let count: i64 = row.get("activity_count");
            println!("most activities: {} ({} activities)", year, count);
        }
        None => println!("no activities loaded"),
    }

    let by_hours = sqlx::query(
        r#"
        SELECT CAST(strftime('%Y', start_time) AS INTEGER) AS year,
               SUM((julianday(end_time) - julianday(start_time)) * 24.0) AS total_hours
        FROM activities
        GROUP BY year
        ORDER BY total_hours DESC
        LIMIT 1
        "#,
    )
    .fetch_optional(&pool)
    .await?;

    if let Some(row) = by_hours {
        let year: i64 = row.get("year");
        let hours: f64 = row.get("total_hours");
        println!("most recorded hours: {} ({:.1} hours)", year, hours);
    }

    pool.close().await;
    Ok(())
}

/// Total haversine distance covered by one user, filtered by year and mode.
/// Points are fetched in persisted order and summed pairwise in Rust.
pub async fn run_distance(config: &Config, user: &str, year: i32, mode: &str) -> Result<()> {
    let pool = db::connect(config).await?;

    let rows = sqlx::query(
        r#"
        SELECT t.latitude, t.longitude
        FROM trackpoints t
        JOIN activities a ON a.id = t.activity_id
        WHERE a.user_id = ?
          AND a.transportation_mode = ?
          AND CAST(strftime('%Y', a.start_time) AS INTEGER) = ?
        ORDER BY t.id
        "#,
    )
    .bind(user)
    .bind(mode)
    .bind(year)
    .fetch_all(&pool)
    .await?;

    let mut total = 0.0;
    for pair in rows.windows(2) {
        let lat1: f64 = pair[0].get("latitude");
        let lon1: f64 = pair[0].get("longitude");
        let lat2: f64 = pair[1].get("latitude");
        let lon2: f64 = pair[1].get("longitude");
        total += haversine_km(lat1, lon1, lat2, lon2);
    }

    println!(
        "user {} distance ({}, {}): {:.2} km over {} points",
        user,
        mode,
        year,
        total,
        rows.len()
    );

    pool.close().await;
    Ok(())
}

/// Users ranked by total altitude gained, summing only positive deltas and
/// ignoring sentinel altitudes.
pub async fn run_altitude_gain(config: &Config, limit: i64) -> Result<()> {
    let pool = db::connect(config).await?;

    let rows = sqlx::query(
        r#"
        SELECT user_id, SUM(gain) AS total_gain
        FROM (
            SELECT a.user_id AS user_id,
                   MAX(0, t.altitude - LAG(t.altitude)
                       OVER (PARTITION BY t.activity_id ORDER BY t.id)) AS gain
            FROM trackpoints t
            JOIN activities a ON a.id = t.activity_id
            WHERE t.altitude > ?
        )
        GROUP BY user_id
        ORDER BY total_gain DESC
        LIMIT ?
        "#,
    )
    .bind(ALTITUDE_SENTINEL)
    .bind(limit)
    .fetch_all(&pool)
    .await?;

    println!("{:<8} {:>12}", "USER", "TOTAL GAIN");
    for row in &rows {
        let user: String = row.get("user_id");
        let gain: i64 = row.try_get("total_gain").unwrap_or(0);
        println!("{:<8} {:>12}", user, gain);
    }

    pool.close().await;
    Ok(())
}

/// Users with activities containing a gap of more than five minutes between
/// consecutive trackpoints.
pub async fn run_gaps(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;

    let rows = sqlx::query(
        r#"
        SELECT user_id, COUNT(DISTINCT activity_id) AS gapped
        FROM (
            SELECT a.user_id AS user_id,
                   t.activity_id AS activity_id,
                   (julianday(t.timestamp) - julianday(LAG(t.timestamp)
                       OVER (PARTITION BY t.activity_id ORDER BY t.id))) * 1440.0 AS gap_minutes
            FROM trackpoints t
            JOIN activities a ON a.id = t.activity_id
        )
        WHERE gap_minutes > 5.0
        GROUP BY user_id
        ORDER BY user_id
        "#,
    )
    .fetch_all(&pool)
    .await?;

    println!("{:<8} {:>18}", "USER", "GAPPED ACTIVITIES");
    for row in &rows {
        let user: String = row.get("user_id");
        let gapped: i64 = row.get("gapped");
        println!("{:<8} {:>18}", user, gapped);
    }

    pool.close().await;
    Ok(())
}

/// Distinct users with at least one trackpoint inside the axis-aligned box
/// around the given coordinate.
pub async fn run_nearby(config: &Config, lat: f64, lon: f64, tolerance: f64) -> Result<()> {
    let pool = db::connect(config).await?;

    let users: Vec<String> = sqlx::query_scalar(
        r#"
        SELECT DISTINCT a.user_id
        FROM trackpoints t
        JOIN activities a ON a.id = t.activity_id
        WHERE ABS(t.latitude - ?) < ? AND ABS(t.longitude - ?) < ?
        ORDER BY a.user_id
        "#,
    )
    .bind(lat)
    .bind(tolerance)
    .bind(lon)
    .bind(tolerance)
    .fetch_all(&pool)
    .await?;

    println!(
        "users within {} deg of ({}, {}): {}",
        tolerance,
        lat,
        lon,
        users.len()
    );
    for user in &users {
        println!("  {}", user);
    }

    pool.close().await;
    Ok(())
}

/// Each user's most common transportation mode. Counts come from SQL; the
/// first (highest) row per user wins.
pub async fn run_favorite_modes(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;

    let rows = sqlx::query(
        r#"
        SELECT user_id, transportation_mode, COUNT(*) AS mode_count
        FROM activities
        WHERE transportation_mode IS NOT NULL
        GROUP BY user_id, transportation_mode
        ORDER BY user_id, mode_count DESC, transportation_mode
        "#,
    )
    .fetch_all(&pool)
    .await?;

    println!("{:<8} {:<12}", "USER", "MODE");
    let mut last_user: Option<String> = None;
    for row in &rows {
        let user: String = row.get("user_id");
        if last_user.as_deref() == Some(user.as_str()) {
            continue;
        }
        let mode: String = row.get("transportation_mode");
        println!("{:<8} {:<12}", user, mode);
        last_user = Some(user);
    }

    pool.close().await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn haversine_known_distance() {
        // Beijing Forbidden City to Tiananmen Square is well under 2 km.
        let d = haversine_km(39.916, 116.397, 39.9055, 116.3976);
        assert!(d > 0.5 && d < 2.0, "got {}", d);
    }

    #[test]
    fn haversine_zero_for_identical_points() {
        assert_eq!(haversine_km(39.916, 116.397, 39.916, 116.397), 0.0);
    }
}
