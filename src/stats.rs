//! Database statistics and health overview.
//!
//! Provides a quick summary of what's loaded: user, activity, and trackpoint
//! counts plus a per-user breakdown. Used by `geolife stats` to give
//! confidence that an ingest run produced what was expected.

use anyhow::Result;
use sqlx::Row;

use crate::config::Config;
use crate::db;

/// Per-user breakdown of loaded rows.
struct UserStats {
    user_id: String,
    has_label: bool,
    activity_count: i64,
    trackpoint_count: i64,
    last_activity: Option<String>,
}

/// Run the stats command: query the database and print a summary.
pub async fn run_stats(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;

    let total_users: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users")
        .fetch_one(&pool)
        .await?;
    let total_activities: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM activities")
        .fetch_one(&pool)
        .await?;
    let total_trackpoints: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM trackpoints")
        .fetch_one(&pool)
        .await?;
    let labeled_users: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE has_label = 1")
        .fetch_one(&pool)
        .await?;

    let db_size = std::fs::metadata(&config.db.path)
        .map(|m| m.len())
        .unwrap_or(0);

    println!("Geolife — Database Stats");
    println!("========================");
    println!();
    println!("  Database:    {}", config.db.path.display());
    println!("  Size:        {}", format_bytes(db_size));
    println!();
    println!("  Users:       {} ({} labeled)", total_users, labeled_users);
    println!("  Activities:  {}", total_activities);
    println!("  Trackpoints: {}", total_trackpoints);

    let rows = sqlx::query(
        r#"
        SELECT
            u.id,
            u.has_label,
            COUNT(DISTINCT a.id) AS activity_count,
            COUNT(t.id) AS trackpoint_count,
            MAX(a.end_time) AS last_activity
        FROM users u
        LEFT JOIN activities a ON a.user_id = u.id
        LEFT JOIN trackpoints t ON t.activity_id = a.id
        GROUP BY u.id
        ORDER BY activity_count DESC, u.id
        "#,
    )
    .fetch_all(&pool)
    .await?;

    let user_stats: Vec<UserStats> = rows
        .iter()
        .map(|row| UserStats {
            user_id: row.get("id"),
            has_label: row.get::<i64, _>("has_label") != 0,
            activity_count: row.get("activity_count"),
            trackpoint_count: row.get("trackpoint_count"),
            last_activity: row.get("last_activity"),
        })
        .collect();

    if !user_stats.is_empty() {
        println!();
        println!("  By user:");
        println!(
            "  {:<8} {:<8} {:>10} {:>12}   {}",
            "USER", "LABELED", "ACTIVITIES", "TRACKPOINTS", "LAST ACTIVITY"
        );
        println!("  {}", "-".repeat(68));

        for s in &user_stats {
            println!(
                "  {:<8} {:<8} {:>10} {:>12}   {}",
                s.user_id,
                if s.has_label { "yes" } else { "no" },
                s.activity_count,
                s.trackpoint_count,
                s.last_activity.as_deref().unwrap_or("never")
            );
        }
    }

    println!();

    pool.close().await;
    Ok(())
}

/// Format a byte count as a human-readable string.
fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_bytes_units() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(2048), "2.0 KB");
        assert_eq!(format_bytes(5 * 1024 * 1024), "5.0 MB");
    }
}
