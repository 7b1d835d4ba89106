use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};

use crate::date_util::{format_ts, parse_ts};
use crate::manifest::{ItemKind, Manifest};
use crate::range::{DateRange, IdRange};

// ── Manifests ──────────────────────────────────────────────────────

const MANIFEST_COLUMNS: &str = "id, kind, start_at, end_at, lower_id, upper_id, refreshed_at";

fn conversion_error(idx: usize, e: crate::error::Error) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e))
}

fn ts_column(row: &Row<'_>, idx: usize) -> Result<DateTime<Utc>, rusqlite::Error> {
    let raw: String = row.get(idx)?;
    parse_ts(&raw).map_err(|e| conversion_error(idx, e))
}

fn row_to_manifest(row: &Row<'_>) -> Result<Manifest, rusqlite::Error> {
    let kind: String = row.get(1)?;
    let kind = kind.parse::<ItemKind>().map_err(|e| conversion_error(1, e))?;
    let refreshed_at: Option<String> = row.get(6)?;
    let refreshed_at = refreshed_at
        .map(|s| parse_ts(&s))
        .transpose()
        .map_err(|e| conversion_error(6, e))?;

    Ok(Manifest {
        id: Some(row.get(0)?),
        kind,
        dates: DateRange {
            start: ts_column(row, 2)?,
            end: ts_column(row, 3)?,
        },
        ids: IdRange {
            lower: row.get(4)?,
            upper: row.get(5)?,
        },
        refreshed_at,
    })
}

pub fn get_manifest(conn: &Connection, id: i64) -> Result<Option<Manifest>, rusqlite::Error> {
    conn.query_row(
        &format!("SELECT {MANIFEST_COLUMNS} FROM manifests WHERE id = ?1"),
        params![id],
        row_to_manifest,
    )
    .optional()
}

/// Manifests ordered by kind then start, optionally narrowed to one kind
/// and to those sharing at least one instant with `window`.
pub fn list_manifests(
    conn: &Connection,
    kind: Option<ItemKind>,
    window: Option<&DateRange>,
) -> Result<Vec<Manifest>, rusqlite::Error> {
    let mut clauses = Vec::new();
    let mut args: Vec<String> = Vec::new();

    if let Some(kind) = kind {
        args.push(kind.as_str().to_string());
        clauses.push(format!("kind = ?{}", args.len()));
    }
    if let Some(window) = window {
        args.push(format_ts(window.end));
        clauses.push(format!("start_at <= ?{}", args.len()));
        args.push(format_ts(window.start));
        clauses.push(format!("end_at >= ?{}", args.len()));
    }

    let where_sql = if clauses.is_empty() {
        String::new()
    } else {
        format!("WHERE {}", clauses.join(" AND "))
    };
    let mut stmt = conn.prepare(&format!(
        "SELECT {MANIFEST_COLUMNS} FROM manifests {where_sql} ORDER BY kind, start_at, id"
    ))?;
    let rows = stmt.query_map(params_from_iter(args.iter()), row_to_manifest)?;
    rows.collect()
}

/// Upsert manifests. Unsaved manifests are inserted and come back with their
/// new identity; saved ones are updated in place.
pub fn save_manifests(
    conn: &Connection,
    manifests: &[Manifest],
) -> Result<Vec<Manifest>, rusqlite::Error> {
    let mut saved = Vec::with_capacity(manifests.len());
    for manifest in manifests {
        let start_at = format_ts(manifest.start());
        let end_at = format_ts(manifest.end());
        let refreshed_at = manifest.refreshed_at.map(format_ts);

        let id = match manifest.id {
            Some(id) => {
                let updated = conn.execute(
                    "UPDATE manifests SET
                        kind = ?2, start_at = ?3, end_at = ?4,
                        lower_id = ?5, upper_id = ?6, refreshed_at = ?7,
                        updated_at = datetime('now')
                     WHERE id = ?1",
                    params![
                        id,
                        manifest.kind.as_str(),
                        start_at,
                        end_at,
                        manifest.ids.lower,
                        manifest.ids.upper,
                        refreshed_at,
                    ],
                )?;
                if updated == 0 {
                    return Err(rusqlite::Error::QueryReturnedNoRows);
                }
                id
            }
            None => {
                conn.execute(
                    "INSERT INTO manifests (
                        kind, start_at, end_at, lower_id, upper_id, refreshed_at, updated_at
                    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, datetime('now'))",
                    params![
                        manifest.kind.as_str(),
                        start_at,
                        end_at,
                        manifest.ids.lower,
                        manifest.ids.upper,
                        refreshed_at,
                    ],
                )?;
                conn.last_insert_rowid()
            }
        };
        saved.push(Manifest {
            id: Some(id),
            ..manifest.clone()
        });
    }
    Ok(saved)
}

/// Delete the given manifests by identity. Unsaved manifests are ignored.
pub fn delete_manifests(conn: &Connection, manifests: &[Manifest]) -> Result<usize, rusqlite::Error> {
    let mut deleted = 0;
    for id in manifests.iter().filter_map(|m| m.id) {
        deleted += conn.execute("DELETE FROM manifests WHERE id = ?1", params![id])?;
    }
    Ok(deleted)
}

pub fn mark_refreshed(
    conn: &Connection,
    id: i64,
    at: DateTime<Utc>,
) -> Result<bool, rusqlite::Error> {
    let count = conn.execute(
        "UPDATE manifests SET refreshed_at = ?2, updated_at = datetime('now') WHERE id = ?1",
        params![id, format_ts(at)],
    )?;
    Ok(count > 0)
}

/// Manifests of `kind` never refreshed, or last refreshed before `before`.
pub fn list_stale(
    conn: &Connection,
    kind: ItemKind,
    before: DateTime<Utc>,
) -> Result<Vec<Manifest>, rusqlite::Error> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {MANIFEST_COLUMNS} FROM manifests
         WHERE kind = ?1 AND (refreshed_at IS NULL OR refreshed_at < ?2)
         ORDER BY refreshed_at IS NOT NULL, refreshed_at, start_at"
    ))?;
    let rows = stmt.query_map(params![kind.as_str(), format_ts(before)], row_to_manifest)?;
    rows.collect()
}

// ── Config ─────────────────────────────────────────────────────────

pub fn get_config(conn: &Connection, key: &str) -> Result<Option<String>, rusqlite::Error> {
    conn.query_row(
        "SELECT value FROM app_config WHERE key = ?1",
        params![key],
        |row| row.get(0),
    )
    .optional()
}

pub fn set_config(conn: &Connection, key: &str, value: &str) -> Result<(), rusqlite::Error> {
    conn.execute(
        "INSERT OR REPLACE INTO app_config (key, value, updated_at)
         VALUES (?1, ?2, datetime('now'))",
        params![key, value],
    )?;
    Ok(())
}

pub fn list_config(conn: &Connection) -> Result<Vec<(String, String)>, rusqlite::Error> {
    let mut stmt = conn.prepare("SELECT key, value FROM app_config ORDER BY key")?;
    let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;
    rows.collect()
}

// ── Sync Jobs ──────────────────────────────────────────────────────

pub fn insert_sync_job(
    conn: &Connection,
    kind: ItemKind,
    window: Option<&DateRange>,
) -> Result<i64, rusqlite::Error> {
    conn.execute(
        "INSERT INTO sync_jobs (kind, status, started_at, window_start, window_end)
         VALUES (?1, 'running', datetime('now'), ?2, ?3)",
        params![
            kind.as_str(),
            window.map(|w| format_ts(w.start)),
            window.map(|w| format_ts(w.end)),
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn update_sync_job(
    conn: &Connection,
    job_id: i64,
    status: &str,
    pages_fetched: u64,
    items_fetched: u64,
    orders_filled: u64,
    error_message: Option<&str>,
) -> Result<(), rusqlite::Error> {
    conn.execute(
        "UPDATE sync_jobs SET
            status = ?2, completed_at = datetime('now'),
            pages_fetched = ?3, items_fetched = ?4, orders_filled = ?5,
            error_message = ?6
         WHERE id = ?1",
        params![
            job_id,
            status,
            pages_fetched as i64,
            items_fetched as i64,
            orders_filled as i64,
            error_message,
        ],
    )?;
    Ok(())
}

/// Most recent completed run per kind.
pub fn last_completed_jobs(conn: &Connection) -> Result<Vec<(String, String)>, rusqlite::Error> {
    let mut stmt = conn.prepare(
        "SELECT kind, MAX(completed_at) FROM sync_jobs
         WHERE status = 'completed' GROUP BY kind ORDER BY kind",
    )?;
    let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;
    rows.collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::Database;
    use chrono::TimeZone;

    fn d(y: i32, m: u32, day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, day, 0, 0, 0).unwrap()
    }

    fn manifest(kind: ItemKind, start: DateTime<Utc>, end: DateTime<Utc>) -> Manifest {
        Manifest::new(
            kind,
            DateRange::new(start, end).unwrap(),
            IdRange::new(Some(10), Some(20)).unwrap(),
        )
    }

    #[tokio::test]
    async fn test_config_round_trip() {
        let db = Database::open_memory().await.unwrap();

        db.writer()
            .call(|conn| {
                set_config(conn, "max_gap_days", "14")?;
                let val = get_config(conn, "max_gap_days")?;
                assert_eq!(val, Some("14".to_string()));

                let missing = get_config(conn, "nonexistent")?;
                assert_eq!(missing, None);

                assert_eq!(list_config(conn)?.len(), 1);
                Ok::<(), rusqlite::Error>(())
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_manifest_insert_update_delete() {
        let db = Database::open_memory().await.unwrap();

        db.writer()
            .call(|conn| {
                let saved = save_manifests(conn, &[manifest(ItemKind::Flag, d(2023, 1, 3), d(2023, 1, 5))])?;
                assert_eq!(saved.len(), 1);
                let id = saved[0].id.unwrap();

                let loaded = get_manifest(conn, id)?.unwrap();
                assert_eq!(loaded, saved[0]);

                let mut grown = loaded.clone();
                grown.dates.start = d(2023, 1, 1);
                grown.ids.lower = Some(2);
                let resaved = save_manifests(conn, &[grown.clone()])?;
                assert_eq!(resaved[0].id, Some(id));
                assert_eq!(get_manifest(conn, id)?.unwrap(), grown);

                assert_eq!(delete_manifests(conn, &[grown])?, 1);
                assert_eq!(get_manifest(conn, id)?, None);
                Ok::<(), rusqlite::Error>(())
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_update_of_vanished_manifest_fails() {
        let db = Database::open_memory().await.unwrap();

        let result = db
            .writer()
            .call(|conn| {
                let ghost = manifest(ItemKind::Flag, d(2023, 1, 3), d(2023, 1, 5)).with_id(42);
                save_manifests(conn, &[ghost])
            })
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_list_filters_by_kind_and_window() {
        let db = Database::open_memory().await.unwrap();

        db.writer()
            .call(|conn| {
                save_manifests(
                    conn,
                    &[
                        manifest(ItemKind::Flag, d(2023, 1, 3), d(2023, 1, 5)),
                        manifest(ItemKind::Flag, d(2023, 2, 3), d(2023, 2, 5)),
                        manifest(ItemKind::Permit, d(2023, 1, 3), d(2023, 1, 5)),
                    ],
                )?;

                assert_eq!(list_manifests(conn, None, None)?.len(), 3);
                assert_eq!(list_manifests(conn, Some(ItemKind::Flag), None)?.len(), 2);

                let january = DateRange::new(d(2023, 1, 5), d(2023, 1, 31)).unwrap();
                let hits = list_manifests(conn, Some(ItemKind::Flag), Some(&january))?;
                assert_eq!(hits.len(), 1);
                assert_eq!(hits[0].start(), d(2023, 1, 3));
                Ok::<(), rusqlite::Error>(())
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_refresh_tracking() {
        let db = Database::open_memory().await.unwrap();

        db.writer()
            .call(|conn| {
                let saved = save_manifests(
                    conn,
                    &[
                        manifest(ItemKind::Ticket, d(2023, 1, 3), d(2023, 1, 5)),
                        manifest(ItemKind::Ticket, d(2023, 2, 3), d(2023, 2, 5)),
                    ],
                )?;
                let (first, second) = (saved[0].id.unwrap(), saved[1].id.unwrap());

                assert!(mark_refreshed(conn, first, d(2023, 6, 1))?);
                assert!(!mark_refreshed(conn, 999, d(2023, 6, 1))?);

                let stale = list_stale(conn, ItemKind::Ticket, d(2023, 5, 1))?;
                assert_eq!(stale.iter().map(|m| m.id).collect::<Vec<_>>(), vec![Some(second)]);

                let stale = list_stale(conn, ItemKind::Ticket, d(2023, 7, 1))?;
                assert_eq!(stale.len(), 2);
                assert_eq!(stale[0].id, Some(second));
                assert_eq!(stale[1].refreshed_at, Some(d(2023, 6, 1)));
                Ok::<(), rusqlite::Error>(())
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_sync_job_round_trip() {
        let db = Database::open_memory().await.unwrap();

        db.writer()
            .call(|conn| {
                let window = DateRange::new(d(2025, 1, 1), d(2025, 1, 31)).unwrap();
                let job_id = insert_sync_job(conn, ItemKind::Approval, Some(&window))?;
                assert!(job_id > 0);

                update_sync_job(conn, job_id, "completed", 3, 42, 1, None)?;

                let status: String = conn.query_row(
                    "SELECT status FROM sync_jobs WHERE id = ?1",
                    params![job_id],
                    |row| row.get(0),
                )?;
                assert_eq!(status, "completed");

                let last = last_completed_jobs(conn)?;
                assert_eq!(last.len(), 1);
                assert_eq!(last[0].0, "approval");
                Ok::<(), rusqlite::Error>(())
            })
            .await
            .unwrap();
    }
}
