use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};

use crate::groups::{CellGroup, ScopeSnapshot};

const DATABASE_NAME: &str = "javanb.sqlite3";

pub fn get_db_path() -> std::io::Result<PathBuf> {
    use directories::ProjectDirs;

    let proj_dirs = ProjectDirs::from("", "", "javanb").ok_or_else(|| {
        std::io::Error::new(std::io::ErrorKind::NotFound, "Unable to find user directory")
    })?;
    let data_dir = proj_dirs.data_local_dir();
    fs::create_dir_all(data_dir)?;

    Ok(data_dir.join(DATABASE_NAME))
}

pub async fn init_db(db_path: impl AsRef<Path>) -> sqlx::Result<SqlitePool> {
    let db_url = format!("sqlite://{}?mode=rwc", db_path.as_ref().display()); // rwc = read/write/create
    let db_pool = SqlitePoolOptions::new()
        .max_connections(1)
        .min_connections(0)
        .connect(&db_url)
        .await?;

    // PRAGMA statements cannot run inside a transaction
    for pragma_sql in &[
        "PRAGMA foreign_keys = ON;",
        "PRAGMA busy_timeout = 2000;",
        "PRAGMA journal_mode = WAL;",
        "PRAGMA synchronous = NORMAL;",
    ] {
        sqlx::query(pragma_sql).execute(&db_pool).await?;
    }

    let mut tx = db_pool.begin().await?;

    for sql in &[
        r"
        CREATE TABLE IF NOT EXISTS notebook_scopes (
            notebook      TEXT     PRIMARY KEY,
            revision      INTEGER  NOT NULL,
            updated_time  TEXT     NOT NULL
        );",
        r"
        CREATE TABLE IF NOT EXISTS group_members (
            notebook      TEXT     NOT NULL,
            group_id      TEXT     NOT NULL,
            position      INTEGER  NOT NULL,
            cell_id       TEXT     NOT NULL,
            PRIMARY KEY (notebook, cell_id),
            FOREIGN KEY (notebook)  REFERENCES notebook_scopes (notebook)
        );",
    ] {
        sqlx::query(sql).execute(tx.as_mut()).await?;
    }

    tx.commit().await?;

    log::info!("Initialized database at {}", db_path.as_ref().display());

    Ok(db_pool)
}

pub fn remove_db(db_path: impl AsRef<Path>) {
    // WAL and SHM files might not exist
    let wal_path = format!("{}-wal", db_path.as_ref().display());
    let shm_path = format!("{}-shm", db_path.as_ref().display());
    let _ = fs::remove_file(wal_path);
    let _ = fs::remove_file(shm_path);

    if let Err(e) = std::fs::remove_file(&db_path) {
        log::warn!(
            "Unable to remove database at {}: {e}",
            db_path.as_ref().display()
        );
    } else {
        log::info!("Removed database at {}", db_path.as_ref().display());
    }
}

/// Replaces the stored groups of `notebook` with `snapshot`.
///
/// Returns `false` without writing anything when the stored revision is
/// already at or past the snapshot's, so a slow writer never clobbers a newer
/// state.
pub async fn save_scope(
    notebook: &str,
    snapshot: &ScopeSnapshot,
    pool: &SqlitePool,
) -> sqlx::Result<bool> {
    let revision = snapshot.revision as i64;
    let mut tx = pool.begin().await?;

    let stored: Option<i64> =
        sqlx::query_scalar("SELECT revision FROM notebook_scopes WHERE notebook = ?")
            .bind(notebook)
            .fetch_optional(tx.as_mut())
            .await?;
    if stored.is_some_and(|stored| stored >= revision) {
        log::debug!("Skipping stale snapshot of {notebook} at revision {revision}");
        return Ok(false);
    }

    sqlx::query(
        r#"
        INSERT INTO notebook_scopes (notebook, revision, updated_time)
        VALUES (?, ?, ?)
        ON CONFLICT (notebook) DO UPDATE SET
            revision = excluded.revision,
            updated_time = excluded.updated_time
        "#,
    )
    .bind(notebook)
    .bind(revision)
    .bind(crate::create_timestamp())
    .execute(tx.as_mut())
    .await?;

    sqlx::query("DELETE FROM group_members WHERE notebook = ?")
        .bind(notebook)
        .execute(tx.as_mut())
        .await?;

    for group in snapshot.groups.values() {
        for (position, cell_id) in group.cell_ids.iter().enumerate() {
            sqlx::query(
                "INSERT INTO group_members (notebook, group_id, position, cell_id) VALUES (?, ?, ?, ?)",
            )
            .bind(notebook)
            .bind(&group.group_id)
            .bind(position as i64)
            .bind(cell_id)
            .execute(tx.as_mut())
            .await?;
        }
    }

    tx.commit().await?;
    log::debug!(
        "Saved {} group(s) of {notebook} at revision {revision}",
        snapshot.groups.len()
    );
    Ok(true)
}

#[derive(sqlx::FromRow)]
struct ScopeRow {
    notebook: String,
    revision: i64,
}

#[derive(sqlx::FromRow)]
struct MemberRow {
    notebook: String,
    group_id: String,
    cell_id: String,
}

/// Every stored scope, with groups rebuilt in member order
pub async fn load_scopes(pool: &SqlitePool) -> sqlx::Result<BTreeMap<String, ScopeSnapshot>> {
    let scopes: Vec<ScopeRow> = sqlx::query_as("SELECT notebook, revision FROM notebook_scopes")
        .fetch_all(pool)
        .await?;
    let members: Vec<MemberRow> = sqlx::query_as(
        "SELECT notebook, group_id, cell_id FROM group_members ORDER BY notebook, group_id, position",
    )
    .fetch_all(pool)
    .await?;

    let mut snapshots: BTreeMap<String, ScopeSnapshot> = scopes
        .into_iter()
        .map(|row| {
            let snapshot = ScopeSnapshot {
                revision: row.revision as u64,
                groups: BTreeMap::new(),
            };
            (row.notebook, snapshot)
        })
        .collect();

    for member in members {
        let Some(snapshot) = snapshots.get_mut(&member.notebook) else {
            log::warn!("Group member {} has no scope, ignored", member.cell_id);
            continue;
        };
        snapshot
            .groups
            .entry(member.group_id.clone())
            .or_insert_with(|| CellGroup {
                group_id: member.group_id,
                notebook_scope: member.notebook,
                cell_ids: Vec::new(),
            })
            .cell_ids
            .push(member.cell_id);
    }

    Ok(snapshots)
}
