//! Persistent SQLite store for moderation state: blacklist and warnings.

use rusqlite::{Connection, OptionalExtension, params};
use std::path::Path;
use std::sync::Mutex;
use tracing::info;

/// A blacklisted user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlacklistEntry {
    pub user_id: i64,
    /// Epoch seconds.
    pub created_at: i64,
}

/// A warning issued to a user on a server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Warn {
    /// Unique and increasing within one (user_id, server_id) scope only.
    pub warn_id: i64,
    pub user_id: i64,
    pub server_id: i64,
    pub moderator_id: i64,
    pub reason: String,
    /// Epoch seconds.
    pub created_at: i64,
}

/// Moderation store errors.
#[derive(Debug)]
pub enum StoreError {
    /// The user is already on the blacklist.
    AlreadyBlacklisted { user_id: i64 },
    /// Underlying storage failure.
    Sqlite(rusqlite::Error),
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AlreadyBlacklisted { user_id } => {
                write!(f, "user {user_id} is already blacklisted")
            }
            Self::Sqlite(e) => write!(f, "database error: {e}"),
        }
    }
}

impl std::error::Error for StoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::AlreadyBlacklisted { .. } => None,
            Self::Sqlite(e) => Some(e),
        }
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        Self::Sqlite(e)
    }
}

/// Blacklist and warning ledger.
///
/// All access goes through one connection behind a mutex, so overlapping
/// tasks on the same store are serialized.
pub struct ModerationDb {
    conn: Mutex<Connection>,
}

impl ModerationDb {
    /// Create an in-memory store.
    pub fn in_memory() -> Result<Self, StoreError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    /// Open (or create) the store at the given path.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let db = Self::from_connection(Connection::open(path)?)?;
        info!("Opened moderation database at {:?}", path);
        Ok(db)
    }

    fn from_connection(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS blacklist (
                user_id INTEGER NOT NULL UNIQUE,
                created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
            );

            CREATE TABLE IF NOT EXISTS warns (
                id INTEGER NOT NULL,
                user_id INTEGER NOT NULL,
                server_id INTEGER NOT NULL,
                moderator_id INTEGER NOT NULL,
                reason TEXT NOT NULL,
                created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
            );

            CREATE INDEX IF NOT EXISTS idx_warns_scope ON warns(user_id, server_id);
        "#,
        )?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn.lock().expect("connection lock poisoned")
    }

    // ==================== BLACKLIST ====================

    /// Put a user on the blacklist.
    pub fn add_to_blacklist(&self, user_id: i64) -> Result<(), StoreError> {
        let conn = self.lock();
        match conn.execute("INSERT INTO blacklist(user_id) VALUES (?1)", params![user_id]) {
            Ok(_) => {
                info!("🚫 Blacklisted user {user_id}");
                Ok(())
            }
            Err(rusqlite::Error::SqliteFailure(e, _))
                if e.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                Err(StoreError::AlreadyBlacklisted { user_id })
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Take a user off the blacklist. No-op if absent.
    /// Returns how many users remain blacklisted.
    pub fn remove_from_blacklist(&self, user_id: i64) -> Result<usize, StoreError> {
        let conn = self.lock();
        let removed = conn.execute("DELETE FROM blacklist WHERE user_id = ?1", params![user_id])?;
        if removed > 0 {
            info!("Unblacklisted user {user_id}");
        }
        let remaining: i64 = conn.query_row("SELECT COUNT(*) FROM blacklist", [], |row| row.get(0))?;
        Ok(remaining as usize)
    }

    pub fn is_blacklisted(&self, user_id: i64) -> Result<bool, StoreError> {
        let conn = self.lock();
        let found = conn
            .query_row(
                "SELECT user_id FROM blacklist WHERE user_id = ?1",
                params![user_id],
                |_| Ok(()),
            )
            .optional()?;
        Ok(found.is_some())
    }

    /// All blacklisted users, ordered by user id.
    pub fn blacklisted_users(&self) -> Result<Vec<BlacklistEntry>, StoreError> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT user_id, CAST(strftime('%s', created_at) AS INTEGER)
             FROM blacklist ORDER BY user_id",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(BlacklistEntry {
                user_id: row.get(0)?,
                created_at: row.get(1)?,
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    // ==================== WARNINGS ====================

    /// Record a warning and return its id.
    ///
    /// Ids count up independently per (user_id, server_id) scope: the next id
    /// is one past the highest id currently in the scope, starting at 1. The
    /// scan and the insert run in one transaction under the connection lock,
    /// so two overlapping warns in the same scope cannot get the same id.
    pub fn add_warn(
        &self,
        user_id: i64,
        server_id: i64,
        moderator_id: i64,
        reason: &str,
    ) -> Result<i64, StoreError> {
        let mut conn = self.lock();
        let tx = conn.transaction()?;

        let last: Option<i64> = tx
            .query_row(
                "SELECT id FROM warns WHERE user_id = ?1 AND server_id = ?2
                 ORDER BY id DESC LIMIT 1",
                params![user_id, server_id],
                |row| row.get(0),
            )
            .optional()?;
        let warn_id = last.map_or(1, |id| id + 1);

        tx.execute(
            "INSERT INTO warns(id, user_id, server_id, moderator_id, reason)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![warn_id, user_id, server_id, moderator_id, reason],
        )?;
        tx.commit()?;

        info!("⚠️ Warn {warn_id} for user {user_id} on server {server_id}");
        Ok(warn_id)
    }

    /// Delete one warning. Surviving ids keep their numbers.
    /// Returns how many warnings remain in the (user_id, server_id) scope.
    pub fn remove_warn(
        &self,
        warn_id: i64,
        user_id: i64,
        server_id: i64,
    ) -> Result<usize, StoreError> {
        let conn = self.lock();
        conn.execute(
            "DELETE FROM warns WHERE id = ?1 AND user_id = ?2 AND server_id = ?3",
            params![warn_id, user_id, server_id],
        )?;
        let remaining: i64 = conn.query_row(
            "SELECT COUNT(*) FROM warns WHERE user_id = ?1 AND server_id = ?2",
            params![user_id, server_id],
            |row| row.get(0),
        )?;
        Ok(remaining as usize)
    }

    /// All warnings for a user on a server, ordered by id.
    pub fn warnings(&self, user_id: i64, server_id: i64) -> Result<Vec<Warn>, StoreError> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT user_id, server_id, moderator_id, reason,
                    CAST(strftime('%s', created_at) AS INTEGER), id
             FROM warns WHERE user_id = ?1 AND server_id = ?2 ORDER BY id",
        )?;
        let rows = stmt.query_map(params![user_id, server_id], |row| {
            Ok(Warn {
                user_id: row.get(0)?,
                server_id: row.get(1)?,
                moderator_id: row.get(2)?,
                reason: row.get(3)?,
                created_at: row.get(4)?,
                warn_id: row.get(5)?,
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn db() -> ModerationDb {
        ModerationDb::in_memory().unwrap()
    }

    #[test]
    fn test_blacklist_round_trip() {
        let db = db();
        db.add_to_blacklist(42).unwrap();
        assert!(db.is_blacklisted(42).unwrap());

        let remaining = db.remove_from_blacklist(42).unwrap();
        assert_eq!(remaining, 0);
        assert!(!db.is_blacklisted(42).unwrap());
    }

    #[test]
    fn test_blacklist_duplicate_rejected() {
        let db = db();
        db.add_to_blacklist(42).unwrap();
        let err = db.add_to_blacklist(42).unwrap_err();
        assert!(matches!(err, StoreError::AlreadyBlacklisted { user_id: 42 }));
        // Still exactly one entry.
        assert_eq!(db.blacklisted_users().unwrap().len(), 1);
    }

    #[test]
    fn test_blacklist_remove_absent_is_noop() {
        let db = db();
        db.add_to_blacklist(1).unwrap();
        let remaining = db.remove_from_blacklist(999).unwrap();
        assert_eq!(remaining, 1);
    }

    #[test]
    fn test_blacklist_listing_ordered() {
        let db = db();
        db.add_to_blacklist(30).unwrap();
        db.add_to_blacklist(10).unwrap();
        db.add_to_blacklist(20).unwrap();

        let entries = db.blacklisted_users().unwrap();
        let ids: Vec<i64> = entries.iter().map(|e| e.user_id).collect();
        assert_eq!(ids, vec![10, 20, 30]);
        for entry in &entries {
            assert!(entry.created_at > 0);
        }
    }

    #[test]
    fn test_warn_ids_count_up_within_scope() {
        let db = db();
        assert_eq!(db.add_warn(1, 1, 99, "one").unwrap(), 1);
        assert_eq!(db.add_warn(1, 1, 99, "two").unwrap(), 2);
        assert_eq!(db.add_warn(1, 1, 99, "three").unwrap(), 3);
    }

    #[test]
    fn test_warn_ids_independent_across_scopes() {
        let db = db();
        assert_eq!(db.add_warn(1, 1, 99, "a").unwrap(), 1);
        assert_eq!(db.add_warn(2, 1, 99, "b").unwrap(), 1);
        assert_eq!(db.add_warn(1, 2, 99, "c").unwrap(), 1);
    }

    #[test]
    fn test_remove_warn_keeps_surviving_ids() {
        let db = db();
        db.add_warn(1, 1, 99, "one").unwrap();
        db.add_warn(1, 1, 99, "two").unwrap();
        db.add_warn(1, 1, 99, "three").unwrap();

        let remaining = db.remove_warn(2, 1, 1).unwrap();
        assert_eq!(remaining, 2);

        let warns = db.warnings(1, 1).unwrap();
        let ids: Vec<i64> = warns.iter().map(|w| w.warn_id).collect();
        assert_eq!(ids, vec![1, 3]);
    }

    #[test]
    fn test_removing_highest_warn_frees_its_id() {
        let db = db();
        db.add_warn(1, 1, 99, "one").unwrap();
        db.add_warn(1, 1, 99, "two").unwrap();
        db.remove_warn(2, 1, 1).unwrap();

        // Next id is one past the current max, so 2 comes back.
        assert_eq!(db.add_warn(1, 1, 99, "again").unwrap(), 2);
    }

    #[test]
    fn test_remove_warn_requires_full_key() {
        let db = db();
        db.add_warn(1, 1, 99, "one").unwrap();
        // Wrong server: nothing deleted, scope count is for (1, 2).
        assert_eq!(db.remove_warn(1, 1, 2).unwrap(), 0);
        assert_eq!(db.warnings(1, 1).unwrap().len(), 1);
    }

    #[test]
    fn test_warnings_carry_full_record() {
        let db = db();
        db.add_warn(7, 8, 9, "spamming links").unwrap();

        let warns = db.warnings(7, 8).unwrap();
        assert_eq!(warns.len(), 1);
        let w = &warns[0];
        assert_eq!(w.warn_id, 1);
        assert_eq!(w.user_id, 7);
        assert_eq!(w.server_id, 8);
        assert_eq!(w.moderator_id, 9);
        assert_eq!(w.reason, "spamming links");
        assert!(w.created_at > 0);
    }

    #[test]
    fn test_concurrent_warns_same_scope_get_distinct_ids() {
        let db = Arc::new(db());
        let mut handles = Vec::new();
        for _ in 0..10 {
            let db = db.clone();
            handles.push(std::thread::spawn(move || {
                db.add_warn(1, 1, 99, "race").unwrap()
            }));
        }

        let mut ids: Vec<i64> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        ids.sort_unstable();
        assert_eq!(ids, (1..=10).collect::<Vec<i64>>());
    }

    #[test]
    fn test_open_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("database.db");

        {
            let db = ModerationDb::open(&path).unwrap();
            db.add_to_blacklist(5).unwrap();
            db.add_warn(5, 1, 2, "persisted").unwrap();
        }

        let db = ModerationDb::open(&path).unwrap();
        assert!(db.is_blacklisted(5).unwrap());
        assert_eq!(db.warnings(5, 1).unwrap().len(), 1);
    }
}
