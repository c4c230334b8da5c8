use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub const SCHEMA_VERSION: i64 = 1;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);")?;

    let version = current_version(conn)?;

    if version < 1 {
        info!("Mission DB: running migration v1 (initial schema)");
        // All-or-nothing: a half-applied v1 would block every later open.
        let tx = conn.unchecked_transaction()?;
        tx.execute_batch(
            "
            CREATE TABLE user (
                user_id     INTEGER PRIMARY KEY AUTOINCREMENT,
                name        TEXT NOT NULL UNIQUE,
                created_at  TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE TABLE mission (
                mission_id          INTEGER PRIMARY KEY AUTOINCREMENT,
                name                TEXT NOT NULL,
                status              TEXT NOT NULL DEFAULT 'not_started'
                                    CHECK (status IN ('not_started', 'in_progress', 'finished')),
                mission_leader_id   INTEGER NOT NULL REFERENCES user(user_id),
                created_at          TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE INDEX idx_mission_leader
                ON mission(mission_leader_id);

            CREATE TABLE mission_member (
                mission_id  INTEGER NOT NULL REFERENCES mission(mission_id) ON DELETE CASCADE,
                member_id   INTEGER NOT NULL REFERENCES user(user_id),
                joined_at   TEXT NOT NULL DEFAULT (datetime('now')),
                UNIQUE(mission_id, member_id)
            );

            INSERT INTO schema_version (version) VALUES (1);
            ",
        )?;
        tx.commit()?;
    }

    info!("Database migrations complete");
    Ok(())
}

pub fn current_version(conn: &Connection) -> Result<i64> {
    let version =
        conn.query_row("SELECT COALESCE(MAX(version), 0) FROM schema_version", [], |r| r.get(0))?;
    Ok(version)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn running_twice_is_a_no_op() {
        let conn = Connection::open_in_memory().unwrap();
        run(&conn).unwrap();
        run(&conn).unwrap();

        assert_eq!(current_version(&conn).unwrap(), SCHEMA_VERSION);
        let rows: i64 = conn
            .query_row("SELECT COUNT(*) FROM schema_version", [], |r| r.get(0))
            .unwrap();
        assert_eq!(rows, 1);
    }

    #[test]
    fn failed_v1_leaves_no_partial_schema() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("CREATE TABLE mission_member (stray INTEGER);").unwrap();

        assert!(run(&conn).is_err());

        let user_tables: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master
                 WHERE type = 'table' AND name IN ('user', 'mission')",
                [],
                |r| r.get(0),
            )
            .unwrap();
        assert_eq!(user_tables, 0);
        assert_eq!(current_version(&conn).unwrap(), 0);

        conn.execute_batch("DROP TABLE mission_member;").unwrap();
        run(&conn).unwrap();
        assert_eq!(current_version(&conn).unwrap(), SCHEMA_VERSION);
    }

    #[test]
    fn status_column_rejects_unknown_states() {
        let conn = Connection::open_in_memory().unwrap();
        run(&conn).unwrap();
        conn.execute("INSERT INTO user (name) VALUES ('alice')", []).unwrap();

        let bad = conn.execute(
            "INSERT INTO mission (name, status, mission_leader_id) VALUES ('X', 'paused', 1)",
            [],
        );
        assert!(bad.is_err());
    }
}
