use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);")?;

    let version: i64 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |r| r.get(0),
    )?;

    if version < 1 {
        info!("Running migration v1 (initial schema)");
        conn.execute_batch(
            "
            CREATE TABLE rooms (
                id              TEXT PRIMARY KEY,
                name            TEXT NOT NULL,
                room_type       TEXT NOT NULL DEFAULT 'unclassified',
                description     TEXT NOT NULL DEFAULT '',
                tags            TEXT NOT NULL DEFAULT '[]',
                image_urls      TEXT NOT NULL DEFAULT '[]',
                ss              INTEGER NOT NULL DEFAULT 0,
                pss             INTEGER NOT NULL DEFAULT 0,
                created_by      INTEGER NOT NULL,
                edited_by       INTEGER,
                created_at      TEXT NOT NULL,
                updated_at      TEXT NOT NULL,
                revision        INTEGER NOT NULL DEFAULT 1,
                sync_pending    INTEGER NOT NULL DEFAULT 0
            );

            CREATE UNIQUE INDEX idx_rooms_name ON rooms(LOWER(name));

            CREATE TABLE edit_history (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                room_id     TEXT NOT NULL REFERENCES rooms(id) ON DELETE CASCADE,
                editor      INTEGER NOT NULL,
                at          TEXT NOT NULL,
                revision    INTEGER NOT NULL,
                changes     TEXT NOT NULL DEFAULT '[]'
            );

            CREATE INDEX idx_history_room ON edit_history(room_id, revision);

            CREATE TABLE bug_reports (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                room_name   TEXT NOT NULL,
                reporter    INTEGER NOT NULL,
                description TEXT NOT NULL,
                status      TEXT NOT NULL DEFAULT 'open',
                created_at  TEXT NOT NULL,
                closed_by   INTEGER
            );

            CREATE TABLE deployments (
                id              INTEGER PRIMARY KEY,
                display_url     TEXT NOT NULL,
                registered_at   TEXT NOT NULL
            );

            CREATE TABLE replica_entries (
                deployment_id       INTEGER NOT NULL REFERENCES deployments(id) ON DELETE CASCADE,
                room_id             TEXT NOT NULL REFERENCES rooms(id) ON DELETE CASCADE,
                message_id          INTEGER,
                applied_revision    INTEGER NOT NULL DEFAULT 0,
                PRIMARY KEY (deployment_id, room_id)
            );

            CREATE TABLE sessions (
                id                  TEXT PRIMARY KEY,
                password_hash       TEXT NOT NULL,
                scanner_version     TEXT NOT NULL,
                created_at          TEXT NOT NULL,
                last_activity_at    TEXT NOT NULL,
                encounter_count     INTEGER NOT NULL DEFAULT 0,
                state               TEXT NOT NULL DEFAULT 'active'
            );

            CREATE INDEX idx_sessions_state ON sessions(state);

            CREATE TABLE encounters (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                session_id  TEXT NOT NULL REFERENCES sessions(id),
                room_name   TEXT NOT NULL,
                at          TEXT NOT NULL
            );

            CREATE INDEX idx_encounters_session ON encounters(session_id);

            INSERT INTO schema_version (version) VALUES (1);
            ",
        )?;
    }

    info!("Database migrations complete");
    Ok(())
}
