use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);"
    )?;

    let version: i64 = conn
        .query_row("SELECT COALESCE(MAX(version), 0) FROM schema_version", [], |r| r.get(0))?;

    if version < 1 {
        info!("Running migration v1 (users, tickets, archive)");
        conn.execute_batch(
            "
            CREATE TABLE users (
                id            TEXT PRIMARY KEY,
                email         TEXT NOT NULL UNIQUE,
                display_name  TEXT NOT NULL,
                password      TEXT NOT NULL,
                role          TEXT NOT NULL DEFAULT 'user',
                created_at    TEXT NOT NULL,
                last_seen_at  TEXT
            );

            CREATE TABLE tickets (
                id                    TEXT PRIMARY KEY,
                seller_id             TEXT NOT NULL REFERENCES users(id),
                owner_id              TEXT NOT NULL REFERENCES users(id),
                buyer_id              TEXT REFERENCES users(id),
                title                 TEXT NOT NULL,
                description           TEXT,
                category              TEXT NOT NULL,
                venue                 TEXT NOT NULL,
                event_date            TEXT NOT NULL,
                event_time            TEXT,
                price_cents           INTEGER NOT NULL,
                price_per_unit_cents  INTEGER NOT NULL,
                quantity              INTEGER NOT NULL,
                status                TEXT NOT NULL DEFAULT 'available',
                file_url              TEXT,
                created_at            TEXT NOT NULL,
                updated_at            TEXT NOT NULL
            );

            CREATE INDEX idx_tickets_status ON tickets(status, event_date);
            CREATE INDEX idx_tickets_seller ON tickets(seller_id);

            -- Rows are never deleted. No foreign keys: rows outlive the
            -- users and tickets they were copied from.
            CREATE TABLE tickets_archive (
                id                    TEXT PRIMARY KEY,
                original_id           TEXT NOT NULL,
                seller_id             TEXT NOT NULL,
                owner_id              TEXT NOT NULL,
                buyer_id              TEXT,
                title                 TEXT NOT NULL,
                description           TEXT,
                category              TEXT NOT NULL,
                venue                 TEXT NOT NULL,
                event_date            TEXT NOT NULL,
                event_time            TEXT,
                price_cents           INTEGER NOT NULL,
                price_per_unit_cents  INTEGER NOT NULL,
                quantity              INTEGER NOT NULL,
                status                TEXT NOT NULL,
                file_url              TEXT,
                created_at            TEXT NOT NULL,
                updated_at            TEXT NOT NULL,
                archived_at           TEXT NOT NULL,
                confirmed_at          TEXT,
                abandoned_at          TEXT
            );

            -- At most one open copy per ticket
            CREATE UNIQUE INDEX idx_archive_original
                ON tickets_archive(original_id) WHERE abandoned_at IS NULL;

            INSERT INTO schema_version (version) VALUES (1);
            "
        )?;
    }

    if version < 2 {
        info!("Running migration v2 (newsletter)");
        conn.execute_batch(
            "
            CREATE TABLE newsletter_subscribers (
                email            TEXT PRIMARY KEY,
                locale           TEXT NOT NULL DEFAULT 'en',
                subscribed_at    TEXT NOT NULL,
                unsubscribed_at  TEXT
            );

            INSERT INTO schema_version (version) VALUES (2);
            "
        )?;
    }

    info!("Database migrations complete");
    Ok(())
}
