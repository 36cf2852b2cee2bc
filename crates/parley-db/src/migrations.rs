use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS documents (
            collection  TEXT NOT NULL,
            position    INTEGER NOT NULL,
            body        TEXT NOT NULL,
            PRIMARY KEY (collection, position)
        );
        ",
    )?;

    info!("Document store migrations complete");
    Ok(())
}
