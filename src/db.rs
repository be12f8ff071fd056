use std::path::Path;

use anyhow::{Context, Result};
use rusqlite::Connection;

pub fn open_database(path: &Path) -> Result<Connection> {
    let connection = Connection::open(path)
        .with_context(|| format!("failed to open {}", path.display()))?;
    configure_connection(&connection)?;
    ensure_schema(&connection)?;
    Ok(connection)
}

fn configure_connection(connection: &Connection) -> Result<()> {
    connection
        .pragma_update(None, "journal_mode", "WAL")
        .context("failed to set journal_mode=WAL")?;
    connection
        .pragma_update(None, "synchronous", "NORMAL")
        .context("failed to set synchronous=NORMAL")?;
    connection
        .pragma_update(None, "foreign_keys", "ON")
        .context("failed to set foreign_keys=ON")?;
    Ok(())
}

pub fn ensure_schema(connection: &Connection) -> Result<()> {
    connection
        .execute_batch(
            "
            CREATE TABLE IF NOT EXISTS programs (
              id INTEGER PRIMARY KEY,
              name TEXT NOT NULL UNIQUE
            );

            CREATE TABLE IF NOT EXISTS tests (
              id INTEGER PRIMARY KEY,
              name TEXT NOT NULL UNIQUE
            );

            CREATE TABLE IF NOT EXISTS categories (
              id INTEGER PRIMARY KEY,
              code TEXT NOT NULL UNIQUE,
              name TEXT NOT NULL DEFAULT ''
            );

            CREATE TABLE IF NOT EXISTS skills (
              id INTEGER PRIMARY KEY,
              code TEXT NOT NULL,
              name TEXT NOT NULL DEFAULT '',
              category_id INTEGER NOT NULL,
              UNIQUE(code, category_id),
              FOREIGN KEY(category_id) REFERENCES categories(id)
            );

            CREATE TABLE IF NOT EXISTS questions (
              uid TEXT PRIMARY KEY,
              question_id TEXT,
              program TEXT NOT NULL,
              module TEXT NOT NULL,
              difficulty TEXT,
              sequence_number INTEGER,
              stem TEXT NOT NULL DEFAULT '',
              rationale TEXT NOT NULL DEFAULT '',
              external_id TEXT,
              score_band_range_cd INTEGER,
              correct_answers TEXT NOT NULL DEFAULT '[]',
              answer_options TEXT NOT NULL DEFAULT '[]',
              extra TEXT NOT NULL DEFAULT '{}',
              source_url TEXT,
              program_id INTEGER,
              test_id INTEGER,
              category_id INTEGER,
              skill_id INTEGER,
              created_at TEXT NOT NULL,
              updated_at TEXT NOT NULL,
              FOREIGN KEY(program_id) REFERENCES programs(id),
              FOREIGN KEY(test_id) REFERENCES tests(id),
              FOREIGN KEY(category_id) REFERENCES categories(id),
              FOREIGN KEY(skill_id) REFERENCES skills(id)
            );

            CREATE TABLE IF NOT EXISTS choices (
              question_uid TEXT NOT NULL,
              ord INTEGER NOT NULL,
              label TEXT NOT NULL,
              text TEXT NOT NULL DEFAULT '',
              is_correct INTEGER NOT NULL DEFAULT 0,
              PRIMARY KEY (question_uid, ord),
              FOREIGN KEY(question_uid) REFERENCES questions(uid) ON DELETE CASCADE
            );

            CREATE INDEX IF NOT EXISTS idx_questions_module ON questions(module);
            CREATE INDEX IF NOT EXISTS idx_questions_category ON questions(category_id);
            CREATE INDEX IF NOT EXISTS idx_questions_skill ON questions(skill_id);
            CREATE INDEX IF NOT EXISTS idx_skills_category ON skills(category_id);
            ",
        )
        .context("failed to initialize question bank schema")?;

    Ok(())
}

pub fn count_rows(connection: &Connection, sql: &str) -> Result<i64> {
    let count = connection.query_row(sql, [], |row| row.get(0))?;
    Ok(count)
}

#[cfg(test)]
pub fn open_in_memory() -> Result<Connection> {
    let connection = Connection::open_in_memory()?;
    connection.execute_batch("PRAGMA foreign_keys=ON;")?;
    ensure_schema(&connection)?;
    Ok(connection)
}
