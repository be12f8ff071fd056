use std::fs;

use anyhow::{Context, Result, bail};
use rusqlite::Connection;
use serde_json::{Map, Value};
use tracing::info;

use crate::cli::ImportArgs;
use crate::db;
use crate::model::ImportCounts;
use crate::store;

pub fn run(args: ImportArgs) -> Result<()> {
    let raw = fs::read(&args.json_path)
        .with_context(|| format!("failed to read {}", args.json_path.display()))?;
    let data: Value = serde_json::from_slice(&raw)
        .with_context(|| format!("failed to parse {}", args.json_path.display()))?;
    let Value::Object(entries) = data else {
        bail!(
            "expected top-level JSON object keyed by UID: {}",
            args.json_path.display()
        );
    };

    let mut connection = db::open_database(&args.db_path)?;
    let counts = import_entries(&mut connection, &entries)?;

    info!(
        entries = counts.entries,
        created = counts.created,
        updated = counts.updated,
        "import complete"
    );

    Ok(())
}

/// Upsert every payload entry. A persistence failure aborts the whole import;
/// unlike a flaky scraped page, a record the store rejects points at a
/// data-integrity problem worth stopping for.
pub fn import_entries(
    connection: &mut Connection,
    entries: &Map<String, Value>,
) -> Result<ImportCounts> {
    let mut counts = ImportCounts::default();

    for (uid, payload) in entries {
        let record = store::normalize_entry(uid, payload);
        let created = store::upsert_question(connection, &record)
            .with_context(|| format!("failed to persist imported entry {uid}"))?;

        counts.entries += 1;
        if created {
            counts.created += 1;
        } else {
            counts.updated += 1;
        }
    }

    Ok(counts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_payload() -> Map<String, Value> {
        let data = json!({
            "0001-aaaa": {
                "program": "SAT",
                "module": "math",
                "difficulty": "E",
                "primary_class_cd": "H",
                "primary_class_cd_desc": "Algebra",
                "skill_cd": "H.C.",
                "skill_desc": "Linear equations in two variables",
                "content": {
                    "stem": "If 2x + 3 = 11, what is x?",
                    "rationale": "Subtract 3, divide by 2.",
                    "correct_answer": ["4"],
                    "answerOptions": ["2", "4", "6", "8"]
                }
            },
            "0002-bbbb": {
                "program": "SAT",
                "module": "reading",
                "content": {
                    "prompt": "Which choice best completes the text?",
                    "answerOptions": [
                        {"content": "however"},
                        {"content": "therefore"}
                    ]
                }
            }
        });
        match data {
            Value::Object(entries) => entries,
            _ => unreachable!(),
        }
    }

    #[test]
    fn second_run_reports_only_updates() {
        let mut conn = db::open_in_memory().unwrap();
        let entries = sample_payload();

        let first = import_entries(&mut conn, &entries).unwrap();
        assert_eq!(first.entries, 2);
        assert_eq!(first.created, 2);
        assert_eq!(first.updated, 0);

        let second = import_entries(&mut conn, &entries).unwrap();
        assert_eq!(second.entries, 2);
        assert_eq!(second.created, 0);
        assert_eq!(second.updated, 2);

        let questions = db::count_rows(&conn, "SELECT COUNT(*) FROM questions").unwrap();
        assert_eq!(questions, 2);
    }

    #[test]
    fn import_populates_lookups_once() {
        let mut conn = db::open_in_memory().unwrap();
        let entries = sample_payload();
        import_entries(&mut conn, &entries).unwrap();
        import_entries(&mut conn, &entries).unwrap();

        assert_eq!(
            db::count_rows(&conn, "SELECT COUNT(*) FROM programs").unwrap(),
            1
        );
        assert_eq!(
            db::count_rows(&conn, "SELECT COUNT(*) FROM tests").unwrap(),
            2
        );
        assert_eq!(
            db::count_rows(&conn, "SELECT COUNT(*) FROM categories").unwrap(),
            1
        );
        assert_eq!(
            db::count_rows(&conn, "SELECT COUNT(*) FROM skills").unwrap(),
            1
        );
    }

    #[test]
    fn entry_without_stated_answer_treats_all_options_as_candidates() {
        let mut conn = db::open_in_memory().unwrap();
        let entries = sample_payload();
        import_entries(&mut conn, &entries).unwrap();

        let correct: String = conn
            .query_row(
                "SELECT correct_answers FROM questions WHERE uid = '0002-bbbb'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        let keys: Vec<String> = serde_json::from_str(&correct).unwrap();
        assert_eq!(keys, vec!["however", "therefore"]);
    }
}
