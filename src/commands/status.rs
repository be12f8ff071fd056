use anyhow::Result;
use tracing::{info, warn};

use crate::cli::StatusArgs;
use crate::db;

pub fn run(args: StatusArgs) -> Result<()> {
    if !args.db_path.exists() {
        warn!(path = %args.db_path.display(), "database file missing");
        return Ok(());
    }

    let connection = db::open_database(&args.db_path)?;

    let questions = db::count_rows(&connection, "SELECT COUNT(*) FROM questions").unwrap_or(0);
    let choices = db::count_rows(&connection, "SELECT COUNT(*) FROM choices").unwrap_or(0);
    let programs = db::count_rows(&connection, "SELECT COUNT(*) FROM programs").unwrap_or(0);
    let tests = db::count_rows(&connection, "SELECT COUNT(*) FROM tests").unwrap_or(0);
    let categories = db::count_rows(&connection, "SELECT COUNT(*) FROM categories").unwrap_or(0);
    let skills = db::count_rows(&connection, "SELECT COUNT(*) FROM skills").unwrap_or(0);

    // Records without options are the ones the downstream query layer hides
    // by default.
    let without_options = db::count_rows(
        &connection,
        "SELECT COUNT(*) FROM questions WHERE answer_options = '[]'",
    )
    .unwrap_or(0);

    info!(
        path = %args.db_path.display(),
        questions = questions,
        choices = choices,
        programs = programs,
        tests = tests,
        categories = categories,
        skills = skills,
        questions_without_options = without_options,
        "database status"
    );

    Ok(())
}
