use anyhow::{Context, Result};
use rusqlite::{Connection, OptionalExtension, Transaction, params};
use serde_json::{Map, Value};

use crate::model::{DIFFICULTY_UNKNOWN, LookupRef, ParsedQuestion, QuestionRecord};
use crate::util::now_utc_string;

/// Content keys mapped onto first-class columns. Anything else in the import
/// payload's `content` object is carried through `extra`, so these must never
/// appear there as well.
const MAPPED_CONTENT_KEYS: [&str; 8] = [
    "stem",
    "prompt",
    "question",
    "rationale",
    "answer",
    "correct_answer",
    "keys",
    "answerOptions",
];

/// Insert-or-update one canonical record, keyed by its stable uid. The
/// question row, its lookups, and its choice rows are written in a single
/// transaction, so a partially persisted record cannot be observed. Returns
/// whether the record was created (vs. updated).
pub fn upsert_question(connection: &mut Connection, record: &QuestionRecord) -> Result<bool> {
    let now = now_utc_string();
    let tx = connection
        .transaction()
        .context("failed to start upsert transaction")?;

    let program_id = get_or_create_named(&tx, "programs", &record.program)?;
    let test_id = get_or_create_named(&tx, "tests", &record.module)?;
    let category_id = record
        .category
        .as_ref()
        .map(|category| get_or_create_category(&tx, category))
        .transpose()?;
    let skill_id = match (&record.skill, category_id) {
        (Some(skill), Some(category_id)) => Some(get_or_create_skill(&tx, skill, category_id)?),
        _ => None,
    };

    let existed: bool = tx.query_row(
        "SELECT EXISTS(SELECT 1 FROM questions WHERE uid = ?1)",
        [&record.uid],
        |row| row.get(0),
    )?;

    let correct_answers = serde_json::to_string(&record.correct_answers)
        .context("failed to serialize correct answers")?;
    let answer_options = serde_json::to_string(&record.answer_options)
        .context("failed to serialize answer options")?;
    let extra =
        serde_json::to_string(&record.extra).context("failed to serialize extra attributes")?;

    tx.execute(
        "
        INSERT INTO questions(
          uid, question_id, program, module, difficulty, sequence_number,
          stem, rationale, external_id, score_band_range_cd,
          correct_answers, answer_options, extra, source_url,
          program_id, test_id, category_id, skill_id,
          created_at, updated_at
        )
        VALUES(?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?19)
        ON CONFLICT(uid) DO UPDATE SET
          question_id=excluded.question_id,
          program=excluded.program,
          module=excluded.module,
          difficulty=excluded.difficulty,
          sequence_number=excluded.sequence_number,
          stem=excluded.stem,
          rationale=excluded.rationale,
          external_id=excluded.external_id,
          score_band_range_cd=excluded.score_band_range_cd,
          correct_answers=excluded.correct_answers,
          answer_options=excluded.answer_options,
          extra=excluded.extra,
          source_url=excluded.source_url,
          program_id=excluded.program_id,
          test_id=excluded.test_id,
          category_id=excluded.category_id,
          skill_id=excluded.skill_id,
          updated_at=excluded.updated_at
        ",
        params![
            record.uid,
            record.question_id,
            record.program,
            record.module,
            record.difficulty,
            record.sequence_number,
            record.stem,
            record.rationale,
            record.external_id,
            record.score_band_range_cd,
            correct_answers,
            answer_options,
            extra,
            record.source_url,
            program_id,
            test_id,
            category_id,
            skill_id,
            now,
        ],
    )
    .with_context(|| format!("failed to upsert question {}", record.uid))?;

    tx.execute(
        "DELETE FROM choices WHERE question_uid = ?1",
        [&record.uid],
    )?;
    {
        let mut statement = tx.prepare(
            "INSERT INTO choices(question_uid, ord, label, text, is_correct)
             VALUES(?1, ?2, ?3, ?4, ?5)",
        )?;
        for (index, choice) in record.choices.iter().enumerate() {
            statement.execute(params![
                record.uid,
                (index + 1) as i64,
                choice.label,
                choice.text,
                choice.is_correct,
            ])?;
        }
    }

    tx.commit().context("failed to commit upsert transaction")?;

    Ok(!existed)
}

/// Get-or-create for the name-keyed lookups (programs, tests).
fn get_or_create_named(tx: &Transaction<'_>, table: &str, name: &str) -> Result<i64> {
    let select = format!("SELECT id FROM {table} WHERE name = ?1");
    let existing: Option<i64> = tx
        .query_row(&select, [name], |row| row.get(0))
        .optional()
        .with_context(|| format!("failed to look up {table} entry"))?;
    if let Some(id) = existing {
        return Ok(id);
    }

    let insert = format!("INSERT INTO {table}(name) VALUES(?1)");
    tx.execute(&insert, [name])
        .with_context(|| format!("failed to create {table} entry"))?;
    Ok(tx.last_insert_rowid())
}

/// Categories are keyed by code. The description is refreshed in place when
/// a later record supplies a non-empty one that differs from what is stored;
/// the code itself never changes.
fn get_or_create_category(tx: &Transaction<'_>, category: &LookupRef) -> Result<i64> {
    let existing: Option<(i64, String)> = tx
        .query_row(
            "SELECT id, name FROM categories WHERE code = ?1",
            [&category.code],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()
        .context("failed to look up category")?;

    if let Some((id, stored_name)) = existing {
        if !category.name.is_empty() && stored_name != category.name {
            tx.execute(
                "UPDATE categories SET name = ?1 WHERE id = ?2",
                params![category.name, id],
            )?;
        }
        return Ok(id);
    }

    let name = if category.name.is_empty() {
        &category.code
    } else {
        &category.name
    };
    tx.execute(
        "INSERT INTO categories(code, name) VALUES(?1, ?2)",
        params![category.code, name],
    )
    .context("failed to create category")?;
    Ok(tx.last_insert_rowid())
}

/// Skills are keyed by (code, category); the same code may exist under two
/// different categories. Description refresh mirrors categories.
fn get_or_create_skill(tx: &Transaction<'_>, skill: &LookupRef, category_id: i64) -> Result<i64> {
    let existing: Option<(i64, String)> = tx
        .query_row(
            "SELECT id, name FROM skills WHERE code = ?1 AND category_id = ?2",
            params![skill.code, category_id],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()
        .context("failed to look up skill")?;

    if let Some((id, stored_name)) = existing {
        if !skill.name.is_empty() && stored_name != skill.name {
            tx.execute(
                "UPDATE skills SET name = ?1 WHERE id = ?2",
                params![skill.name, id],
            )?;
        }
        return Ok(id);
    }

    let name = if skill.name.is_empty() {
        &skill.code
    } else {
        &skill.name
    };
    tx.execute(
        "INSERT INTO skills(code, name, category_id) VALUES(?1, ?2, ?3)",
        params![skill.code, name, category_id],
    )
    .context("failed to create skill")?;
    Ok(tx.last_insert_rowid())
}

/// Map one scraped page onto the canonical record shape.
pub fn record_from_parsed(parsed: &ParsedQuestion, program: &str) -> QuestionRecord {
    QuestionRecord {
        uid: parsed.uid.clone(),
        question_id: None,
        program: program.to_string(),
        module: parsed.section.as_str().to_string(),
        difficulty: Some(DIFFICULTY_UNKNOWN.to_string()),
        sequence_number: parsed.sequence_number,
        stem: parsed.stem.clone(),
        rationale: parsed.explanation.clone(),
        external_id: None,
        score_band_range_cd: None,
        correct_answers: parsed.correct_keys.clone(),
        answer_options: parsed.choices.iter().map(|c| c.text.clone()).collect(),
        choices: parsed.choices.clone(),
        category: None,
        skill: None,
        extra: Map::new(),
        source_url: Some(parsed.url.clone()),
    }
}

/// Map one import payload entry onto the canonical record shape.
pub fn normalize_entry(uid: &str, payload: &Value) -> QuestionRecord {
    let empty = Map::new();
    let top = payload.as_object().unwrap_or(&empty);
    let content = top
        .get("content")
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default();

    let answer_options = normalized_options(content.get("answerOptions"));

    let program = non_empty_str(top.get("program")).unwrap_or_else(|| "SAT".to_string());
    let module = module_display_name(top.get("module"));
    let difficulty = non_empty_str(top.get("difficulty"));
    let question_id =
        non_empty_str(top.get("questionId")).or_else(|| non_empty_str(top.get("question_id")));
    let external_id = non_empty_str(top.get("external_id"));
    let score_band_range_cd = top.get("score_band_range_cd").and_then(Value::as_i64);

    let category = lookup_ref(
        top.get("primary_class_cd"),
        top.get("primary_class_cd_desc"),
    );
    let skill = lookup_ref(top.get("skill_cd"), top.get("skill_desc"));

    // Stem and rationale coalesce over the known spellings, first non-empty
    // wins.
    let stem = non_empty_str(content.get("stem"))
        .or_else(|| non_empty_str(content.get("prompt")))
        .or_else(|| non_empty_str(content.get("question")))
        .unwrap_or_default();
    let nested_answer = content
        .get("answer")
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default();
    let rationale = non_empty_str(content.get("rationale"))
        .or_else(|| non_empty_str(nested_answer.get("rationale")))
        .unwrap_or_default();

    // No stated answer means every option is a candidate key, not a failure.
    let mut correct_answers = string_list(content.get("correct_answer"));
    if correct_answers.is_empty() {
        correct_answers = string_list(nested_answer.get("correct_choice"));
    }
    if correct_answers.is_empty() {
        correct_answers = string_list(content.get("keys"));
    }
    if correct_answers.is_empty() {
        correct_answers = answer_options.clone();
    }

    let mut extra: Map<String, Value> = content
        .into_iter()
        .filter(|(key, _)| !MAPPED_CONTENT_KEYS.contains(&key.as_str()))
        .collect();
    if let Some(ibn) = top.get("ibn") {
        extra.insert("ibn".to_string(), ibn.clone());
    }
    extra.retain(|_, value| !is_empty_value(value));

    QuestionRecord {
        uid: uid.to_string(),
        question_id,
        program,
        module,
        difficulty,
        sequence_number: None,
        stem,
        rationale,
        external_id,
        score_band_range_cd,
        correct_answers,
        answer_options,
        choices: Vec::new(),
        category,
        skill,
        extra,
        source_url: None,
    }
}

/// `module` values in the export are lowercase tokens; map the known ones to
/// their display names and pass anything else through trimmed.
fn module_display_name(value: Option<&Value>) -> String {
    let raw = value
        .and_then(Value::as_str)
        .map(str::trim)
        .unwrap_or_default();
    match raw.to_lowercase().as_str() {
        "math" => "Math".to_string(),
        "reading" | "reading and writing" => "Reading and Writing".to_string(),
        "" => "Unknown".to_string(),
        _ => raw.to_string(),
    }
}

/// `answerOptions` entries are either plain strings or `{content: string}`
/// objects; normalize to a flat list of trimmed non-empty strings.
fn normalized_options(value: Option<&Value>) -> Vec<String> {
    let Some(Value::Array(items)) = value else {
        return Vec::new();
    };

    let mut options = Vec::new();
    for item in items {
        let text = match item {
            Value::String(text) => text.trim().to_string(),
            Value::Object(object) => object
                .get("content")
                .and_then(Value::as_str)
                .map(|text| text.trim().to_string())
                .unwrap_or_default(),
            _ => String::new(),
        };
        if !text.is_empty() {
            options.push(text);
        }
    }
    options
}

fn lookup_ref(code: Option<&Value>, name: Option<&Value>) -> Option<LookupRef> {
    let code = non_empty_str(code).unwrap_or_default();
    let name = non_empty_str(name).unwrap_or_default();
    if code.is_empty() && name.is_empty() {
        return None;
    }
    Some(LookupRef { code, name })
}

fn non_empty_str(value: Option<&Value>) -> Option<String> {
    value
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|text| !text.is_empty())
        .map(str::to_string)
}

/// A correct-answer field may be a single string or a list of strings.
fn string_list(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::String(text)) if !text.trim().is_empty() => vec![text.trim().to_string()],
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|item| item.as_str())
            .map(str::trim)
            .filter(|text| !text.is_empty())
            .map(str::to_string)
            .collect(),
        _ => Vec::new(),
    }
}

fn is_empty_value(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(text) => text.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(object) => object.is_empty(),
        _ => false,
    }
}
