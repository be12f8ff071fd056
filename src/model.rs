use serde::Serialize;
use serde_json::{Map, Value};

/// Coarse subject bucket. The source pages and the JSON export spell these
/// differently; both paths normalize onto the same three display names.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Section {
    ReadingWriting,
    Math,
    Unknown,
}

impl Section {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ReadingWriting => "Reading and Writing",
            Self::Math => "Math",
            Self::Unknown => "Unknown",
        }
    }
}

pub const DIFFICULTY_UNKNOWN: &str = "Unknown";

/// One selectable answer option as extracted from a question page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedChoice {
    pub label: String,
    pub text: String,
    pub is_correct: bool,
}

/// Best-effort structured extraction from one flattened question page.
#[derive(Debug, Clone)]
pub struct ParsedQuestion {
    pub uid: String,
    pub url: String,
    pub section: Section,
    pub sequence_number: Option<i64>,
    pub stem: String,
    pub explanation: String,
    pub correct_keys: Vec<String>,
    pub choices: Vec<ParsedChoice>,
}

/// Reference into a lookup table: a short code plus a human description.
#[derive(Debug, Clone, Default)]
pub struct LookupRef {
    pub code: String,
    pub name: String,
}

/// The canonical shape persisted for one question, regardless of whether it
/// came from a scrape or a JSON import.
#[derive(Debug, Clone)]
pub struct QuestionRecord {
    pub uid: String,
    pub question_id: Option<String>,
    pub program: String,
    pub module: String,
    pub difficulty: Option<String>,
    pub sequence_number: Option<i64>,
    pub stem: String,
    pub rationale: String,
    pub external_id: Option<String>,
    pub score_band_range_cd: Option<i64>,
    pub correct_answers: Vec<String>,
    pub answer_options: Vec<String>,
    pub choices: Vec<ParsedChoice>,
    pub category: Option<LookupRef>,
    pub skill: Option<LookupRef>,
    pub extra: Map<String, Value>,
    pub source_url: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct ScrapeCounts {
    pub pages_visited: usize,
    pub created: usize,
    pub updated: usize,
    pub skipped: usize,
}

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct ImportCounts {
    pub entries: usize,
    pub created: usize,
    pub updated: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScrapeRunManifest {
    pub manifest_version: u32,
    pub run_id: String,
    pub status: String,
    pub started_at: String,
    pub finished_at: String,
    pub base_url: String,
    pub db_path: String,
    pub limit: usize,
    pub dry_run: bool,
    pub counts: ScrapeCounts,
}
