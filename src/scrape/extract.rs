use anyhow::{Context, Result};
use regex::Regex;
use scraper::Html;

use crate::model::{ParsedChoice, ParsedQuestion, Section};
use crate::util::short_url_hash;

const CHOICE_LABELS: [&str; 4] = ["A", "B", "C", "D"];

/// Flatten a document to newline-separated plain text: every text node
/// trimmed, empties dropped. Downstream heuristics depend on this exact
/// shape, which mirrors how already-scraped data was flattened.
pub fn flatten_document(document: &Html) -> String {
    document
        .root_element()
        .text()
        .map(str::trim)
        .filter(|text| !text.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Heuristic field extraction over flattened question-page text. Pure over
/// the text, so captured page snapshots can be golden-tested offline.
pub struct QuestionExtractor {
    correct_answer: Regex,
    first_choice: Regex,
    choice_marker: Regex,
    rationale: Regex,
    paging: Regex,
    whitespace: Regex,
    numeric_token: Regex,
}

impl QuestionExtractor {
    pub fn new() -> Result<Self> {
        Ok(Self {
            correct_answer: Regex::new(r"(?i)Correct\s*Answer:\s*([A-D])")
                .context("failed to compile correct-answer pattern")?,
            first_choice: Regex::new(r"\n\s*1\.\s*")
                .context("failed to compile first-choice pattern")?,
            choice_marker: Regex::new(r"\n\s*([1-4])\.\s*")
                .context("failed to compile choice-marker pattern")?,
            rationale: Regex::new(r"(?is)Rationale\s*(.+)$")
                .context("failed to compile rationale pattern")?,
            paging: Regex::new(r"(\d+)\s*/\s*\d+")
                .context("failed to compile paging pattern")?,
            whitespace: Regex::new(r"\s+").context("failed to compile whitespace pattern")?,
            numeric_token: Regex::new(r"\d+(?:\.\d+)?(?:/\d+)?")
                .context("failed to compile numeric-token pattern")?,
        })
    }

    /// Extract one question from flattened page text. Returns `None` when no
    /// numbered-choice boundary exists, meaning the page structure is not
    /// recognizable as a question; the caller logs and skips.
    pub fn parse(&self, body_text: &str, url: &str) -> Option<ParsedQuestion> {
        let boundary = self.first_choice.find(body_text)?;

        let correct_letter = self
            .correct_answer
            .captures(body_text)
            .map(|caps| caps[1].to_uppercase())
            .unwrap_or_default();

        let stem = body_text[..boundary.start()].trim().to_string();

        let choices = self.extract_choices(&body_text[boundary.start()..], &correct_letter);

        let explanation = self
            .rationale
            .captures(body_text)
            .map(|caps| self.collapse(&caps[1]))
            .unwrap_or_default();

        let mut correct_keys: Vec<String> = choices
            .iter()
            .filter(|choice| choice.is_correct)
            .map(|choice| choice.text.clone())
            .collect();
        for token in self.numeric_answer_candidates(&explanation) {
            if !correct_keys.contains(&token) {
                correct_keys.push(token);
            }
        }

        let lowered = body_text.to_lowercase();
        let section = if lowered.contains("reading and writing") || lowered.contains("standard english")
        {
            Section::ReadingWriting
        } else if lowered.contains("math") {
            Section::Math
        } else {
            Section::Unknown
        };

        let sequence_number = self
            .paging
            .captures(body_text)
            .and_then(|caps| caps[1].parse::<i64>().ok());

        Some(ParsedQuestion {
            uid: short_url_hash(url),
            url: url.to_string(),
            section,
            sequence_number,
            stem,
            explanation,
            correct_keys,
            choices,
        })
    }

    /// Numbered spans `1.` through `4.` starting at the choices boundary.
    /// Each span runs until the next number-dot marker or the end of the
    /// text, and the ordinal maps positionally onto labels A-D.
    fn extract_choices(&self, choices_block: &str, correct_letter: &str) -> Vec<ParsedChoice> {
        let markers: Vec<(usize, usize, usize)> = self
            .choice_marker
            .captures_iter(choices_block)
            .filter_map(|caps| {
                let whole = caps.get(0)?;
                let ordinal = caps[1].parse::<usize>().ok()?;
                Some((whole.start(), whole.end(), ordinal))
            })
            .collect();

        let mut choices = Vec::new();
        for (index, &(_, end, ordinal)) in markers.iter().enumerate() {
            let span_end = markers
                .get(index + 1)
                .map(|&(start, _, _)| start)
                .unwrap_or(choices_block.len());
            let Some(label) = CHOICE_LABELS.get(ordinal - 1) else {
                continue;
            };

            let text = self.collapse(&choices_block[end..span_end]);
            choices.push(ParsedChoice {
                label: (*label).to_string(),
                text,
                is_correct: *label == correct_letter,
            });
        }

        choices
    }

    /// Standalone numeric tokens in the rationale: plain decimals or simple
    /// fractions that are not embedded in a larger number or expression.
    /// These cover free-response items whose canonical answer is a number
    /// rather than a lettered choice.
    fn numeric_answer_candidates(&self, explanation: &str) -> Vec<String> {
        let mut tokens = Vec::new();
        for found in self.numeric_token.find_iter(explanation) {
            let before = explanation[..found.start()].chars().next_back();
            if matches!(before, Some(c) if c.is_ascii_digit() || c == '.' || c == '/' || c == '-') {
                continue;
            }
            let after = explanation[found.end()..].chars().next();
            if matches!(after, Some(c) if c.is_ascii_digit() || c == '/') {
                continue;
            }

            let token = found.as_str().to_string();
            if !tokens.contains(&token) {
                tokens.push(token);
            }
        }
        tokens
    }

    fn collapse(&self, text: &str) -> String {
        self.whitespace.replace_all(text, " ").trim().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE_URL: &str = "https://sat-questions.onrender.com/question/algebra/abc123";

    fn extractor() -> QuestionExtractor {
        QuestionExtractor::new().unwrap()
    }

    fn math_page_text() -> String {
        [
            "SAT Math Practice",
            "3 / 66",
            "If 2x + 3 = 11, what is the value of x?",
            "1.",
            "2",
            "2.",
            "4",
            "3.",
            "6",
            "4.",
            "8",
            "Correct Answer: B",
            "Rationale",
            "Subtracting 3 from both sides gives 2x = 8, so x = 4 .",
        ]
        .join("\n")
    }

    #[test]
    fn explicit_correct_answer_marks_exactly_one_choice() {
        let parsed = extractor().parse(&math_page_text(), PAGE_URL).unwrap();

        assert_eq!(parsed.choices.len(), 4);
        let flags: Vec<bool> = parsed.choices.iter().map(|c| c.is_correct).collect();
        assert_eq!(flags, vec![false, true, false, false]);
    }

    #[test]
    fn choice_labels_are_assigned_positionally() {
        let parsed = extractor().parse(&math_page_text(), PAGE_URL).unwrap();
        let labels: Vec<&str> = parsed.choices.iter().map(|c| c.label.as_str()).collect();
        assert_eq!(labels, vec!["A", "B", "C", "D"]);
        assert_eq!(parsed.choices[1].text, "4");
    }

    #[test]
    fn stem_is_text_before_first_numbered_choice() {
        let parsed = extractor().parse(&math_page_text(), PAGE_URL).unwrap();
        assert!(parsed.stem.ends_with("what is the value of x?"));
        assert!(!parsed.stem.contains("Correct Answer"));
    }

    #[test]
    fn page_without_choice_boundary_is_rejected() {
        let text = "Welcome to the question bank\nPick a category to begin";
        assert!(extractor().parse(text, PAGE_URL).is_none());
    }

    #[test]
    fn correct_answer_marker_is_optional() {
        let text = "What is 1 + 1?\n1.\n1\n2.\n2";
        let parsed = extractor().parse(text, PAGE_URL).unwrap();
        assert!(parsed.choices.iter().all(|c| !c.is_correct));
        assert!(parsed.correct_keys.is_empty());
    }

    #[test]
    fn rationale_is_collapsed_and_optional() {
        let parsed = extractor().parse(&math_page_text(), PAGE_URL).unwrap();
        assert!(parsed.explanation.starts_with("Subtracting 3"));

        let without = "Q?\n1.\na\n2.\nb";
        let parsed = extractor().parse(without, PAGE_URL).unwrap();
        assert_eq!(parsed.explanation, "");
    }

    #[test]
    fn correct_keys_start_with_correct_choice_then_mined_numbers() {
        let parsed = extractor().parse(&math_page_text(), PAGE_URL).unwrap();
        // "4" is both the correct choice text and a rationale token; the
        // dedup keeps first-seen order.
        assert_eq!(parsed.correct_keys[0], "4");
        assert!(parsed.correct_keys.contains(&"3".to_string()));
        assert!(!parsed.correct_keys.contains(&"2x".to_string()));
    }

    #[test]
    fn numeric_mining_skips_tokens_inside_larger_numbers() {
        let ex = extractor();
        let tokens = ex.numeric_answer_candidates("The answer is 3/4, not 0.75x or 12.5.");
        assert!(tokens.contains(&"3/4".to_string()));
        assert!(tokens.contains(&"12.5".to_string()));
        assert!(!tokens.contains(&"4".to_string()));
        assert!(!tokens.contains(&"75".to_string()));
    }

    #[test]
    fn section_classification_prefers_reading_and_writing() {
        let text = "Reading and Writing practice with math vocabulary\nQ?\n1.\na\n2.\nb";
        let parsed = extractor().parse(text, PAGE_URL).unwrap();
        assert_eq!(parsed.section, Section::ReadingWriting);

        let text = "Standard English Conventions\nQ?\n1.\na\n2.\nb";
        let parsed = extractor().parse(text, PAGE_URL).unwrap();
        assert_eq!(parsed.section, Section::ReadingWriting);

        let text = "Geometry drill\nQ?\n1.\na\n2.\nb";
        let parsed = extractor().parse(text, PAGE_URL).unwrap();
        assert_eq!(parsed.section, Section::Unknown);
    }

    #[test]
    fn sequence_number_comes_from_paging_text() {
        let parsed = extractor().parse(&math_page_text(), PAGE_URL).unwrap();
        assert_eq!(parsed.sequence_number, Some(3));

        let text = "Math question\n1.\na\n2.\nb";
        let parsed = extractor().parse(text, PAGE_URL).unwrap();
        assert_eq!(parsed.sequence_number, None);
    }

    #[test]
    fn identity_is_a_pure_function_of_the_url() {
        let first = extractor().parse(&math_page_text(), PAGE_URL).unwrap();
        let second = extractor().parse(&math_page_text(), PAGE_URL).unwrap();
        assert_eq!(first.uid, second.uid);
        assert_eq!(first.uid.len(), 16);

        let other = extractor()
            .parse(&math_page_text(), "https://sat-questions.onrender.com/question/algebra/zzz")
            .unwrap();
        assert_ne!(first.uid, other.uid);
    }

    #[test]
    fn flatten_document_joins_trimmed_text_nodes_with_newlines() {
        let html = Html::parse_document(
            "<html><body><p>  If 2x + 3 = 11  </p><div><span>1.</span><span> 2 </span></div></body></html>",
        );
        let text = flatten_document(&html);
        assert_eq!(text, "If 2x + 3 = 11\n1.\n2");
    }
}
