//! Named-entity mention detection.
//!
//! [`MentionDetector`] is the seam for pluggable recognisers. Production
//! deployments run a pretrained entity model (see the `cdcr-ner-onnx`
//! crate). The built-in [`PatternDetector`] is a rule-based fallback for
//! English prose that must be selected explicitly. It finds proper-noun
//! runs, dotted acronyms, dates, years, money amounts and percentages.

use std::collections::HashSet;
use std::str::FromStr;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DetectError {
    #[error("entity model failed: {0}")]
    Inference(String),
}

/// Trait for entity mention recognisers.
pub trait MentionDetector: Send + Sync {
    /// Short identifier used in logs (e.g. "gliner", "pattern").
    fn detector_id(&self) -> &str;

    /// Return the surface string of every entity in `text`, in document
    /// order. Each mention is the exact slice of `text`. Duplicates are kept.
    fn detect(&self, text: &str) -> Result<Vec<String>, DetectError>;
}

/// Which recogniser a deployment runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DetectorEngine {
    /// Pretrained entity model loaded from `detection.model_path`.
    #[default]
    Model,
    /// Rule-based [`PatternDetector`].
    Pattern,
}

impl FromStr for DetectorEngine {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "model" | "gliner" | "onnx" => Ok(DetectorEngine::Model),
            "pattern" | "rules" => Ok(DetectorEngine::Pattern),
            other => Err(format!(
                "unknown detector engine '{other}' (expected 'model' or 'pattern')"
            )),
        }
    }
}

/// Options for [`PatternDetector`].
#[derive(Debug, Clone)]
pub struct DetectorConfig {
    /// Also emit dates, years, money amounts and percentages.
    pub include_numeric: bool,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            include_numeric: true,
        }
    }
}

/// Rule-based detector for proper nouns and numeric entities.
#[derive(Debug, Clone, Default)]
pub struct PatternDetector {
    config: DetectorConfig,
}

impl PatternDetector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: DetectorConfig) -> Self {
        Self { config }
    }
}

impl MentionDetector for PatternDetector {
    fn detector_id(&self) -> &str {
        "pattern"
    }

    fn detect(&self, text: &str) -> Result<Vec<String>, DetectError> {
        if text.is_empty() {
            return Ok(Vec::new());
        }

        let mut spans = proper_noun_spans(text);
        if self.config.include_numeric {
            spans.extend(numeric_spans(text));
        }

        Ok(resolve_overlaps(spans)
            .into_iter()
            .map(|span| text[span.start..span.end].to_string())
            .collect())
    }
}

// ── Patterns ────────────────────────────────────────────────────────────

/// Gap allowed between words of one mention: blanks, or a single line break.
/// Extracted PDF text ends every visual line with `\n`, so names wrap.
const GAP: &str = r"(?:[ \t]+|[ \t]*\n[ \t]*)";

/// Dotted acronyms, or runs of capitalised words with optional lowercase
/// connectors between them. A blank line ends a run.
static CAPITALIZED_SPAN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        r"\b(?:\p{{Lu}}\.){{2,}}|\b(?:\p{{Lu}}\.|\p{{Lu}}[\p{{L}}\p{{N}}'’\-]*)(?:(?:{GAP}(?:of|de|du|del|der|van|von|la|le|da|&))?{GAP}(?:\p{{Lu}}\.|\p{{Lu}}[\p{{L}}\p{{N}}'’\-]*))*"
    ))
    .unwrap()
});

static CAPITALIZED_WORD: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b\p{Lu}[\p{L}\p{N}'’\-]*").unwrap());

static SPAN_WORD: Lazy<Regex> = Lazy::new(|| Regex::new(r"\S+").unwrap());

const MONTHS: &str =
    "January|February|March|April|May|June|July|August|September|October|November|December";

static NUMERIC_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    vec![
        // January 5, 2020 / March 3rd
        Regex::new(&format!(
            r"\b(?:{MONTHS}){GAP}\d{{1,2}}(?:st|nd|rd|th)?(?:,?{GAP}\d{{4}})?\b"
        ))
        .unwrap(),
        // 5 January 2020
        Regex::new(&format!(r"\b\d{{1,2}}{GAP}(?:{MONTHS})(?:,?{GAP}\d{{4}})?\b")).unwrap(),
        // Four-digit years
        Regex::new(r"\b(?:1[6-9]|20)\d{2}\b").unwrap(),
        // $1,200 / $3.5 million
        Regex::new(
            r"\$[ \t]?\d[\d,]*(?:\.\d+)?(?:[ \t]+(?:thousand|million|billion|trillion))?\b",
        )
        .unwrap(),
        // 12.5%
        Regex::new(r"\b\d+(?:\.\d+)?[ \t]?%").unwrap(),
    ]
});

/// Capitalised words that start sentences without naming anything.
static FUNCTION_WORDS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "A", "About", "After", "Again", "All", "Also", "Although", "An", "And", "Any", "As", "At",
        "Because", "Before", "Both", "But", "By", "During", "Each", "Either", "Every", "For",
        "From", "Furthermore", "He", "Her", "Here", "His", "How", "However", "I", "If", "In",
        "Into", "It", "Its", "Many", "Moreover", "Most", "My", "Neither", "No", "Nor", "Not",
        "Of", "On", "Once", "Only", "Or", "Our", "Over", "She", "Since", "So", "Some", "Such",
        "That", "The", "Their", "Then", "There", "These", "They", "This", "Those", "Thus", "To",
        "Under", "Unlike", "Upon", "We", "What", "When", "Where", "Whether", "Which", "While",
        "Who", "Why", "With", "Within", "Without", "Yes", "Yet", "You", "Your", "Mr", "Mrs",
        "Ms", "Dr", "Prof",
    ]
    .into_iter()
    .collect()
});

/// Abbreviations whose trailing period belongs to the mention.
static ABBREVIATIONS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "Inc", "Corp", "Ltd", "Co", "Jr", "Sr", "Bros", "Dept", "Univ", "St",
    ]
    .into_iter()
    .collect()
});

/// Words whose trailing period does not end a sentence.
static NON_TERMINAL_BEFORE_PERIOD: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    ABBREVIATIONS
        .iter()
        .copied()
        .chain(["Mr", "Mrs", "Ms", "Dr", "Prof", "vs", "etc"])
        .collect()
});

// ── Span extraction ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Span {
    start: usize,
    end: usize,
}

fn proper_noun_spans(text: &str) -> Vec<Span> {
    let mid_sentence = mid_sentence_words(text);
    let mut spans = Vec::new();

    for m in CAPITALIZED_SPAN.find_iter(text) {
        let end = trim_possessive(text, m.start(), m.end());
        let end = extend_abbreviation(text, m.start(), end);
        let Some(start) = skip_function_words(text, m.start(), end) else {
            continue;
        };

        let surface = &text[start..end];
        if !surface.contains(char::is_whitespace) {
            if surface.chars().count() < 2 {
                continue;
            }
            if is_sentence_initial(text, start)
                && !mid_sentence.contains(surface.trim_end_matches('.'))
            {
                continue;
            }
        }
        spans.push(Span { start, end });
    }

    spans
}

fn numeric_spans(text: &str) -> Vec<Span> {
    NUMERIC_PATTERNS
        .iter()
        .flat_map(|re| re.find_iter(text))
        .map(|m| Span {
            start: m.start(),
            end: m.end(),
        })
        .collect()
}

/// Keep the earliest span at each position, preferring the longest when
/// two start together, and drop anything overlapping a kept span.
fn resolve_overlaps(mut spans: Vec<Span>) -> Vec<Span> {
    spans.sort_by(|a, b| a.start.cmp(&b.start).then(b.end.cmp(&a.end)));

    let mut kept: Vec<Span> = Vec::with_capacity(spans.len());
    let mut frontier = 0;
    for span in spans {
        if span.start >= frontier {
            frontier = span.end;
            kept.push(span);
        }
    }
    kept
}

/// Capitalised words that occur somewhere other than a sentence start.
fn mid_sentence_words(text: &str) -> HashSet<&str> {
    CAPITALIZED_WORD
        .find_iter(text)
        .filter(|m| !is_sentence_initial(text, m.start()))
        .map(|m| strip_possessive(m.as_str()))
        .collect()
}

fn strip_possessive(word: &str) -> &str {
    word.strip_suffix("'s")
        .or_else(|| word.strip_suffix("’s"))
        .unwrap_or(word)
}

fn trim_possessive(text: &str, start: usize, end: usize) -> usize {
    start + strip_possessive(&text[start..end]).len()
}

fn extend_abbreviation(text: &str, start: usize, end: usize) -> usize {
    let last_word = text[start..end]
        .rsplit(char::is_whitespace)
        .next()
        .unwrap_or_default();
    if ABBREVIATIONS.contains(last_word) && text[end..].starts_with('.') {
        end + 1
    } else {
        end
    }
}

/// Offset of the first word in `text[start..end]` that is not a function
/// word or connector, or `None` if every word is.
fn skip_function_words(text: &str, start: usize, end: usize) -> Option<usize> {
    SPAN_WORD
        .find_iter(&text[start..end])
        .find(|w| {
            let word = w.as_str().trim_end_matches('.');
            !FUNCTION_WORDS.contains(word) && word.starts_with(char::is_uppercase)
        })
        .map(|w| start + w.start())
}

/// True when nothing but blanks, opening quotes or brackets separate `pos`
/// from the start of the text, the start of a line, or a sentence-ending
/// mark. Line starts count because PDF headings and wrapped lines
/// capitalise common words there.
fn is_sentence_initial(text: &str, pos: usize) -> bool {
    let before = &text[..pos];
    for (idx, c) in before.char_indices().rev() {
        if c == '\n' {
            return true;
        }
        if c.is_whitespace() || matches!(c, '"' | '\'' | '“' | '‘' | '(' | '[') {
            continue;
        }
        return match c {
            '!' | '?' => true,
            '.' => !ends_with_non_terminal(&before[..idx]),
            _ => false,
        };
    }
    true
}

fn ends_with_non_terminal(before_period: &str) -> bool {
    let word_start = before_period
        .char_indices()
        .rev()
        .take_while(|(_, c)| c.is_alphabetic())
        .last()
        .map(|(i, _)| i);
    let Some(word_start) = word_start else {
        return false;
    };
    let word = &before_period[word_start..];
    let single_initial = word.chars().count() == 1 && word.starts_with(char::is_uppercase);
    single_initial || NON_TERMINAL_BEFORE_PERIOD.contains(word)
}
