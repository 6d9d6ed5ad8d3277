//! Pretrained entity recognition for cdcr, using GLiNER models exported to
//! ONNX and run with ONNX Runtime.
//!
//! [`GlinerDetector`] is the production [`MentionDetector`]. It splits the
//! text into words and runs the model over windows of whole sentences. It
//! keeps the best non-overlapping spans and returns each one as the exact
//! slice of the input. [`detector_from_config`] picks the detector a
//! deployment asked for.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use ort::session::Session;
use ort::session::builder::GraphOptimizationLevel;
use ort::value::Tensor;
use thiserror::Error;
use tokenizers::Tokenizer;

use cdcr_core::{Config, DetectError, DetectorEngine, MentionDetector, PatternDetector};

pub mod spans;

use spans::{ScoredSpan, Word, chunk_ranges, decode_logits, encode_prompt, flat_spans, span_tensors};

/// DeBERTa `[UNK]`, used for words the tokenizer maps to nothing.
const UNK_TOKEN_ID: u32 = 3;

/// Entity types asked for by default, after the OntoNotes types a general
/// English tagger reports.
pub const NAMED_LABELS: &[&str] = &[
    "person",
    "organization",
    "location",
    "nationality",
    "facility",
    "product",
    "event",
    "work of art",
    "law",
    "language",
];

/// Numeric entity types, dropped when `include_numeric` is off.
pub const NUMERIC_LABELS: &[&str] = &["date", "time", "money", "percent", "quantity"];

#[derive(Error, Debug)]
pub enum NerError {
    #[error(
        "detection.model_path is not set: point it at a GLiNER ONNX model, or set detection.engine = \"pattern\""
    )]
    ModelNotConfigured,
    #[error("no tokenizer.json found for {0}; set detection.tokenizer_path")]
    TokenizerNotFound(PathBuf),
    #[error("failed to load entity model {path}: {message}")]
    Model { path: PathBuf, message: String },
    #[error("failed to load tokenizer {path}: {message}")]
    Tokenizer { path: PathBuf, message: String },
    #[error("no entity labels left to detect")]
    NoLabels,
}

/// Inference settings.
#[derive(Debug, Clone)]
pub struct GlinerConfig {
    /// Minimum sigmoid score for a span to count as an entity.
    pub min_score: f32,
    /// Longest candidate span, in words.
    pub max_width: usize,
    /// Words per model call. Longer texts are split on sentence marks.
    pub chunk_words: usize,
    pub num_threads: usize,
}

impl Default for GlinerConfig {
    fn default() -> Self {
        Self {
            min_score: cdcr_core::DEFAULT_NER_MIN_SCORE,
            max_width: 12,
            chunk_words: 160,
            num_threads: 4,
        }
    }
}

pub struct GlinerDetector {
    session: Mutex<Session>,
    tokenizer: Tokenizer,
    labels: Vec<String>,
    label_tokens: Vec<Vec<u32>>,
    config: GlinerConfig,
}

impl GlinerDetector {
    /// Load the ONNX model and its tokenizer, and pre-tokenize `labels`.
    pub fn new(
        model_path: &Path,
        tokenizer_path: &Path,
        labels: Vec<String>,
        config: GlinerConfig,
    ) -> Result<Self, NerError> {
        if labels.is_empty() {
            return Err(NerError::NoLabels);
        }
        let model_err = |e: &dyn std::fmt::Display| NerError::Model {
            path: model_path.to_path_buf(),
            message: e.to_string(),
        };
        let session = Session::builder()
            .map_err(|e| model_err(&e))?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| model_err(&e))?
            .with_intra_threads(config.num_threads.max(1))
            .map_err(|e| model_err(&e))?
            .commit_from_file(model_path)
            .map_err(|e| model_err(&e))?;

        let tokenizer_err = |e: &dyn std::fmt::Display| NerError::Tokenizer {
            path: tokenizer_path.to_path_buf(),
            message: e.to_string(),
        };
        let tokenizer = Tokenizer::from_file(tokenizer_path).map_err(|e| tokenizer_err(&e))?;
        let label_tokens = labels
            .iter()
            .map(|label| {
                tokenizer
                    .encode(label.as_str(), false)
                    .map(|enc| enc.get_ids().to_vec())
                    .map_err(|e| tokenizer_err(&e))
            })
            .collect::<Result<Vec<_>, _>>()?;

        tracing::info!(
            model = %model_path.display(),
            labels = labels.len(),
            min_score = config.min_score,
            "loaded entity model"
        );
        Ok(Self {
            session: Mutex::new(session),
            tokenizer,
            labels,
            label_tokens,
            config,
        })
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    /// Score one window of words and return its flat spans, with word
    /// indices relative to the window.
    fn infer_window(&self, text: &str, words: &[Word]) -> Result<Vec<ScoredSpan>, DetectError> {
        let word_tokens = words
            .iter()
            .map(|w| {
                let word = &text[w.start..w.end];
                let enc = self
                    .tokenizer
                    .encode(word, false)
                    .map_err(|e| DetectError::Inference(format!("tokenizer failed on {word:?}: {e}")))?;
                let ids = enc.get_ids();
                Ok(if ids.is_empty() {
                    vec![UNK_TOKEN_ID]
                } else {
                    ids.to_vec()
                })
            })
            .collect::<Result<Vec<_>, DetectError>>()?;

        let prompt = encode_prompt(&self.label_tokens, &word_tokens);
        let (span_idx, span_mask) = span_tensors(words.len(), self.config.max_width);

        let logits = {
            let mut session = self
                .session
                .lock()
                .map_err(|_| DetectError::Inference("model session lock poisoned".into()))?;

            let outputs = session
                .run(ort::inputs![
                    "input_ids" => Tensor::from_array(prompt.input_ids).map_err(inference)?,
                    "attention_mask" => Tensor::from_array(prompt.attention_mask).map_err(inference)?,
                    "words_mask" => Tensor::from_array(prompt.words_mask).map_err(inference)?,
                    "text_lengths" => Tensor::from_array(prompt.text_lengths).map_err(inference)?,
                    "span_idx" => Tensor::from_array(span_idx).map_err(inference)?,
                    "span_mask" => Tensor::from_array(span_mask).map_err(inference)?,
                ])
                .map_err(inference)?;

            let value = match outputs.get("logits") {
                Some(value) => value,
                None => {
                    let key = outputs
                        .keys()
                        .next()
                        .ok_or_else(|| DetectError::Inference("model produced no outputs".into()))?;
                    &outputs[key]
                }
            };
            value
                .try_extract_array::<f32>()
                .map_err(inference)?
                .to_owned()
        };

        Ok(flat_spans(decode_logits(
            &logits,
            words.len(),
            self.labels.len(),
            self.config.max_width,
            self.config.min_score,
        )))
    }
}

fn inference(e: impl std::fmt::Display) -> DetectError {
    DetectError::Inference(e.to_string())
}

impl MentionDetector for GlinerDetector {
    fn detector_id(&self) -> &str {
        "gliner"
    }

    fn detect(&self, text: &str) -> Result<Vec<String>, DetectError> {
        let words = spans::split_words(text);
        if words.is_empty() {
            return Ok(Vec::new());
        }

        let mut mentions = Vec::new();
        for range in chunk_ranges(text, &words, self.config.chunk_words) {
            let window = &words[range];
            for span in self.infer_window(text, window)? {
                let start = window[span.start].start;
                let end = window[span.end].end;
                tracing::trace!(label = %self.labels[span.label], score = span.score, "entity");
                mentions.push(text[start..end].to_string());
            }
        }
        Ok(mentions)
    }
}

/// Labels to ask the model for: the configured ones, or the built-in set,
/// minus the numeric types when those are switched off.
pub fn entity_labels(configured: &[String], include_numeric: bool) -> Vec<String> {
    let base: Vec<String> = if configured.is_empty() {
        NAMED_LABELS
            .iter()
            .chain(NUMERIC_LABELS)
            .map(|l| l.to_string())
            .collect()
    } else {
        configured.to_vec()
    };
    base.into_iter()
        .filter(|l| include_numeric || !NUMERIC_LABELS.contains(&l.to_lowercase().as_str()))
        .collect()
}

/// The configured tokenizer, or a `tokenizer.json` beside the model or one
/// directory up (the layout GLiNER exports use: `onnx/model.onnx`).
pub fn resolve_tokenizer_path(model: &Path, configured: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = configured {
        return Some(path.to_path_buf());
    }
    model
        .ancestors()
        .skip(1)
        .take(2)
        .map(|dir| dir.join("tokenizer.json"))
        .find(|candidate| candidate.is_file())
}

/// Build the detector selected by `config`.
pub fn detector_from_config(config: &Config) -> Result<Arc<dyn MentionDetector>, NerError> {
    match config.detector_engine {
        DetectorEngine::Pattern => {
            tracing::warn!("using the rule-based pattern detector instead of an entity model");
            Ok(Arc::new(PatternDetector::with_config(config.detector())))
        }
        DetectorEngine::Model => {
            let model = config
                .ner_model
                .as_deref()
                .ok_or(NerError::ModelNotConfigured)?;
            let tokenizer = resolve_tokenizer_path(model, config.ner_tokenizer.as_deref())
                .ok_or_else(|| NerError::TokenizerNotFound(model.to_path_buf()))?;
            let labels = entity_labels(&config.ner_labels, config.include_numeric);
            let detector = GlinerDetector::new(
                model,
                &tokenizer,
                labels,
                GlinerConfig {
                    min_score: config.ner_min_score,
                    ..Default::default()
                },
            )?;
            Ok(Arc::new(detector))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn default_labels_include_numeric_types() {
        let labels = entity_labels(&[], true);
        assert!(labels.contains(&"person".to_string()));
        assert!(labels.contains(&"money".to_string()));
        assert_eq!(labels.len(), NAMED_LABELS.len() + NUMERIC_LABELS.len());
    }

    #[test]
    fn numeric_labels_dropped_when_disabled() {
        let labels = entity_labels(&strings(&["person", "Date", "city"]), false);
        assert_eq!(labels, strings(&["person", "city"]));
        assert!(entity_labels(&[], false).iter().all(|l| l != "percent"));
    }

    #[test]
    fn tokenizer_found_next_to_onnx_dir() {
        let dir = tempfile::tempdir().unwrap();
        let onnx = dir.path().join("onnx");
        std::fs::create_dir_all(&onnx).unwrap();
        std::fs::write(dir.path().join("tokenizer.json"), "{}").unwrap();
        let model = onnx.join("model.onnx");

        assert_eq!(
            resolve_tokenizer_path(&model, None),
            Some(dir.path().join("tokenizer.json"))
        );
        let explicit = Path::new("/etc/cdcr/tokenizer.json");
        assert_eq!(
            resolve_tokenizer_path(&model, Some(explicit)),
            Some(explicit.to_path_buf())
        );
        assert!(resolve_tokenizer_path(&dir.path().join("x/y/model.onnx"), None).is_none());
    }

    #[test]
    fn pattern_engine_builds_rule_detector() {
        let config = Config {
            detector_engine: DetectorEngine::Pattern,
            ..Default::default()
        };
        let Ok(detector) = detector_from_config(&config) else {
            panic!("pattern detector should always build");
        };
        assert_eq!(detector.detector_id(), "pattern");
        assert_eq!(
            detector.detect("the board met Tim Cook").unwrap(),
            vec!["Tim Cook"]
        );
    }

    #[test]
    fn model_engine_requires_a_model_path() {
        let Err(err) = detector_from_config(&Config::default()) else {
            panic!("no model configured");
        };
        assert!(matches!(err, NerError::ModelNotConfigured));
        assert!(err.to_string().contains("engine = \"pattern\""));
    }

    #[test]
    fn model_without_tokenizer_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config {
            ner_model: Some(dir.path().join("onnx").join("model.onnx")),
            ..Default::default()
        };
        let Err(err) = detector_from_config(&config) else {
            panic!("tokenizer is missing");
        };
        assert!(matches!(err, NerError::TokenizerNotFound(_)));
    }

    #[test]
    fn empty_label_list_is_rejected_before_loading() {
        let result = GlinerDetector::new(
            Path::new("absent.onnx"),
            Path::new("absent.json"),
            Vec::new(),
            GlinerConfig::default(),
        );
        assert!(matches!(result, Err(NerError::NoLabels)));
    }

    // -- Tests that need a GLiNER export. Set CDCR_NER_MODEL_DIR to a
    // directory holding onnx/model.onnx and tokenizer.json to run them.

    fn model_detector() -> Option<GlinerDetector> {
        let dir = PathBuf::from(std::env::var("CDCR_NER_MODEL_DIR").ok()?);
        let model = dir.join("onnx").join("model.onnx");
        let tokenizer = dir.join("tokenizer.json");
        if !model.is_file() || !tokenizer.is_file() {
            return None;
        }
        Some(
            GlinerDetector::new(
                &model,
                &tokenizer,
                entity_labels(&[], true),
                GlinerConfig {
                    min_score: 0.3,
                    ..Default::default()
                },
            )
            .unwrap(),
        )
    }

    #[test]
    fn model_finds_company_founder_city() {
        let Some(detector) = model_detector() else {
            eprintln!("Skipping: CDCR_NER_MODEL_DIR not set");
            return;
        };
        let text = "Apple Inc. was founded by Steve Jobs. Apple Inc. is based in Cupertino.";
        let mentions = detector.detect(text).unwrap();
        assert!(mentions.iter().any(|m| m.contains("Steve Jobs")));
        assert!(mentions.iter().any(|m| m == "Cupertino"));
        assert!(mentions.iter().all(|m| text.contains(m.as_str())));
    }

    #[test]
    fn model_returns_nothing_for_blank_text() {
        let Some(detector) = model_detector() else {
            eprintln!("Skipping: CDCR_NER_MODEL_DIR not set");
            return;
        };
        assert!(detector.detect("").unwrap().is_empty());
        assert!(detector.detect("  \n ").unwrap().is_empty());
    }
}
