//! Word splitting, prompt tensors and span decoding for GLiNER span models.
//!
//! The model reads one sequence per text:
//!
//! ```text
//! [CLS] <<ENT>> label1 <<ENT>> label2 ... <<SEP>> word1 word2 ... [SEP]
//! ```
//!
//! and scores every candidate span of up to `max_width` words against every
//! label. Everything here is independent of ONNX Runtime so it can be tested
//! without a model.

use std::ops::Range;

use ndarray::{Array2, Array3, ArrayD};
use once_cell::sync::Lazy;
use regex::Regex;

const START_TOKEN_ID: i64 = 1; // [CLS]
const END_TOKEN_ID: i64 = 2; // [SEP]
const ENTITY_TOKEN_ID: i64 = 128002; // <<ENT>>
const SEP_TOKEN_ID: i64 = 128003; // <<SEP>>

/// Words as the GLiNER training data splits them.
static WORD: Lazy<Regex> = Lazy::new(|| Regex::new(r"\w+(?:[-_]\w+)*|\S").unwrap());

/// A word of the input, as a byte range into the text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Word {
    pub start: usize,
    pub end: usize,
}

pub fn split_words(text: &str) -> Vec<Word> {
    WORD.find_iter(text)
        .map(|m| Word {
            start: m.start(),
            end: m.end(),
        })
        .collect()
}

/// Cut `words` into windows of at most `max_words`. A window prefers to end
/// on a sentence mark in its second half so sentences stay whole.
pub fn chunk_ranges(text: &str, words: &[Word], max_words: usize) -> Vec<Range<usize>> {
    let max_words = max_words.max(1);
    let mut ranges = Vec::new();
    let mut start = 0;
    while start < words.len() {
        let hard_end = (start + max_words).min(words.len());
        let mut end = hard_end;
        if hard_end < words.len() {
            let sentence_end = (start + max_words / 2..hard_end)
                .rev()
                .find(|&i| matches!(&text[words[i].start..words[i].end], "." | "!" | "?"));
            if let Some(cut) = sentence_end {
                end = cut + 1;
            }
        }
        ranges.push(start..end);
        start = end;
    }
    ranges
}

/// Model inputs for a single text.
#[derive(Debug, Clone)]
pub struct Prompt {
    pub input_ids: Array2<i64>,
    pub attention_mask: Array2<i64>,
    pub words_mask: Array2<i64>,
    pub text_lengths: Array2<i64>,
}

/// Lay out label and word token ids as one prompt sequence. Only the first
/// sub-token of each word carries its 1-based word index in `words_mask`.
pub fn encode_prompt(label_tokens: &[Vec<u32>], word_tokens: &[Vec<u32>]) -> Prompt {
    let label_len: usize = label_tokens.iter().map(|ids| ids.len() + 1).sum::<usize>() + 1;
    let text_len: usize = word_tokens.iter().map(Vec::len).sum();
    let seq_len = 1 + label_len + text_len + 1;

    let mut input_ids = Array2::<i64>::zeros((1, seq_len));
    let mut attention_mask = Array2::<i64>::zeros((1, seq_len));
    let mut words_mask = Array2::<i64>::zeros((1, seq_len));

    let mut idx = 0;
    let mut push = |id: i64, input_ids: &mut Array2<i64>| {
        input_ids[[0, idx]] = id;
        attention_mask[[0, idx]] = 1;
        idx += 1;
        idx - 1
    };

    push(START_TOKEN_ID, &mut input_ids);
    for label in label_tokens {
        push(ENTITY_TOKEN_ID, &mut input_ids);
        for &id in label {
            push(i64::from(id), &mut input_ids);
        }
    }
    push(SEP_TOKEN_ID, &mut input_ids);

    for (word_idx, ids) in word_tokens.iter().enumerate() {
        for (sub, &id) in ids.iter().enumerate() {
            let pos = push(i64::from(id), &mut input_ids);
            if sub == 0 {
                words_mask[[0, pos]] = word_idx as i64 + 1;
            }
        }
    }
    push(END_TOKEN_ID, &mut input_ids);

    Prompt {
        input_ids,
        attention_mask,
        words_mask,
        text_lengths: Array2::from_elem((1, 1), word_tokens.len() as i64),
    }
}

/// Candidate spans `(start, end)` in word indices, `max_width` slots per
/// start word. Slots past the end of the text stay masked out.
pub fn span_tensors(num_words: usize, max_width: usize) -> (Array3<i64>, Array2<bool>) {
    let num_spans = num_words * max_width;
    let mut span_idx = Array3::<i64>::zeros((1, num_spans, 2));
    let mut span_mask = Array2::from_elem((1, num_spans), false);

    for start in 0..num_words {
        for width in 0..max_width.min(num_words - start) {
            let slot = start * max_width + width;
            span_idx[[0, slot, 0]] = start as i64;
            span_idx[[0, slot, 1]] = (start + width) as i64;
            span_mask[[0, slot]] = true;
        }
    }
    (span_idx, span_mask)
}

/// A span the model scored above the cut-off, in word indices (inclusive).
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredSpan {
    pub start: usize,
    pub end: usize,
    pub label: usize,
    pub score: f32,
}

impl ScoredSpan {
    fn overlaps(&self, other: &ScoredSpan) -> bool {
        self.start <= other.end && other.start <= self.end
    }
}

fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

/// Read span scores out of the model logits.
///
/// Exports differ in layout: `[batch, words, width, labels]` or the
/// flattened `[batch, words * width, labels]`. Anything else yields no spans.
pub fn decode_logits(
    logits: &ArrayD<f32>,
    num_words: usize,
    num_labels: usize,
    max_width: usize,
    min_score: f32,
) -> Vec<ScoredSpan> {
    let shape = logits.shape().to_vec();
    let mut spans = Vec::new();
    let mut consider = |start: usize, width: usize, label: usize, logit: f32| {
        let end = start + width;
        let score = sigmoid(logit);
        if end < num_words && score >= min_score {
            spans.push(ScoredSpan {
                start,
                end,
                label,
                score,
            });
        }
    };

    match shape.as_slice() {
        [_, words, widths, labels] => {
            for start in 0..(*words).min(num_words) {
                for width in 0..*widths {
                    for label in 0..(*labels).min(num_labels) {
                        consider(start, width, label, logits[[0, start, width, label]]);
                    }
                }
            }
        }
        [_, slots, labels] if max_width > 0 => {
            for slot in 0..*slots {
                for label in 0..(*labels).min(num_labels) {
                    consider(
                        slot / max_width,
                        slot % max_width,
                        label,
                        logits[[0, slot, label]],
                    );
                }
            }
        }
        other => tracing::warn!(shape = ?other, "unexpected entity model output shape"),
    }
    spans
}

/// Keep the best-scoring spans that do not overlap each other, in text order.
pub fn flat_spans(mut spans: Vec<ScoredSpan>) -> Vec<ScoredSpan> {
    spans.sort_by(|a, b| b.score.total_cmp(&a.score));
    let mut kept: Vec<ScoredSpan> = Vec::with_capacity(spans.len());
    for span in spans {
        if !kept.iter().any(|k| k.overlaps(&span)) {
            kept.push(span);
        }
    }
    kept.sort_by_key(|s| s.start);
    kept
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::IxDyn;

    fn texts<'a>(text: &'a str, words: &[Word]) -> Vec<&'a str> {
        words.iter().map(|w| &text[w.start..w.end]).collect()
    }

    #[test]
    fn words_split_off_punctuation() {
        let text = "Apple Inc. hired\nSteve Jobs, co-founder.";
        let words = split_words(text);
        assert_eq!(
            texts(text, &words),
            vec!["Apple", "Inc", ".", "hired", "Steve", "Jobs", ",", "co-founder", "."]
        );
        assert_eq!(words[4], Word { start: 17, end: 22 });
    }

    #[test]
    fn empty_text_has_no_words() {
        assert!(split_words("").is_empty());
        assert!(split_words(" \n\t ").is_empty());
    }

    #[test]
    fn chunks_cover_every_word_once() {
        let text = "one two three four five six seven";
        let words = split_words(text);
        let ranges = chunk_ranges(text, &words, 3);
        assert_eq!(ranges, vec![0..3, 3..6, 6..7]);
    }

    #[test]
    fn chunks_prefer_sentence_ends() {
        let text = "Ann met Bob . Then Carl left early today";
        let words = split_words(text);
        let ranges = chunk_ranges(text, &words, 6);
        assert_eq!(ranges[0], 0..4);
        assert_eq!(ranges[1].start, 4);
        assert_eq!(ranges.last().map(|r| r.end), Some(words.len()));
    }

    #[test]
    fn prompt_layout() {
        let labels = vec![vec![10], vec![11, 12]];
        let words = vec![vec![20, 21], vec![22]];
        let prompt = encode_prompt(&labels, &words);

        let ids: Vec<i64> = prompt.input_ids.iter().copied().collect();
        assert_eq!(
            ids,
            vec![1, 128002, 10, 128002, 11, 12, 128003, 20, 21, 22, 2]
        );
        let mask: Vec<i64> = prompt.words_mask.iter().copied().collect();
        assert_eq!(mask, vec![0, 0, 0, 0, 0, 0, 0, 1, 0, 2, 0]);
        assert!(prompt.attention_mask.iter().all(|&m| m == 1));
        assert_eq!(prompt.text_lengths[[0, 0]], 2);
    }

    #[test]
    fn span_slots_stop_at_text_end() {
        let (idx, mask) = span_tensors(3, 2);
        assert_eq!(idx.shape(), &[1, 6, 2]);
        assert_eq!((idx[[0, 3, 0]], idx[[0, 3, 1]]), (1, 2));
        let valid: Vec<bool> = mask.iter().copied().collect();
        assert_eq!(valid, vec![true, true, true, true, true, false]);
    }

    #[test]
    fn decodes_four_dimensional_logits() {
        // 3 words, width 2, 1 label. Span (1..=2) scores high.
        let mut logits = ArrayD::<f32>::from_elem(IxDyn(&[1, 3, 2, 1]), -8.0);
        logits[[0, 1, 1, 0]] = 4.0;
        // Width past the end of the text is ignored even if scored.
        logits[[0, 2, 1, 0]] = 9.0;
        let spans = decode_logits(&logits, 3, 1, 2, 0.5);
        assert_eq!(spans.len(), 1);
        assert_eq!((spans[0].start, spans[0].end), (1, 2));
        assert!(spans[0].score > 0.98);
    }

    #[test]
    fn decodes_flattened_logits() {
        let mut logits = ArrayD::<f32>::from_elem(IxDyn(&[1, 6, 2]), -8.0);
        // slot 4 = start 2, width 0; label 1
        logits[[0, 4, 1]] = 3.0;
        let spans = decode_logits(&logits, 3, 2, 2, 0.5);
        assert_eq!(
            spans,
            vec![ScoredSpan {
                start: 2,
                end: 2,
                label: 1,
                score: sigmoid(3.0)
            }]
        );
    }

    #[test]
    fn unexpected_shape_yields_nothing() {
        let logits = ArrayD::<f32>::from_elem(IxDyn(&[4]), 5.0);
        assert!(decode_logits(&logits, 4, 1, 2, 0.5).is_empty());
    }

    #[test]
    fn overlapping_spans_keep_best_score() {
        let span = |start, end, score| ScoredSpan {
            start,
            end,
            label: 0,
            score,
        };
        let kept = flat_spans(vec![
            span(4, 5, 0.7),
            span(0, 2, 0.9),
            span(1, 1, 0.95),
            span(5, 6, 0.6),
        ]);
        assert_eq!(kept, vec![span(1, 1, 0.95), span(4, 5, 0.7)]);
    }

    #[test]
    fn sigmoid_midpoint() {
        assert!((sigmoid(0.0) - 0.5).abs() < 1e-6);
        assert!(sigmoid(-20.0) < 1e-6);
    }
}
