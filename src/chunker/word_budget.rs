//! Word-budget chunker (§4.6.1): the fallback strategy for any document that
//! isn't markdown. Walks the text word by word, preferring to cut at a
//! sentence boundary near the end of the target window, hard-cutting only
//! when no boundary is found by `max_words`.

use super::{BoundaryType, Chunk};
use regex::Regex;
use std::sync::OnceLock;

fn sentence_boundary_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[.!?]\s+").unwrap())
}

#[derive(Debug, Clone, Copy)]
pub struct WordBudgetParams {
    pub target_words: usize,
    pub min_words: usize,
    pub max_words: usize,
    pub overlap_words: usize,
}

impl Default for WordBudgetParams {
    fn default() -> Self {
        Self { target_words: 400, min_words: 100, max_words: 600, overlap_words: 50 }
    }
}

struct Word {
    /// Byte offset in the original text where this word starts.
    start: usize,
    /// Byte offset just past this word (exclusive of trailing whitespace).
    end: usize,
}

fn tokenize(text: &str) -> Vec<Word> {
    let mut words = Vec::new();
    let mut chars = text.char_indices().peekable();
    while let Some(&(start, c)) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
            continue;
        }
        let mut end = start;
        while let Some(&(idx, c)) = chars.peek() {
            if c.is_whitespace() {
                break;
            }
            end = idx + c.len_utf8();
            chars.next();
        }
        words.push(Word { start, end });
    }
    words
}

/// Split `text` into chunks per §4.6.1. Chunk numbers start at 1.
pub fn chunk_word_budget(text: &str, params: WordBudgetParams) -> Vec<Chunk> {
    let words = tokenize(text);
    if words.is_empty() {
        return Vec::new();
    }

    let mut chunks = Vec::new();
    let mut window_start = 0usize;
    let mut chunk_number = 1u32;

    while window_start < words.len() {
        let (end_idx, boundary_type) = find_chunk_end(text, &words, window_start, params);
        let start_position = words[window_start].start;
        let end_position = words[end_idx].end;
        let chunk_text = text[start_position..end_position].to_string();
        let word_count = end_idx - window_start + 1;

        let is_last = end_idx + 1 >= words.len();
        let boundary_type = if is_last { BoundaryType::EndOfDocument } else { boundary_type };

        chunks.push(Chunk {
            text: chunk_text,
            chunk_number,
            word_count,
            boundary_type,
            start_position,
            end_position,
            nodes: Vec::new(),
        });
        chunk_number += 1;

        if is_last {
            break;
        }

        window_start = if end_idx + 1 > params.overlap_words {
            (end_idx + 1).saturating_sub(params.overlap_words)
        } else {
            end_idx + 1
        };
    }

    chunks
}

/// Returns the index (into `words`) of the last word of this chunk, plus
/// whether the cut landed on a sentence boundary or was forced.
fn find_chunk_end(text: &str, words: &[Word], window_start: usize, params: WordBudgetParams) -> (usize, BoundaryType) {
    let target_idx = (window_start + params.target_words.max(1) - 1).min(words.len() - 1);
    let max_idx = (window_start + params.max_words.max(1) - 1).min(words.len() - 1);

    if target_idx >= words.len() - 1 {
        return (words.len() - 1, BoundaryType::Semantic);
    }

    // Search the last 20% of [window_start..=max_idx] for a sentence
    // boundary, preferring the earliest (shortest chunk satisfying target).
    let window_span = max_idx.saturating_sub(window_start).max(1);
    let search_start = max_idx.saturating_sub(window_span / 5).max(target_idx.min(max_idx));

    let re = sentence_boundary_regex();
    for idx in search_start..=max_idx {
        let word_start = words[idx].start;
        let word_end = words[idx].end;
        let lookahead_end = words.get(idx + 1).map(|w| w.start).unwrap_or(word_end).min(text.len());
        // `[.!?]\s+` anchored at the word's final byte: a punctuation mark
        // immediately followed by whitespace up to the next word.
        let probe = &text[word_end.saturating_sub(1).max(word_start)..lookahead_end];
        if re.is_match(probe) {
            return (idx, BoundaryType::Semantic);
        }
    }

    (max_idx, BoundaryType::HardCut)
}
