//! Chunker (L6, SPEC_FULL §4.6): splits ingestion input into ordered,
//! numbered chunks. Markdown documents go through the AST strategy
//! (`markdown.rs`), everything else through the word-budget fallback
//! (`word_budget.rs`).
//!
//! Grounded in the teacher's `analysis::analyzers::markdown::MarkdownStructureAnalyzer`
//! (examples/nrgforge-plexus/src/analysis/analyzers/markdown.rs) for the
//! pulldown_cmark event-loop shape, retargeted from structural graph nodes
//! to chunk boundaries.

mod code_filter;
mod markdown;
mod word_budget;

use std::sync::Arc;

use crate::ai::Extractor;

pub use markdown::chunk_markdown;
pub use word_budget::{chunk_word_budget, WordBudgetParams};

/// How a chunk's end was decided (§4.6.1/§4.6.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoundaryType {
    /// Cut at a detected sentence boundary, or a markdown section/heading edge.
    Semantic,
    /// No boundary found before the word budget was exhausted; cut anyway.
    HardCut,
    /// The final chunk of the document.
    EndOfDocument,
}

impl BoundaryType {
    pub fn as_str(&self) -> &'static str {
        match self {
            BoundaryType::Semantic => "semantic",
            BoundaryType::HardCut => "hard_cut",
            BoundaryType::EndOfDocument => "end_of_document",
        }
    }
}

/// An AST node retained for provenance on a markdown-derived chunk.
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkNode {
    pub kind: String,
    pub start: usize,
    pub end: usize,
}

/// One emitted chunk (§4.6, output shape).
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    pub text: String,
    pub chunk_number: u32,
    pub word_count: usize,
    pub boundary_type: BoundaryType,
    pub start_position: usize,
    pub end_position: usize,
    pub nodes: Vec<ChunkNode>,
}

/// Parameters governing both chunking strategies (§4.6).
#[derive(Debug, Clone)]
pub struct ChunkerConfig {
    pub word_budget: WordBudgetParams,
    /// Minimum line count for a code block to be dispatched for translation
    /// rather than kept verbatim (§4.6.2 step 3).
    pub code_translation_min_lines: usize,
    /// Bounded-parallel worker pool size for code translation (default 3).
    pub max_workers: usize,
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self {
            word_budget: WordBudgetParams::default(),
            code_translation_min_lines: 5,
            max_workers: 3,
        }
    }
}

/// Choose a strategy by file extension and chunk `text` (§4.6: "the choice
/// is by file extension, `.md` -> markdown AST, otherwise -> plain
/// word-budget").
pub async fn chunk_document(
    filename: &str,
    text: &str,
    config: &ChunkerConfig,
    extractor: Option<Arc<dyn Extractor>>,
) -> Vec<Chunk> {
    if filename.to_lowercase().ends_with(".md") {
        chunk_markdown(text, config, extractor).await
    } else {
        chunk_word_budget(text, config.word_budget)
    }
}
