//! Probabilistic categorizer (L5, §4.5.1): cosine similarity against each
//! VocabCategory's mean member embedding, softmax-normalized to a
//! probability distribution over categories.

use crate::ai::cosine_similarity;
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq)]
pub struct CategoryAssignment {
    pub category: String,
    pub confidence: f32,
    pub scores: HashMap<String, f32>,
    /// True iff the top two scores are closer than 0.10 apart (§4.5.1).
    pub ambiguous: bool,
}

const AMBIGUITY_GAP: f32 = 0.10;

/// `None` when there are no category embeddings to compare against (e.g.
/// the vocabulary graph is empty); the caller falls back to `category_source
/// = "builtin"` with no computed assignment.
pub fn categorize(embedding: &[f32], category_embeddings: &HashMap<String, Vec<f32>>) -> Option<CategoryAssignment> {
    if category_embeddings.is_empty() {
        return None;
    }

    let similarities: Vec<(String, f32)> = category_embeddings
        .iter()
        .map(|(category, mean_embedding)| (category.clone(), cosine_similarity(embedding, mean_embedding)))
        .collect();

    let max_similarity = similarities.iter().map(|(_, s)| *s).fold(f32::NEG_INFINITY, f32::max);
    let exp_values: Vec<f32> = similarities.iter().map(|(_, s)| (s - max_similarity).exp()).collect();
    let sum: f32 = exp_values.iter().sum();

    let scores: HashMap<String, f32> = similarities
        .iter()
        .zip(exp_values.iter())
        .map(|((category, _), exp)| (category.clone(), if sum > 0.0 { exp / sum } else { 0.0 }))
        .collect();

    let mut ranked: Vec<(&String, &f32)> = scores.iter().collect();
    ranked.sort_by(|a, b| b.1.partial_cmp(a.1).unwrap_or(std::cmp::Ordering::Equal));

    let (best_category, best_score) = (ranked[0].0.clone(), *ranked[0].1);
    let second_best = ranked.get(1).map(|(_, s)| **s).unwrap_or(0.0);
    let ambiguous = (best_score - second_best) < AMBIGUITY_GAP;

    Some(CategoryAssignment { category: best_category, confidence: best_score, scores, ambiguous })
}
