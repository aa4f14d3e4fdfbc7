//! Merge-Dedup Engine
//!
//! Collapses per-image text blocks into one ordered, near-duplicate-free list
//! of lines. Consecutive frames of a scrolling recording overlap heavily, so
//! most lines are seen several times with small recognition differences.
//!
//! **Algorithm:**
//! 1. Flatten blocks in order; trim each line; drop empty lines
//! 2. For each candidate, compute word-set Jaccard similarity against every
//!    accepted line
//! 3. Discard the candidate if the best similarity is strictly above
//!    [`DEDUP_SIMILARITY_THRESHOLD`]; accept it otherwise
//!
//! Quadratic in the number of lines, which stays small (tens of frames).

use crate::models::{MergedText, RecognizedBlock};
use std::collections::HashSet;
use tracing::debug;

/// Lines more similar than this to an accepted line are dropped (exclusive)
pub const DEDUP_SIMILARITY_THRESHOLD: f64 = 0.8;

/// Lowercased whitespace-separated words of `line`
fn token_set(line: &str) -> HashSet<String> {
    line.split_whitespace().map(str::to_lowercase).collect()
}

fn jaccard(a: &HashSet<String>, b: &HashSet<String>) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 1.0;
    }
    let intersection = a.intersection(b).count();
    let union = a.union(b).count();
    intersection as f64 / union as f64
}

/// Word-set Jaccard similarity of two lines, case-insensitive
///
/// Two lines without any words are identical (1.0).
pub fn jaccard_similarity(a: &str, b: &str) -> f64 {
    jaccard(&token_set(a), &token_set(b))
}

/// Trimmed, non-empty lines of all blocks, block order then line order
pub fn normalized_lines(blocks: &[RecognizedBlock]) -> Vec<String> {
    blocks
        .iter()
        .flat_map(|block| block.lines.iter())
        .flat_map(|line| line.lines())
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

/// Merge blocks into deduplicated text
///
/// Deterministic; the first occurrence of a near-duplicate group wins.
pub fn merge_blocks(blocks: &[RecognizedBlock]) -> MergedText {
    let candidates = normalized_lines(blocks);
    let total = candidates.len();

    let mut accepted: Vec<String> = Vec::new();
    let mut accepted_tokens: Vec<HashSet<String>> = Vec::new();

    for line in candidates {
        let tokens = token_set(&line);
        let best = accepted_tokens
            .iter()
            .map(|existing| jaccard(&tokens, existing))
            .fold(0.0_f64, f64::max);

        if best > DEDUP_SIMILARITY_THRESHOLD {
            continue;
        }
        accepted.push(line);
        accepted_tokens.push(tokens);
    }

    debug!(
        blocks = blocks.len(),
        candidate_lines = total,
        merged_lines = accepted.len(),
        "Merged recognized text"
    );
    MergedText::from_lines(accepted)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block(lines: &[&str]) -> RecognizedBlock {
        RecognizedBlock::new(lines.iter().map(|l| l.to_string()).collect())
    }

    #[test]
    fn test_similarity_exactly_at_threshold_is_kept() {
        let a = "I love hiking trails";
        let b = "I love long hiking trails";
        assert!((jaccard_similarity(a, b) - 0.8).abs() < 1e-12);

        let merged = merge_blocks(&[block(&[a]), block(&[b])]);
        assert_eq!(merged.lines(), &[a.to_string(), b.to_string()]);
    }

    #[test]
    fn test_similarity_above_threshold_is_deduped() {
        let merged = merge_blocks(&[
            block(&["Software engineer at a small startup in Austin"]),
            block(&["software Engineer at a small startup in austin"]),
        ]);
        assert_eq!(merged.line_count(), 1);
        assert_eq!(merged.lines()[0], "Software engineer at a small startup in Austin");
    }

    #[test]
    fn test_jaccard_edge_cases() {
        assert_eq!(jaccard_similarity("", "   "), 1.0);
        assert_eq!(jaccard_similarity("hello", ""), 0.0);
        assert_eq!(jaccard_similarity("a b", "b a a"), 1.0);
    }

    #[test]
    fn test_lines_are_trimmed_and_blank_lines_dropped() {
        let merged = merge_blocks(&[block(&["  Alex, 29  ", "", "   "]), block(&["\tBrooklyn\n"])]);
        assert_eq!(merged.text(), "Alex, 29\nBrooklyn");
    }

    #[test]
    fn test_overlapping_frames_collapse_in_order() {
        let frames = [
            block(&["Alex, 29", "Brooklyn, NY", "My simple pleasures"]),
            block(&["Brooklyn, NY", "My simple pleasures", "Coffee and long walks"]),
            block(&["My simple pleasures", "Coffee and long walks", "Dog lover"]),
        ];
        let merged = merge_blocks(&frames);
        assert_eq!(
            merged.text(),
            "Alex, 29\nBrooklyn, NY\nMy simple pleasures\nCoffee and long walks\nDog lover"
        );
    }

    #[test]
    fn test_merge_never_grows_and_is_idempotent() {
        let frames = [
            block(&["one two three", "four five", "one two three"]),
            block(&["FOUR five", "six"]),
            RecognizedBlock::empty(),
        ];
        let total: usize = frames.iter().map(|b| b.lines.len()).sum();
        let merged = merge_blocks(&frames);
        assert!(merged.line_count() <= total);

        let again = merge_blocks(&[RecognizedBlock::new(merged.lines().to_vec())]);
        assert_eq!(again, merged);
        assert_eq!(merge_blocks(&frames), merged);
    }

    #[test]
    fn test_no_blocks_gives_empty_text() {
        let merged = merge_blocks(&[]);
        assert!(merged.is_empty());
        assert_eq!(merged.text(), "");
    }
}
