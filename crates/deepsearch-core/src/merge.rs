//! Hybrid ranking of keyword and vector hits.
//!
//! The merger has no backend or configuration dependencies. The
//! coordinator fetches candidates from both backends and hands them over
//! as [`KeywordHit`]s and [`SemanticHit`]s.
//!
//! # Hybrid Scoring Algorithm
//!
//! 1. Min-max normalize keyword scores to `[0, 1]` (a single hit, or a set
//!    of equal scores, normalizes to `1.0`).
//! 2. Collapse semantic chunk hits to one score per path (MAX).
//! 3. For every path in either set:
//!    `combined = keyword_weight × keyword + semantic_weight × semantic`,
//!    a missing term counting as `0`.
//! 4. Sort by combined (desc), semantic (desc), path (asc).
//! 5. Truncate to `limit`.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use crate::models::{KeywordHit, MatchType, SearchResult, SemanticHit};

/// Weighted merger of keyword and semantic result sets.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HybridMerger {
    pub keyword_weight: f64,
    pub semantic_weight: f64,
}

impl Default for HybridMerger {
    fn default() -> Self {
        Self {
            keyword_weight: 0.5,
            semantic_weight: 0.5,
        }
    }
}

struct Merged<'a> {
    path: &'a str,
    filename: Option<&'a str>,
    keyword: Option<f64>,
    semantic: Option<f64>,
    snippet: Option<&'a str>,
}

impl HybridMerger {
    pub fn new(keyword_weight: f64, semantic_weight: f64) -> Self {
        Self {
            keyword_weight,
            semantic_weight,
        }
    }

    /// Merge both hit sets into one ranked list of at most `limit` results.
    pub fn merge(
        &self,
        keyword_hits: &[KeywordHit],
        semantic_hits: &[SemanticHit],
        limit: usize,
    ) -> Vec<SearchResult> {
        let mut merged: BTreeMap<&str, Merged> = BTreeMap::new();

        for (hit, score) in normalize_scores(keyword_hits) {
            merged.insert(
                hit.path.as_str(),
                Merged {
                    path: &hit.path,
                    filename: Some(&hit.filename),
                    keyword: Some(score),
                    semantic: None,
                    snippet: hit.snippet.as_deref(),
                },
            );
        }

        for hit in best_per_path(semantic_hits) {
            let entry = merged.entry(hit.path.as_str()).or_insert(Merged {
                path: &hit.path,
                filename: None,
                keyword: None,
                semantic: None,
                snippet: None,
            });
            entry.semantic = Some(hit.score);
            if entry.snippet.is_none() {
                entry.snippet = Some(&hit.text_preview);
            }
        }

        let mut results: Vec<SearchResult> = merged
            .into_values()
            .map(|m| {
                let combined = self.keyword_weight * m.keyword.unwrap_or(0.0)
                    + self.semantic_weight * m.semantic.unwrap_or(0.0);
                to_result(m, combined, MatchType::Hybrid)
            })
            .collect();

        rank(&mut results, limit);
        results
    }

    /// Rank keyword hits alone; `combined_score` is the normalized score.
    pub fn keyword_only(&self, keyword_hits: &[KeywordHit], limit: usize) -> Vec<SearchResult> {
        let mut results: Vec<SearchResult> = normalize_scores(keyword_hits)
            .into_iter()
            .map(|(hit, score)| {
                to_result(
                    Merged {
                        path: &hit.path,
                        filename: Some(&hit.filename),
                        keyword: Some(score),
                        semantic: None,
                        snippet: hit.snippet.as_deref(),
                    },
                    score,
                    MatchType::Keyword,
                )
            })
            .collect();
        rank(&mut results, limit);
        results
    }

    /// Rank semantic hits alone, one result per path.
    pub fn semantic_only(&self, semantic_hits: &[SemanticHit], limit: usize) -> Vec<SearchResult> {
        let mut results: Vec<SearchResult> = best_per_path(semantic_hits)
            .into_iter()
            .map(|hit| {
                to_result(
                    Merged {
                        path: &hit.path,
                        filename: None,
                        keyword: None,
                        semantic: Some(hit.score),
                        snippet: Some(&hit.text_preview),
                    },
                    hit.score,
                    MatchType::Semantic,
                )
            })
            .collect();
        rank(&mut results, limit);
        results
    }
}

fn to_result(m: Merged<'_>, combined: f64, search_type: MatchType) -> SearchResult {
    let filename = m
        .filename
        .map(str::to_string)
        .unwrap_or_else(|| filename_of(m.path));
    SearchResult {
        filename,
        path: m.path.to_string(),
        keyword_score: m.keyword,
        semantic_score: m.semantic,
        combined_score: combined,
        search_type,
        snippet: m.snippet.map(str::to_string),
    }
}

fn filename_of(path: &str) -> String {
    Path::new(path)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string())
}

/// Sort by combined desc, semantic desc, path asc; then truncate.
pub fn rank(results: &mut Vec<SearchResult>, limit: usize) {
    results.sort_by(|a, b| {
        b.combined_score
            .partial_cmp(&a.combined_score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(
                b.semantic_score
                    .unwrap_or(0.0)
                    .partial_cmp(&a.semantic_score.unwrap_or(0.0))
                    .unwrap_or(std::cmp::Ordering::Equal),
            )
            .then(a.path.cmp(&b.path))
    });
    results.truncate(limit);
}

/// Keep the highest-scoring chunk hit for each path.
pub fn best_per_path(hits: &[SemanticHit]) -> Vec<&SemanticHit> {
    let mut best: HashMap<&str, &SemanticHit> = HashMap::new();
    for hit in hits {
        best.entry(hit.path.as_str())
            .and_modify(|cur| {
                if hit.score > cur.score {
                    *cur = hit;
                }
            })
            .or_insert(hit);
    }
    best.into_values().collect()
}

/// Min-max normalize raw keyword scores to `[0.0, 1.0]`.
///
/// If all scores are equal (including a single hit), they normalize to `1.0`.
pub fn normalize_scores(hits: &[KeywordHit]) -> Vec<(&KeywordHit, f64)> {
    if hits.is_empty() {
        return Vec::new();
    }

    let s_min = hits.iter().map(|h| h.score).fold(f64::INFINITY, f64::min);
    let s_max = hits
        .iter()
        .map(|h| h.score)
        .fold(f64::NEG_INFINITY, f64::max);

    hits.iter()
        .map(|h| {
            let norm = if (s_max - s_min).abs() < f64::EPSILON {
                1.0
            } else {
                (h.score - s_min) / (s_max - s_min)
            };
            (h, norm)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kw(path: &str, score: f64) -> KeywordHit {
        KeywordHit {
            path: path.to_string(),
            filename: filename_of(path),
            score,
            snippet: None,
        }
    }

    fn sem(path: &str, index: usize, score: f64) -> SemanticHit {
        SemanticHit {
            chunk_id: format!("{}#{}", path, index),
            path: path.to_string(),
            chunk_index: index,
            score,
            text_preview: String::new(),
        }
    }

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_normalize_empty() {
        assert!(normalize_scores(&[]).is_empty());
    }

    #[test]
    fn test_normalize_single() {
        let hits = vec![kw("/a", 5.0)];
        let result = normalize_scores(&hits);
        assert!(approx(result[0].1, 1.0));
    }

    #[test]
    fn test_normalize_range() {
        let hits = vec![kw("/a", 10.0), kw("/b", 5.0), kw("/c", 0.0)];
        let result = normalize_scores(&hits);
        assert!(approx(result[0].1, 1.0));
        assert!(approx(result[1].1, 0.5));
        assert!(approx(result[2].1, 0.0));
    }

    #[test]
    fn test_hybrid_determinism() {
        let keyword = vec![kw("/A", 10.0), kw("/B", 5.0)];
        let semantic = vec![sem("/A", 0, 0.9), sem("/B", 0, 0.4), sem("/C", 0, 0.95)];

        let results = HybridMerger::new(0.5, 0.5).merge(&keyword, &semantic, 10);

        let order: Vec<&str> = results.iter().map(|r| r.path.as_str()).collect();
        assert_eq!(order, vec!["/A", "/C", "/B"]);
        assert!(approx(results[0].combined_score, 0.95));
        assert!(approx(results[1].combined_score, 0.475));
        assert!(approx(results[2].combined_score, 0.2));
        assert_eq!(results[1].keyword_score, None);
        assert_eq!(results[2].keyword_score, Some(0.0));
        assert!(results.iter().all(|r| r.search_type == MatchType::Hybrid));
    }

    #[test]
    fn test_tie_break_semantic_then_path() {
        let keyword = vec![kw("/z", 1.0)];
        let semantic = vec![sem("/b", 0, 1.0), sem("/a", 0, 1.0)];
        let results = HybridMerger::new(0.5, 0.5).merge(&keyword, &semantic, 10);
        let order: Vec<&str> = results.iter().map(|r| r.path.as_str()).collect();
        assert_eq!(order, vec!["/a", "/b", "/z"]);
    }

    #[test]
    fn test_semantic_takes_best_chunk() {
        let semantic = vec![sem("/a", 0, 0.3), sem("/a", 1, 0.8), sem("/b", 0, 0.5)];
        let results = HybridMerger::default().semantic_only(&semantic, 10);
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].path, "/a");
        assert_eq!(results[0].semantic_score, Some(0.8));
        assert_eq!(results[0].filename, "a");
    }

    #[test]
    fn test_limit_truncates() {
        let keyword: Vec<KeywordHit> = (0..10).map(|i| kw(&format!("/f{}", i), i as f64)).collect();
        let results = HybridMerger::default().keyword_only(&keyword, 3);
        assert_eq!(results.len(), 3);
        assert_eq!(results[0].path, "/f9");
        assert!(results.iter().all(|r| r.search_type == MatchType::Keyword));
    }

    #[test]
    fn test_weights_shift_ranking() {
        let keyword = vec![kw("/k", 10.0), kw("/s", 0.0)];
        let semantic = vec![sem("/k", 0, 0.1), sem("/s", 0, 0.9)];
        let kw_heavy = HybridMerger::new(0.9, 0.1).merge(&keyword, &semantic, 2);
        let sem_heavy = HybridMerger::new(0.1, 0.9).merge(&keyword, &semantic, 2);
        assert_eq!(kw_heavy[0].path, "/k");
        assert_eq!(sem_heavy[0].path, "/s");
    }
}
