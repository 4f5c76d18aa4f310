//! Brute-force descriptor matching with a nearest/second-nearest ratio test.
//!
//! Search is exact, so a comparison is a pure function of its two inputs and
//! the ratio threshold. Parallel and sequential runs return identical results
//! in query order.

use rayon::prelude::*;
use snout_core::{DescriptorSet, GoodMatch, MatchCandidate, MatchResult};
use std::time::Instant;

/// Lowe's ratio threshold used when none is configured
pub const DEFAULT_RATIO: f32 = 0.7;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum MatchError {
    #[error("Descriptor length mismatch: query set has {query} columns, train set has {train}")]
    DescriptorLengthMismatch { query: usize, train: usize },
    #[error("Invalid ratio threshold {0}: must be in (0, 1]")]
    InvalidRatio(f32),
}

pub type MatcherResult<T> = Result<T, MatchError>;

/// Euclidean distance between two equal-length descriptors
#[inline]
pub fn euclidean_distance(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b)
        .map(|(x, y)| {
            let d = x - y;
            d * d
        })
        .sum::<f32>()
        .sqrt()
}

/// Keep the `k` lowest-distance candidates from `train` for one query row.
///
/// Insertion is strict, so among equal distances the lower train index ranks
/// first.
fn nearest_k(query_index: usize, row: &[f32], train: &DescriptorSet, k: usize) -> Vec<MatchCandidate> {
    let mut best: Vec<MatchCandidate> = Vec::with_capacity(k + 1);
    for (train_index, t) in train.iter().enumerate() {
        let distance = euclidean_distance(row, t);
        if best.len() == k && distance >= best[k - 1].distance {
            continue;
        }
        let pos = best.iter().position(|c| distance < c.distance).unwrap_or(best.len());
        best.insert(pos, MatchCandidate::new(query_index, train_index, distance));
        best.truncate(k);
    }
    best
}

/// Accept `knn[0]` iff it is clearly closer than `knn[1]`
#[inline]
fn passes_ratio_test(knn: &[MatchCandidate], ratio: f32) -> Option<GoodMatch> {
    match knn {
        [best, second, ..] if best.distance < ratio * second.distance => Some(*best),
        _ => None,
    }
}

/// Exact two-nearest-neighbour matcher with a ratio test
#[derive(Debug, Clone, Copy)]
pub struct RatioMatcher {
    ratio: f32,
    parallel: bool,
}

impl Default for RatioMatcher {
    fn default() -> Self {
        Self {
            ratio: DEFAULT_RATIO,
            parallel: true,
        }
    }
}

impl RatioMatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Matcher with a custom ratio threshold, validated
    pub fn with_ratio(ratio: f32) -> MatcherResult<Self> {
        if !(ratio.is_finite() && ratio > 0.0 && ratio <= 1.0) {
            return Err(MatchError::InvalidRatio(ratio));
        }
        Ok(Self {
            ratio,
            ..Self::default()
        })
    }

    /// Toggle the per-query rayon fan-out
    pub fn parallel(mut self, enable: bool) -> Self {
        self.parallel = enable;
        self
    }

    pub fn ratio(&self) -> f32 {
        self.ratio
    }

    /// The `k` nearest train descriptors for every query descriptor, closest first.
    ///
    /// Rows hold fewer than `k` entries only when `train` is smaller than `k`.
    pub fn knn_match(&self, query: &DescriptorSet, train: &DescriptorSet, k: usize) -> MatcherResult<Vec<Vec<MatchCandidate>>> {
        if query.is_empty() || train.is_empty() || k == 0 {
            return Ok(vec![Vec::new(); query.len()]);
        }
        Self::check_shapes(query, train)?;

        let knn = if self.parallel {
            query
                .rows()
                .par_iter()
                .enumerate()
                .map(|(qi, row)| nearest_k(qi, row, train, k))
                .collect()
        } else {
            query
                .iter()
                .enumerate()
                .map(|(qi, row)| nearest_k(qi, row, train, k))
                .collect()
        };
        Ok(knn)
    }

    /// Compare a query set against a train set.
    ///
    /// Either side empty gives the zero-match result. Differing descriptor
    /// lengths are an error. Matches come out in ascending query index.
    pub fn compare(&self, query: &DescriptorSet, train: &DescriptorSet) -> MatcherResult<MatchResult> {
        if query.is_empty() || train.is_empty() {
            log::debug!("compare short-circuited: {} query, {} train descriptors", query.len(), train.len());
            return Ok(MatchResult::empty());
        }
        Self::check_shapes(query, train)?;

        let t0 = Instant::now();
        let ratio = self.ratio;
        let matches: Vec<GoodMatch> = if self.parallel {
            query
                .rows()
                .par_iter()
                .enumerate()
                .filter_map(|(qi, row)| passes_ratio_test(&nearest_k(qi, row, train, 2), ratio))
                .collect()
        } else {
            query
                .iter()
                .enumerate()
                .filter_map(|(qi, row)| passes_ratio_test(&nearest_k(qi, row, train, 2), ratio))
                .collect()
        };

        log::debug!(
            "{} of {} query descriptors passed ratio {} against {} train descriptors in {:.2?}",
            matches.len(),
            query.len(),
            ratio,
            train.len(),
            t0.elapsed()
        );
        Ok(MatchResult::from_matches(matches))
    }

    fn check_shapes(query: &DescriptorSet, train: &DescriptorSet) -> MatcherResult<()> {
        if query.cols() != train.cols() {
            return Err(MatchError::DescriptorLengthMismatch {
                query: query.cols(),
                train: train.cols(),
            });
        }
        Ok(())
    }
}

/// Keep the best candidate of each k-NN row that passes the ratio test.
///
/// Rows with fewer than two candidates never pass.
pub fn filter_matches_by_ratio_test(knn: &[Vec<MatchCandidate>], ratio: f32) -> Vec<GoodMatch> {
    knn.iter().filter_map(|row| passes_ratio_test(row, ratio)).collect()
}

/// Compare with the default matcher
pub fn compare(query: &DescriptorSet, train: &DescriptorSet) -> MatcherResult<MatchResult> {
    RatioMatcher::default().compare(query, train)
}
