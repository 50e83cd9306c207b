//! The Scorer (spec.md §4.4): combines vector similarity, lexical score,
//! rerank score, recency boost, importance boost and time-decay penalty
//! into a single ranked order. Every function here is pure and
//! non-suspending, per spec.md §5 ("scoring arithmetic... must be pure") —
//! this is what makes the exact formulas in spec.md §8 unit-testable
//! without a runtime.

use memoria_core::ScoringConfig;

/// One candidate's raw signals, gathered by the Retriever before scoring.
#[derive(Debug, Clone, Copy)]
pub struct ScoreInputs {
    /// `1 - cosine distance`, already in `[0, 1]`.
    pub vector_score: f32,
    /// Raw BM25-flavoured score, `[0, inf)`. `0.0` if this candidate had no
    /// lexical hit.
    pub bm25_score: f32,
    /// Provider-scale rerank score, if a rerank pass ran and returned a
    /// score for this candidate.
    pub rerank_score: Option<f32>,
    pub importance: f32,
    pub created_at: i64,
    pub updated_at: i64,
    pub last_accessed_at: i64,
}

#[derive(Debug, Clone, Copy)]
pub struct ScoreBreakdown {
    pub final_score: f32,
    pub base: f32,
    pub recency_boost: f32,
    pub importance_boost: f32,
    pub time_penalty: f32,
}

/// Rescales BM25 scores in a result set into `[0, 1]` by dividing by the
/// maximum observed score. A set with no lexical scores at all (max == 0)
/// maps every score to `0.0`.
pub fn normalize_bm25(scores: &[f32]) -> Vec<f32> {
    let max = scores.iter().copied().fold(0.0_f32, f32::max);
    if max <= 0.0 {
        return vec![0.0; scores.len()];
    }
    scores.iter().map(|s| s / max).collect()
}

/// Linearly rescales rerank scores to `[0, 1]` by `(s - min) / (max -
/// min)`. If every score in the batch is equal, the raw scores pass
/// through unchanged (there is no meaningful spread to normalize).
pub fn normalize_rerank(scores: &[f32]) -> Vec<f32> {
    if scores.is_empty() {
        return Vec::new();
    }
    let min = scores.iter().copied().fold(f32::INFINITY, f32::min);
    let max = scores.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    if (max - min).abs() < f32::EPSILON {
        return scores.to_vec();
    }
    scores.iter().map(|s| (s - min) / (max - min)).collect()
}

/// Effective `(w_v, w_b, w_r)` weights for a batch. When no candidate
/// carries a rerank score, `w_r` collapses to zero and `w_v, w_b` are
/// renormalized to preserve their original sum (or split `0.5/0.5` if both
/// were zero), per spec.md §4.4.
pub fn effective_weights(cfg: &ScoringConfig, any_rerank_scores: bool) -> (f32, f32, f32) {
    if any_rerank_scores {
        return (cfg.vector_weight, cfg.bm25_weight, cfg.reranker_weight);
    }
    let vb_sum = cfg.vector_weight + cfg.bm25_weight;
    if vb_sum <= 0.0 {
        return (0.5, 0.5, 0.0);
    }
    (cfg.vector_weight, cfg.bm25_weight, 0.0)
}

/// Linear decay to zero over `recency_boost_days`; `0` once the age
/// reaches or exceeds that horizon.
pub fn recency_boost(age_days: f64, cfg: &ScoringConfig) -> f32 {
    if cfg.recency_boost_days <= 0.0 || age_days >= f64::from(cfg.recency_boost_days) {
        return 0.0;
    }
    let fraction = 1.0 - age_days / f64::from(cfg.recency_boost_days);
    cfg.recency_boost_factor * fraction as f32
}

/// Exponential approach to `time_penalty_factor` once age exceeds
/// `time_penalty_days`; `0` before that horizon.
pub fn time_penalty(age_days: f64, cfg: &ScoringConfig) -> f32 {
    if age_days <= f64::from(cfg.time_penalty_days) {
        return 0.0;
    }
    let over = age_days - f64::from(cfg.time_penalty_days);
    let decayed = cfg.time_penalty_factor * (1.0 - (-over / 90.0).exp() as f32);
    decayed.min(cfg.time_penalty_factor)
}

/// Computes the full score for one candidate given its already-normalized
/// `vector_score`/`bm25_score_normalized`/`rerank_score_normalized` and the
/// effective weights for the batch. `now_ms` is threaded in rather than
/// read from the clock so this stays pure.
#[allow(clippy::too_many_arguments)]
pub fn score_candidate(
    inputs: &ScoreInputs,
    bm25_normalized: f32,
    rerank_normalized: Option<f32>,
    weights: (f32, f32, f32),
    cfg: &ScoringConfig,
    now_ms: i64,
) -> ScoreBreakdown {
    let (w_v, w_b, w_r) = weights;
    let base = w_v * inputs.vector_score
        + w_b * bm25_normalized
        + w_r * rerank_normalized.unwrap_or(0.0);

    let recency_ts = if inputs.last_accessed_at > 0 {
        inputs.last_accessed_at
    } else {
        inputs.updated_at
    };
    let recency_age = memoria_core::age_days(recency_ts, now_ms);
    let rboost = recency_boost(recency_age, cfg);

    let importance_boost = inputs.importance * cfg.importance_weight;

    let created_age = memoria_core::age_days(inputs.created_at, now_ms);
    let penalty = time_penalty(created_age, cfg);

    let combined = base + rboost + importance_boost;
    let final_score = (combined * (1.0 - penalty)).clamp(0.0, 1.0);

    ScoreBreakdown {
        final_score,
        base,
        recency_boost: rboost,
        importance_boost,
        time_penalty: penalty,
    }
}

/// Ordering key for the final ranked list: descending `final`, ties broken
/// by descending `importance`, then ascending `id`.
pub fn ranking_key(final_score: f32, importance: f32, id: &str) -> (std::cmp::Reverse<i64>, std::cmp::Reverse<i64>, String) {
    // f32 -> fixed-point i64 so total ordering is trivial and stable
    // (NaN never occurs here: every input is clamped upstream).
    let score_fixed = (final_score * 1_000_000.0).round() as i64;
    let importance_fixed = (importance * 1_000_000.0).round() as i64;
    (
        std::cmp::Reverse(score_fixed),
        std::cmp::Reverse(importance_fixed),
        id.to_string(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> ScoringConfig {
        ScoringConfig {
            vector_weight: 0.55,
            bm25_weight: 0.25,
            reranker_weight: 0.20,
            recency_boost_days: 14.0,
            recency_boost_factor: 0.12,
            importance_weight: 0.10,
            time_penalty_days: 180.0,
            time_penalty_factor: 0.25,
        }
    }

    #[test]
    fn normalize_bm25_divides_by_max() {
        let out = normalize_bm25(&[1.0, 2.0, 4.0]);
        assert_eq!(out, vec![0.25, 0.5, 1.0]);
    }

    #[test]
    fn normalize_bm25_all_zero_maps_to_zero() {
        assert_eq!(normalize_bm25(&[0.0, 0.0]), vec![0.0, 0.0]);
    }

    #[test]
    fn normalize_rerank_rescales_min_max() {
        let out = normalize_rerank(&[0.0, 5.0, 10.0]);
        assert_eq!(out, vec![0.0, 0.5, 1.0]);
    }

    #[test]
    fn normalize_rerank_passes_through_when_all_equal() {
        let out = normalize_rerank(&[3.0, 3.0, 3.0]);
        assert_eq!(out, vec![3.0, 3.0, 3.0]);
    }

    #[test]
    fn effective_weights_zero_rerank_renormalizes_vb() {
        let (v, b, r) = effective_weights(&cfg(), false);
        assert_eq!(r, 0.0);
        assert!((v - 0.55).abs() < 1e-6);
        assert!((b - 0.25).abs() < 1e-6);
    }

    #[test]
    fn effective_weights_both_zero_splits_evenly() {
        let mut c = cfg();
        c.vector_weight = 0.0;
        c.bm25_weight = 0.0;
        let (v, b, r) = effective_weights(&c, false);
        assert_eq!((v, b, r), (0.5, 0.5, 0.0));
    }

    #[test]
    fn recency_boost_decays_linearly_to_zero() {
        let c = cfg();
        assert!((recency_boost(0.0, &c) - c.recency_boost_factor).abs() < 1e-6);
        assert_eq!(recency_boost(14.0, &c), 0.0);
        assert_eq!(recency_boost(100.0, &c), 0.0);
        let mid = recency_boost(7.0, &c);
        assert!(mid > 0.0 && mid < c.recency_boost_factor);
    }

    #[test]
    fn time_penalty_is_zero_before_horizon() {
        let c = cfg();
        assert_eq!(time_penalty(0.0, &c), 0.0);
        assert_eq!(time_penalty(180.0, &c), 0.0);
    }

    #[test]
    fn time_penalty_approaches_but_never_exceeds_factor() {
        let c = cfg();
        let far = time_penalty(180.0 + 900.0, &c);
        assert!(far <= c.time_penalty_factor);
        assert!(far > c.time_penalty_factor * 0.9);
    }

    #[test]
    fn final_score_stays_within_unit_interval() {
        let c = cfg();
        let inputs = ScoreInputs {
            vector_score: 1.0,
            bm25_score: 0.0,
            rerank_score: None,
            importance: 1.0,
            created_at: 0,
            updated_at: 0,
            last_accessed_at: 0,
        };
        let breakdown = score_candidate(&inputs, 0.0, None, (0.55, 0.25, 0.0), &c, 0);
        assert!(breakdown.final_score >= 0.0 && breakdown.final_score <= 1.0);
    }

    #[test]
    fn higher_importance_never_scores_lower_all_else_equal() {
        let c = cfg();
        let low = ScoreInputs {
            vector_score: 0.5,
            bm25_score: 0.0,
            rerank_score: None,
            importance: 0.1,
            created_at: 0,
            updated_at: 0,
            last_accessed_at: 0,
        };
        let mut high = low;
        high.importance = 0.9;

        let s_low = score_candidate(&low, 0.0, None, (0.55, 0.25, 0.0), &c, 0).final_score;
        let s_high = score_candidate(&high, 0.0, None, (0.55, 0.25, 0.0), &c, 0).final_score;
        assert!(s_high >= s_low);
    }

    #[test]
    fn ranking_key_breaks_ties_by_importance_then_id() {
        let a = ranking_key(0.5, 0.9, "a");
        let b = ranking_key(0.5, 0.5, "b");
        assert!(a < b, "higher importance should sort first");

        let c = ranking_key(0.5, 0.5, "a");
        let d = ranking_key(0.5, 0.5, "b");
        assert!(c < d, "lower id should sort first on full tie");
    }
}
