/// Lowercases and splits on non-alphanumeric boundaries. Shared by the
/// local full-text fallback and the deduplicator's noise gate.
pub fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|s| !s.is_empty())
        .map(str::to_lowercase)
        .collect()
}

/// A BM25-flavoured relevance score over `content`/`summary`/`headline`/`tags`,
/// used by the local JSON backend as a stand-in full-text index. Spec.md
/// §4.1 leaves the lexical relevance score provider-defined and
/// not pre-normalised, so this need not match any particular engine's
/// numbers, only their shape: higher for more and rarer term matches,
/// damped by document length.
pub fn bm25_like(haystack: &str, doc_len_tokens: f32, terms: &[String]) -> f32 {
    const K1: f32 = 1.2;
    const B: f32 = 0.75;
    const AVG_DOC_LEN: f32 = 32.0;

    let mut score = 0.0_f32;
    for term in terms {
        if term.is_empty() || !haystack.contains(term.as_str()) {
            continue;
        }
        let tf = 1.0_f32;
        let denom = tf + K1 * (1.0 - B + B * (doc_len_tokens / AVG_DOC_LEN));
        score += (tf * (K1 + 1.0)) / denom.max(1e-6);
    }
    score
}

pub fn cosine_similarity(a: &[f32], b: &[f32]) -> Option<f32> {
    if a.len() != b.len() || a.is_empty() {
        return None;
    }
    let mut dot = 0.0_f32;
    let mut na = 0.0_f32;
    let mut nb = 0.0_f32;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        na += x * x;
        nb += y * y;
    }
    let denom = na.sqrt() * nb.sqrt();
    if denom == 0.0 {
        return Some(0.0);
    }
    Some(dot / denom)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokenize_lowercases_and_splits_on_punctuation() {
        assert_eq!(
            tokenize("Jina-Embeddings, v3!"),
            vec!["jina", "embeddings", "v3"]
        );
    }

    #[test]
    fn bm25_like_rewards_longer_term_overlap() {
        let terms = vec!["jina".to_string(), "retrieval".to_string()];
        let one_hit = bm25_like("uses jina for search", 5.0, &terms);
        let two_hits = bm25_like("uses jina retrieval for search", 6.0, &terms);
        assert!(two_hits > one_hit);
    }

    #[test]
    fn cosine_similarity_is_one_for_identical_vectors() {
        let v = vec![0.3, 0.4, 0.5];
        let sim = cosine_similarity(&v, &v).expect("same length");
        assert!((sim - 1.0).abs() < 1e-5);
    }

    #[test]
    fn cosine_similarity_rejects_mismatched_dimensions() {
        assert!(cosine_similarity(&[1.0, 0.0], &[1.0, 0.0, 0.0]).is_none());
    }
}
