use crate::config::HybridConfig;
use crate::models::*;
use std::collections::BTreeMap;

const HYBRID_EXPLANATION: &str =
    "This product is recommended based on both your preferences and similar user behavior";

/// Merges collaborative and content-based candidate lists.
///
/// The role of each candidate is taken from its algorithm tag, not from which
/// argument it arrived in, so `combine(a, b)` and `combine(b, a)` agree.
#[derive(Debug, Clone)]
pub struct HybridCombiner {
    collaborative_weight: f64,
    content_weight: f64,
}

#[derive(Default)]
struct Signals {
    collaborative: Option<Candidate>,
    content: Option<Candidate>,
    other: Option<Candidate>,
}

fn keep_best(slot: &mut Option<Candidate>, candidate: &Candidate) {
    match slot {
        Some(existing) if existing.score >= candidate.score => {}
        _ => *slot = Some(candidate.clone()),
    }
}

impl HybridCombiner {
    pub fn new(config: &HybridConfig) -> Self {
        Self {
            collaborative_weight: config.collaborative_weight,
            content_weight: config.content_weight,
        }
    }

    pub fn combine(&self, first: &[Candidate], second: &[Candidate], count: usize) -> Vec<Candidate> {
        let mut merged: BTreeMap<ProductId, Signals> = BTreeMap::new();

        for candidate in first.iter().chain(second.iter()) {
            let signals = merged.entry(candidate.product_id).or_default();
            match candidate.algorithm {
                Algorithm::Collaborative => keep_best(&mut signals.collaborative, candidate),
                Algorithm::ContentBased => keep_best(&mut signals.content, candidate),
                Algorithm::Popularity | Algorithm::Hybrid => keep_best(&mut signals.other, candidate),
            }
        }

        let mut combined: Vec<Candidate> = merged
            .into_iter()
            .filter_map(|(product_id, signals)| match (signals.collaborative, signals.content) {
                (Some(collab), Some(content)) => Some(Candidate::new(
                    product_id,
                    collab.score * self.collaborative_weight + content.score * self.content_weight,
                    Algorithm::Hybrid,
                    HYBRID_EXPLANATION.to_string(),
                )),
                (Some(single), None) | (None, Some(single)) => Some(single),
                (None, None) => signals.other,
            })
            .collect();

        rank_candidates(&mut combined);
        combined.truncate(count);
        combined
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RecommendationConfig;

    fn combiner() -> HybridCombiner {
        HybridCombiner::new(&RecommendationConfig::default().hybrid)
    }

    fn collab(id: ProductId, score: f64) -> Candidate {
        Candidate::new(id, score, Algorithm::Collaborative, "collab".to_string())
    }

    fn content(id: ProductId, score: f64) -> Candidate {
        Candidate::new(id, score, Algorithm::ContentBased, "content".to_string())
    }

    #[test]
    fn test_overlap_becomes_hybrid() {
        let combined = combiner().combine(&[collab(1, 0.8), collab(2, 0.4)], &[content(1, 0.5), content(3, 0.6)], 10);

        let first = &combined[0];
        assert_eq!(first.product_id, 1);
        assert_eq!(first.algorithm, Algorithm::Hybrid);
        assert!((first.score - (0.8 * 0.6 + 0.5 * 0.4)).abs() < 1e-9);
        assert_eq!(first.explanation, HYBRID_EXPLANATION);

        let ids: Vec<_> = combined.iter().map(|c| c.product_id).collect();
        assert_eq!(ids, vec![1, 3, 2]);
        assert_eq!(combined[1].algorithm, Algorithm::ContentBased);
        assert_eq!(combined[2].explanation, "collab");
    }

    #[test]
    fn test_argument_order_does_not_matter() {
        let a = vec![collab(1, 0.7), collab(4, 0.3), collab(5, 0.3)];
        let b = vec![content(1, 0.2), content(2, 0.65), content(5, 0.1)];
        assert_eq!(combiner().combine(&a, &b, 4), combiner().combine(&b, &a, 4));
    }

    #[test]
    fn test_truncates_and_never_duplicates() {
        let a = vec![collab(1, 0.7), collab(1, 0.5), collab(2, 0.3)];
        let b = vec![content(3, 0.2)];
        let combined = combiner().combine(&a, &b, 2);
        assert_eq!(combined.len(), 2);
        assert_ne!(combined[0].product_id, combined[1].product_id);
        assert_eq!(combined[0].score, 0.7);
    }
}
