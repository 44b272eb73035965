// ============================================================
// Layer 4 — Triplet Sampler
// ============================================================
// For an anchor image, pick
//   - a positive: a DIFFERENT image with the SAME label
//   - a negative: an image with a DIFFERENT label
//
// Candidates are indexed by label up front, so sampling is a
// single draw instead of a retry loop.

use rand::Rng;

use crate::domain::{error::DataError, scan::Label};

#[derive(Debug, Clone)]
pub struct TripletSampler {
    labels:   Vec<Label>,
    by_label: [Vec<usize>; 2],
}

impl TripletSampler {
    pub fn new(labels: Vec<Label>) -> Result<Self, DataError> {
        let mut by_label: [Vec<usize>; 2] = [Vec::new(), Vec::new()];
        for (i, label) in labels.iter().enumerate() {
            by_label[label.index()].push(i);
        }

        for label in Label::ALL {
            let n = by_label[label.index()].len();
            if n == 0 {
                return Err(DataError::NoTripletCandidates(format!(
                    "no {label} images, negatives cannot be drawn"
                )));
            }
            if n < 2 {
                return Err(DataError::NoTripletCandidates(format!(
                    "only one {label} image, positives cannot be drawn"
                )));
            }
        }

        Ok(Self { labels, by_label })
    }

    /// Draw `(positive, negative)` indices for `anchor`.
    pub fn sample<R: Rng + ?Sized>(&self, anchor: usize, rng: &mut R) -> (usize, usize) {
        let label     = self.labels[anchor];
        let same      = &self.by_label[label.index()];
        let other     = &self.by_label[1 - label.index()];

        // Draw from the n-1 same-label images other than the anchor
        let anchor_pos = same.binary_search(&anchor).unwrap_or_default();
        let mut k      = rng.gen_range(0..same.len() - 1);
        if k >= anchor_pos {
            k += 1;
        }
        let positive = same[k];
        let negative = other[rng.gen_range(0..other.len())];

        (positive, negative)
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, SeedableRng};

    fn labels() -> Vec<Label> {
        vec![Label::Ad, Label::Nc, Label::Ad, Label::Ad, Label::Nc, Label::Nc, Label::Ad]
    }

    #[test]
    fn test_positive_matches_and_negative_differs() {
        let labels  = labels();
        let sampler = TripletSampler::new(labels.clone()).unwrap();
        let mut rng = StdRng::seed_from_u64(0);
        for _ in 0..200 {
            for anchor in 0..labels.len() {
                let (p, n) = sampler.sample(anchor, &mut rng);
                assert_ne!(p, anchor);
                assert_eq!(labels[p], labels[anchor]);
                assert_ne!(labels[n], labels[anchor]);
            }
        }
    }

    #[test]
    fn test_every_positive_candidate_is_reachable() {
        let sampler = TripletSampler::new(labels()).unwrap();
        let mut rng = StdRng::seed_from_u64(1);
        let mut seen = std::collections::HashSet::new();
        for _ in 0..500 {
            seen.insert(sampler.sample(0, &mut rng).0);
        }
        // AD images other than the anchor (0): 2, 3, 6
        assert_eq!(seen, [2, 3, 6].into_iter().collect());
    }

    #[test]
    fn test_single_class_has_no_negatives() {
        let err = TripletSampler::new(vec![Label::Ad, Label::Ad]).unwrap_err();
        assert!(matches!(err, DataError::NoTripletCandidates(_)));
    }

    #[test]
    fn test_singleton_class_has_no_positives() {
        let err = TripletSampler::new(vec![Label::Ad, Label::Nc, Label::Nc]).unwrap_err();
        assert!(matches!(err, DataError::NoTripletCandidates(_)));
    }
}
