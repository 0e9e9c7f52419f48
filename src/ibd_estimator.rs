use crate::hap_pair_segment::{HapPairSegment, ZERO_LENGTH_SEGMENT};
use crate::markers::Markers;
use crate::quantile_estimator::QuantileEstimator;

/// Parameters of the iterative endpoint refinement (spec.md §4.6), a subset
/// of the run-wide `Config` relevant to one estimator instance.
#[derive(Clone, Copy)]
pub struct IbdEstimatorParams {
    pub quantile: f64,
    pub max_its: u32,
    pub fix_focus: bool,
    pub prefocus_quantile: f64,
    pub max_rel_change: f64,
    pub trim_cm: f64,
    pub min_ibd_cm: f64,
}

/// Refines a seed IBS segment's `(start, focus, end)` by alternating
/// quantile lookups against the opposite endpoint, then trims and emits a
/// final `HapPairSegment` (or `ZERO_LENGTH_SEGMENT` if it doesn't survive).
/// One instance is owned by one pooled worker and reused across segments
/// (spec.md §4.6, §5 "IbdEstimator pool").
pub struct IbdEstimator<'a> {
    markers: &'a Markers,
    quantiles: &'a QuantileEstimator<'a>,
    params: IbdEstimatorParams,
}

impl<'a> IbdEstimator<'a> {
    pub fn new(markers: &'a Markers, quantiles: &'a QuantileEstimator<'a>, params: IbdEstimatorParams) -> Self {
        Self { markers, quantiles, params }
    }

    fn cm_at_bp(&self, bp: u64) -> f64 {
        let idx = self.markers.index_at_or_after(bp).min(self.markers.len().saturating_sub(1));
        self.markers.cm_pos[idx]
    }

    pub fn estimate(&self, seed: HapPairSegment) -> HapPairSegment {
        let h1 = seed.h1;
        let h2 = seed.h2;
        let mut start_bp = seed.start_pos;
        let mut focus_bp = seed.midpoint();
        let mut end_bp = seed.incl_end_pos;

        let mut rejections = 0u32;
        for step in 0..2 * self.params.max_its {
            let refine_right = step % 2 == 0;
            let accepted = if refine_right {
                self.refine_right(h1, h2, seed, &mut start_bp, &mut focus_bp, &mut end_bp)
            } else {
                self.refine_left(h1, h2, seed, &mut start_bp, &mut focus_bp, &mut end_bp)
            };
            if accepted {
                rejections = 0;
            } else {
                rejections += 1;
                if rejections >= 2 {
                    break;
                }
            }
        }

        let start_morgan = self.cm_at_bp(start_bp);
        let end_morgan = self.cm_at_bp(end_bp);
        let (_, left_bp) =
            self.quantiles.quantile_backward(h1, h2, end_morgan, focus_bp, self.params.quantile);
        let (_, right_bp) =
            self.quantiles.quantile(h1, h2, start_morgan, focus_bp, self.params.quantile);

        let trim_morgan = self.params.trim_cm / 100.0;
        let trimmed_left_bp = self.trim_from_start(left_bp, trim_morgan);
        let trimmed_right_bp = self.trim_from_end(right_bp, trim_morgan);

        if trimmed_right_bp < trimmed_left_bp {
            return ZERO_LENGTH_SEGMENT;
        }
        let span_cm = (self.cm_at_bp(trimmed_right_bp) - self.cm_at_bp(trimmed_left_bp)) * 100.0;
        if span_cm < self.params.min_ibd_cm {
            return ZERO_LENGTH_SEGMENT;
        }
        HapPairSegment::new(h1, h2, trimmed_left_bp, trimmed_right_bp)
    }

    fn trim_from_start(&self, bp: u64, trim_morgan: f64) -> u64 {
        let target_cm = self.cm_at_bp(bp) + trim_morgan;
        let idx = self.markers.cm_pos.partition_point(|&c| c < target_cm);
        self.markers.base_pos.get(idx).copied().unwrap_or(bp)
    }

    fn trim_from_end(&self, bp: u64, trim_morgan: f64) -> u64 {
        let target_cm = self.cm_at_bp(bp) - trim_morgan;
        let idx = self.markers.cm_pos.partition_point(|&c| c <= target_cm);
        if idx == 0 {
            return bp.min(self.markers.base_pos.first().copied().unwrap_or(bp));
        }
        self.markers.base_pos[idx - 1]
    }

    #[allow(clippy::too_many_arguments)]
    fn refine_right(
        &self,
        h1: u32,
        h2: u32,
        seed: HapPairSegment,
        start_bp: &mut u64,
        focus_bp: &mut u64,
        end_bp: &mut u64,
    ) -> bool {
        let start_morgan = self.cm_at_bp(*start_bp);
        let (_, new_end_bp) =
            self.quantiles.quantile(h1, h2, start_morgan, *focus_bp, self.params.prefocus_quantile);
        self.accept_proposal(seed, *start_bp, *focus_bp, new_end_bp, *end_bp, true)
            .map(|new_focus| {
                *end_bp = new_end_bp;
                if !self.params.fix_focus {
                    *focus_bp = new_focus;
                }
                true
            })
            .unwrap_or(false)
    }

    #[allow(clippy::too_many_arguments)]
    fn refine_left(
        &self,
        h1: u32,
        h2: u32,
        seed: HapPairSegment,
        start_bp: &mut u64,
        focus_bp: &mut u64,
        end_bp: &mut u64,
    ) -> bool {
        let end_morgan = self.cm_at_bp(*end_bp);
        let (_, new_start_bp) =
            self.quantiles.quantile_backward(h1, h2, end_morgan, *focus_bp, self.params.prefocus_quantile);
        self.accept_proposal(seed, new_start_bp, *focus_bp, *end_bp, *start_bp, false)
            .map(|new_focus| {
                *start_bp = new_start_bp;
                if !self.params.fix_focus {
                    *focus_bp = new_focus;
                }
                true
            })
            .unwrap_or(false)
    }

    /// Evaluates the acceptance criteria of spec.md §4.6 step 2 and, if
    /// accepted, returns the recomputed focus (the midpoint of the proposed
    /// span). `prior_bound` is the live, not-yet-updated opposite endpoint
    /// (`end_bp` when refining right, `start_bp` when refining left) carried
    /// in from the caller's running state, so the relative-change comparison
    /// is against the most recent prior distance rather than the original
    /// seed span. The focus-containment check below is intentionally still
    /// against the seed's own bounds: the focus may never drift outside the
    /// span the seed originally covered.
    #[allow(clippy::too_many_arguments)]
    fn accept_proposal(
        &self,
        seed: HapPairSegment,
        proposed_start: u64,
        old_focus: u64,
        proposed_end: u64,
        prior_bound: u64,
        updating_right: bool,
    ) -> Option<u64> {
        if proposed_end <= proposed_start {
            return None;
        }
        let new_focus = proposed_start + (proposed_end - proposed_start) / 2;

        let opposite_dist = if updating_right {
            (proposed_end as i64 - old_focus as i64).unsigned_abs()
        } else {
            (old_focus as i64 - proposed_start as i64).unsigned_abs()
        };
        let prior_dist = if updating_right {
            (prior_bound as i64 - old_focus as i64).unsigned_abs().max(1)
        } else {
            (old_focus as i64 - prior_bound as i64).unsigned_abs().max(1)
        };
        let change = (opposite_dist as f64 - prior_dist as f64).abs() / prior_dist as f64;
        if change <= self.params.max_rel_change {
            return None;
        }
        if !self.params.fix_focus
            && !(seed.start_pos + 1..=seed.incl_end_pos.saturating_sub(1)).contains(&new_focus)
        {
            return None;
        }
        let left_span = new_focus as i64 - proposed_start as i64;
        let right_span = proposed_end as i64 - new_focus as i64;
        if left_span <= 0 || right_span <= 0 {
            return None;
        }
        Some(new_focus)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::global_ibs_probs::GlobalIbsProbs;
    use crate::ibs_counts::IbsCounts;

    fn identical_markers(n: usize, h: usize) -> Markers {
        let mut m = Markers::new(0, h);
        for i in 0..n {
            m.push_marker(i as u64 * 1000, i as f64 * 0.01, &vec![0u16; h], 2);
        }
        m
    }

    #[test]
    fn fully_identical_chromosome_survives_trimming() {
        let markers = identical_markers(200, 8);
        let sample: Vec<u32> = (0..8).collect();
        let counts = IbsCounts::build(&markers, &sample, 0.5);
        let global = GlobalIbsProbs::build(&markers, 20, 30, 0.5, 3.0, 5);
        let qe = QuantileEstimator::new(&markers, &counts, &global, 1e4, 500, 0.01, 0.0005, 1e-10);
        let params = IbdEstimatorParams {
            quantile: 0.5,
            max_its: 5,
            fix_focus: false,
            prefocus_quantile: 0.5,
            max_rel_change: 0.001,
            trim_cm: 0.5,
            min_ibd_cm: 1.0,
        };
        let est = IbdEstimator::new(&markers, &qe, params);
        let seed = HapPairSegment::new(0, 1, markers.base_pos[10], markers.base_pos[190]);
        let result = est.estimate(seed);
        assert!(!result.is_zero_length());
    }
}
