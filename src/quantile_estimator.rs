use crate::coalescent::{f, inv_f};
use crate::global_ibs_probs::GlobalIbsProbs;
use crate::ibs_counts::IbsCounts;
use crate::ibs_length_probs::IbsLengthProbs;
use crate::markers::{AlleleSource, Markers};

const RESCALE_THRESHOLD: f64 = 1e50;
const TINY_PROB: f64 = 1e-300;

/// Posterior CDF of an IBD segment's endpoint, evaluated against both the
/// forward and the (shared-storage) reversed view of one chromosome
/// (spec.md §4.5, Design Notes "Cyclic dependencies"). Built once per
/// chromosome and reused, single-threaded, by one pooled worker per segment.
pub struct QuantileEstimator<'a> {
    markers: &'a Markers,
    global: &'a GlobalIbsProbs,
    fwd_counts: &'a IbsCounts,
    bwd_counts: IbsCounts,
    bwd_cm: Vec<f64>,
    ne: f64,
    gc_bp: u64,
    gc_discord: f64,
    discord: f64,
    min_cdf_ratio: f64,
}

/// One point of the (view-index, cumulative-mass) curve built while walking
/// away from the focus.
struct CdfPoint {
    view_idx: usize,
    mass: f64,
}

impl<'a> QuantileEstimator<'a> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        markers: &'a Markers,
        fwd_counts: &'a IbsCounts,
        global: &'a GlobalIbsProbs,
        ne: f64,
        gc_bp: u64,
        gc_discord: f64,
        discord: f64,
        min_cdf_ratio: f64,
    ) -> Self {
        let n = markers.len();
        let bwd_counts = fwd_counts.reverse(n);
        let bwd_cm: Vec<f64> = (0..n).map(|i| -markers.cm_pos[n - 1 - i]).collect();
        Self { markers, global, fwd_counts, bwd_counts, bwd_cm, ne, gc_bp, gc_discord, discord, min_cdf_ratio }
    }

    fn view_cm(&self, idx: usize, reverse: bool) -> f64 {
        if reverse {
            self.bwd_cm[idx]
        } else {
            self.markers.cm_pos[idx]
        }
    }

    fn view_underlying(&self, idx: usize, reverse: bool) -> usize {
        if reverse {
            self.markers.len() - 1 - idx
        } else {
            idx
        }
    }

    fn view_base_pos(&self, idx: usize, reverse: bool) -> u64 {
        self.markers.base_pos[self.view_underlying(idx, reverse)]
    }

    fn probs(&self, reverse: bool) -> IbsLengthProbs<'_> {
        if reverse {
            IbsLengthProbs::new(&self.bwd_counts, self.global, &self.bwd_cm)
        } else {
            IbsLengthProbs::new(self.fwd_counts, self.global, &self.markers.cm_pos)
        }
    }

    /// The first view-index strictly on the far side of `focus_bp`.
    fn first_walk_idx(&self, focus_bp: u64, reverse: bool) -> Option<usize> {
        let n = self.markers.len();
        if !reverse {
            let underlying = self.markers.base_pos.partition_point(|&p| p <= focus_bp);
            (underlying < n).then_some(underlying)
        } else {
            let idx = self.markers.base_pos.partition_point(|&p| p < focus_bp);
            if idx == 0 {
                None
            } else {
                Some(n - idx)
            }
        }
    }

    fn is_discordant(&self, view_idx: usize, reverse: bool, h1: u32, h2: u32) -> bool {
        let underlying = self.view_underlying(view_idx, reverse);
        self.markers.allele(underlying, h1 as usize) != self.markers.allele(underlying, h2 as usize)
    }

    /// Builds the prior CDF walking away from `focus_bp`, relative to
    /// coalescent origin `start_morgan` (spec.md §4.5).
    fn build_cdf(
        &self,
        h1: u32,
        h2: u32,
        start_morgan: f64,
        focus_bp: u64,
        reverse: bool,
    ) -> Vec<CdfPoint> {
        let n = self.markers.len();
        let Some(first_idx) = self.first_walk_idx(focus_bp, reverse) else {
            return Vec::new();
        };
        let probs = self.probs(reverse);
        let mut cdf = Vec::with_capacity(n - first_idx);
        let mut running_total = 0.0f64;
        let mut factor = 1.0f64;
        let mut last_discord_idx: Option<usize> = None;
        let mut last_discord_bp: Option<u64> = None;
        let mut prev_cm = if first_idx == 0 {
            self.view_cm(0, reverse)
        } else {
            self.view_cm(first_idx - 1, reverse)
        };

        for idx in first_idx..n {
            let cur_cm = self.view_cm(idx, reverse);
            let y1 = (prev_cm - start_morgan).max(0.0);
            let y2 = (cur_cm - start_morgan).max(0.0);
            let p_start = last_discord_idx.map(|d| d + 1).unwrap_or(first_idx);
            let ibs_prob = probs.prob(p_start, idx);
            let increment = (f(y2, self.ne) - f(y1, self.ne)) * ibs_prob * factor;
            running_total += increment.max(0.0);
            cdf.push(CdfPoint { view_idx: idx, mass: running_total });

            if self.is_discordant(idx, reverse, h1, h2) {
                let bp = self.view_base_pos(idx, reverse);
                let is_gc = last_discord_bp
                    .map(|prev_bp| prev_bp.abs_diff(bp) <= self.gc_bp)
                    .unwrap_or(false);
                let discord_prob = if is_gc { self.gc_discord } else { self.discord };
                let denom = probs.prob(p_start, idx).max(TINY_PROB);
                factor *= discord_prob / denom;
                last_discord_idx = Some(idx);
                last_discord_bp = Some(bp);
            }

            if running_total.abs() > RESCALE_THRESHOLD {
                let s = running_total;
                for point in cdf.iter_mut() {
                    point.mass /= s;
                }
                running_total /= s;
            }

            let remaining_upper_bound = (1.0 - f(y2, self.ne)) * factor;
            if remaining_upper_bound < self.min_cdf_ratio * running_total.max(TINY_PROB) {
                break;
            }
            prev_cm = cur_cm;
        }

        if let Some(last) = cdf.last() {
            let max = last.mass.max(TINY_PROB);
            for point in cdf.iter_mut() {
                point.mass /= max;
            }
        }
        cdf
    }

    /// Returns the Morgan position and its base-pair approximation at which
    /// the posterior CDF of the pair's endpoint reaches `p`, walking forward
    /// (`reverse=false`) or backward (`reverse=true`) from `focus_bp`.
    pub fn quantile(
        &self,
        h1: u32,
        h2: u32,
        start_morgan: f64,
        focus_bp: u64,
        p: f64,
    ) -> (f64, u64) {
        self.quantile_dir(h1, h2, start_morgan, focus_bp, p, false)
    }

    pub fn quantile_backward(
        &self,
        h1: u32,
        h2: u32,
        start_morgan: f64,
        focus_bp: u64,
        p: f64,
    ) -> (f64, u64) {
        self.quantile_dir(h1, h2, start_morgan, focus_bp, p, true)
    }

    fn quantile_dir(
        &self,
        h1: u32,
        h2: u32,
        start_morgan: f64,
        focus_bp: u64,
        p: f64,
        reverse: bool,
    ) -> (f64, u64) {
        let cdf = self.build_cdf(h1, h2, start_morgan, focus_bp, reverse);
        if cdf.is_empty() {
            return (start_morgan, focus_bp + 1);
        }
        let bracket_hi = cdf.partition_point(|pt| pt.mass < p).min(cdf.len() - 1);
        let bracket_lo = bracket_hi.saturating_sub(1);

        let (view1, p1) = if bracket_hi == 0 {
            let first_idx = cdf[0].view_idx;
            let before = if first_idx == 0 { first_idx } else { first_idx - 1 };
            (before, 0.0)
        } else {
            (cdf[bracket_lo].view_idx, cdf[bracket_lo].mass)
        };
        let (view2, p2) = (cdf[bracket_hi].view_idx, cdf[bracket_hi].mass);

        let cm1 = self.view_cm(view1, reverse);
        let cm2 = self.view_cm(view2, reverse);
        let y1 = (cm1 - start_morgan).max(0.0);
        let y2 = (cm2 - start_morgan).max(0.0);
        let f1 = f(y1, self.ne);
        let f2 = f(y2, self.ne);

        let morgan = if (p2 - p1).abs() < TINY_PROB {
            cm2
        } else {
            let frac = ((p - p1) / (p2 - p1)).clamp(0.0, 1.0);
            let target_f = (f1 + frac * (f2 - f1)).clamp(TINY_PROB, 1.0 - TINY_PROB);
            start_morgan + inv_f(target_f, self.ne)
        };
        let morgan = morgan.clamp(cm1.min(cm2), cm1.max(cm2));

        let bp1 = self.view_base_pos(view1, reverse);
        let bp2 = self.view_base_pos(view2, reverse);
        let frac_bp = if (cm2 - cm1).abs() > f64::EPSILON {
            ((morgan - cm1) / (cm2 - cm1)).clamp(0.0, 1.0)
        } else {
            0.0
        };
        let bp = bp1 as f64 + frac_bp * (bp2 as f64 - bp1 as f64);
        let bp = bp.round() as i64;
        let bp = if !reverse {
            bp.max(focus_bp as i64 + 1)
        } else {
            bp.min(focus_bp as i64 - 1).max(0)
        } as u64;

        (morgan, bp)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identical_markers(n: usize, h: usize) -> Markers {
        let mut m = Markers::new(0, h);
        for i in 0..n {
            m.push_marker(i as u64 * 1000, i as f64 * 0.01, &vec![0u16; h], 2);
        }
        m
    }

    #[test]
    fn forward_quantile_moves_away_from_focus() {
        let markers = identical_markers(100, 8);
        let sample: Vec<u32> = (0..8).collect();
        let counts = IbsCounts::build(&markers, &sample, 0.5);
        let global = GlobalIbsProbs::build(&markers, 20, 30, 0.5, 3.0, 9);
        let est = QuantileEstimator::new(&markers, &counts, &global, 1e4, 500, 0.01, 0.0005, 1e-10);
        let focus_bp = markers.base_pos[20];
        let (morgan, bp) = est.quantile(0, 1, markers.cm_pos[20], focus_bp, 0.5);
        assert!(bp > focus_bp);
        assert!(morgan >= markers.cm_pos[20]);
    }

    #[test]
    fn backward_quantile_moves_away_from_focus_in_the_other_direction() {
        let markers = identical_markers(100, 8);
        let sample: Vec<u32> = (0..8).collect();
        let counts = IbsCounts::build(&markers, &sample, 0.5);
        let global = GlobalIbsProbs::build(&markers, 20, 30, 0.5, 3.0, 9);
        let est = QuantileEstimator::new(&markers, &counts, &global, 1e4, 500, 0.01, 0.0005, 1e-10);
        let focus_bp = markers.base_pos[80];
        let (_, bp) = est.quantile_backward(0, 1, markers.cm_pos[80], focus_bp, 0.5);
        assert!(bp <= focus_bp);
    }
}
