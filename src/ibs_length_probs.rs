use crate::global_ibs_probs::GlobalIbsProbs;
use crate::ibs_counts::IbsCounts;

/// For every `(start, end)` the estimated probability that a random pair is
/// IBS on `[start, end-1]` and discordant at `end` (spec.md §3/§4.3). Uses
/// the local per-start IBS tail where it is informative and falls back to
/// the global one-sided CDF for wider intervals. The value at
/// `end >= nMarkers` is defined to be 1 (a hypothetical terminating
/// discordance at the chromosome boundary).
pub struct IbsLengthProbs<'a> {
    counts: &'a IbsCounts,
    global: &'a GlobalIbsProbs,
    cm_pos: &'a [f64],
    n_markers: usize,
    n_pairs: u64,
}

impl<'a> IbsLengthProbs<'a> {
    pub fn new(counts: &'a IbsCounts, global: &'a GlobalIbsProbs, cm_pos: &'a [f64]) -> Self {
        Self { counts, global, cm_pos, n_markers: cm_pos.len(), n_pairs: counts.n_pairs }
    }

    fn local_ibs_pairs(&self, start: usize, end_or_before: i64) -> Option<u64> {
        if end_or_before < start as i64 {
            return Some(self.n_pairs);
        }
        let rel = (end_or_before - start as i64) as usize;
        self.counts.get(start, rel).map(|v| v as u64)
    }

    pub fn prob(&self, start: usize, end: usize) -> f64 {
        if end >= self.n_markers {
            return 1.0;
        }
        let a = self.local_ibs_pairs(start, end as i64 - 1);
        let b = self.local_ibs_pairs(start, end as i64);
        if let (Some(a), Some(b)) = (a, b) {
            let numerator = (a as f64 - b as f64 + 1.0).max(0.0);
            return numerator / (self.n_pairs as f64 + 1.0);
        }
        let floor = if self.global.len() > 0 { 0.5 / self.global.len() as f64 } else { 1e-6 };
        let x2 = self.cm_pos[end] - self.cm_pos[start];
        let prev_end = end.saturating_sub(1).max(start);
        let x1 = self.cm_pos[prev_end] - self.cm_pos[start];
        let (x1, x2) = (x1.min(x2), x1.max(x2));
        let diff = self.global.cdf(x2) - self.global.cdf(x1);
        if diff <= 0.0 {
            floor
        } else {
            diff
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::markers::Markers;

    fn identical_markers(n: usize, h: usize) -> Markers {
        let mut m = Markers::new(0, h);
        for i in 0..n {
            m.push_marker(i as u64 * 100, i as f64 * 0.01, &vec![0u16; h], 2);
        }
        m
    }

    #[test]
    fn probabilities_are_in_unit_interval() {
        let markers = identical_markers(60, 12);
        let sample: Vec<u32> = (0..12).collect();
        let counts = IbsCounts::build(&markers, &sample, 0.5);
        let global = crate::global_ibs_probs::GlobalIbsProbs::build(&markers, 20, 30, 0.5, 3.0, 11);
        let probs = IbsLengthProbs::new(&counts, &global, &markers.cm_pos);
        for start in 0..markers.len() {
            for end in start..markers.len() + 2 {
                let p = probs.prob(start, end.min(markers.len() + 1));
                assert!((0.0..=1.0).contains(&p), "start={start} end={end} p={p}");
            }
        }
    }
}
