use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::markers::{AlleleSource, Markers};

/// One-sided global empirical distribution of IBS lengths, sampled at
/// `global_loci` random positions x `global_segments` random distinct
/// haplotype pairs, with outlier loci removed (spec.md §3/§4.2).
pub struct GlobalIbsProbs {
    /// Sorted one-sided IBS lengths in Morgans, `L[0..N)`.
    values: Vec<f64>,
}

impl GlobalIbsProbs {
    #[allow(clippy::too_many_arguments)]
    pub fn build(
        markers: &Markers,
        global_loci: usize,
        global_segments: usize,
        global_quantile: f64,
        global_multiple: f64,
        seed: u64,
    ) -> Self {
        let n_markers = markers.len();
        assert!(n_markers > 0, "cannot build global IBS probs on an empty chromosome");
        let first_cm = markers.cm_pos[0];
        let last_cm = markers.cm_pos[n_markers - 1];
        let mid_cm = (first_cm + last_cm) / 2.0;

        let mut loci: Vec<Vec<f64>> = Vec::with_capacity(global_loci);
        for i in 0..global_loci {
            let mut rng = ChaCha8Rng::seed_from_u64(seed.wrapping_add(i as u64));
            let locus_cm = if last_cm > first_cm {
                rng.gen_range(first_cm..=last_cm)
            } else {
                first_cm
            };
            let mut vals = Vec::with_capacity(global_segments);
            for _ in 0..global_segments {
                let (h1, h2) = distinct_pair(markers.n_haplotypes(), &mut rng);
                let dist = if locus_cm < mid_cm {
                    forward_distance(markers, locus_cm, h1, h2)
                } else {
                    backward_distance(markers, locus_cm, h1, h2)
                };
                vals.push(dist);
            }
            vals.sort_by(|a, b| a.total_cmp(b));
            loci.push(vals);
        }

        let order_idx = ((global_quantile * global_segments as f64) as usize)
            .min(global_segments.saturating_sub(1));
        let mut stats: Vec<f64> =
            loci.iter().map(|v| v.get(order_idx).copied().unwrap_or(0.0)).collect();
        let threshold = median(&mut stats) * global_multiple;

        let mut values: Vec<f64> = loci
            .into_iter()
            .zip(stats.iter())
            .filter(|(_, stat)| **stat <= threshold)
            .flat_map(|(v, _)| v.into_iter())
            .collect();
        values.sort_by(|a, b| a.total_cmp(b));

        Self { values }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// `cdf(x)` is monotone non-decreasing, never 0, never 1 (spec.md §4.2,
    /// invariant 7).
    pub fn cdf(&self, x: f64) -> f64 {
        let n = self.values.len();
        if n == 0 {
            return 0.5;
        }
        let idx = self.values.partition_point(|&v| v <= x);
        let idx = idx.max(1).min(n - 1);
        idx as f64 / n as f64
    }
}

fn distinct_pair(n_haplotypes: usize, rng: &mut ChaCha8Rng) -> (usize, usize) {
    let h1 = rng.gen_range(0..n_haplotypes);
    loop {
        let h2 = rng.gen_range(0..n_haplotypes);
        if h2 != h1 {
            return (h1, h2);
        }
    }
}

fn forward_distance(markers: &Markers, locus_cm: f64, h1: usize, h2: usize) -> f64 {
    let n = markers.len();
    let start = markers.cm_pos.partition_point(|&c| c < locus_cm);
    for m in start..n {
        if markers.allele(m, h1) != markers.allele(m, h2) {
            return markers.cm_pos[m] - locus_cm;
        }
    }
    markers.cm_pos[n - 1] - locus_cm
}

fn backward_distance(markers: &Markers, locus_cm: f64, h1: usize, h2: usize) -> f64 {
    let end = markers.cm_pos.partition_point(|&c| c <= locus_cm);
    let start = end.saturating_sub(1);
    for m in (0..=start).rev() {
        if markers.allele(m, h1) != markers.allele(m, h2) {
            return locus_cm - markers.cm_pos[m];
        }
    }
    locus_cm - markers.cm_pos[0]
}

fn median(values: &mut [f64]) -> f64 {
    values.sort_by(|a, b| a.total_cmp(b));
    let n = values.len();
    if n == 0 {
        return 0.0;
    }
    if n % 2 == 1 {
        values[n / 2]
    } else {
        (values[n / 2 - 1] + values[n / 2]) / 2.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chromosome_with_one_discordance(n_markers: usize, n_haps: usize, discord_at: usize) -> Markers {
        let mut m = Markers::new(0, n_haps);
        for i in 0..n_markers {
            let mut alleles = vec![0u16; n_haps];
            if i == discord_at {
                alleles[n_haps - 1] = 1;
            }
            m.push_marker(i as u64 * 1000, i as f64 * 0.01, &alleles, 2);
        }
        m
    }

    #[test]
    fn cdf_is_monotone_and_bounded_away_from_extremes() {
        let markers = chromosome_with_one_discordance(200, 20, 1000);
        let probs = GlobalIbsProbs::build(&markers, 40, 50, 0.5, 3.0, 7);
        assert!(!probs.is_empty());
        let xs = [-1.0, 0.0, 0.1, 0.5, 1.0, 5.0];
        let mut prev = 0.0;
        for x in xs {
            let c = probs.cdf(x);
            assert!(c > 0.0 && c < 1.0, "cdf({x})={c} out of (0,1)");
            assert!(c >= prev, "cdf not monotone at x={x}");
            prev = c;
        }
    }
}
