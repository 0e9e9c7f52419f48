use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rustc_hash::FxHashMap;

use crate::markers::AlleleSource;

/// Hard cap on the local-segments sample size so that `|H|*(|H|-1)` fits in
/// 32 bits (spec.md §3).
pub const LOCAL_SEGMENTS_HARD_CAP: usize = 45_000;

/// Draws a deterministic shuffle of `[0, n_haplotypes)` seeded by `seed`,
/// takes the first `min(n_haplotypes, local_segments.min(HARD_CAP))`
/// indices, and returns them sorted (spec.md §4.1).
pub fn sample_haplotypes(n_haplotypes: usize, local_segments: usize, seed: u64) -> Vec<u32> {
    let cap = local_segments.min(LOCAL_SEGMENTS_HARD_CAP).min(n_haplotypes);
    let mut all: Vec<u32> = (0..n_haplotypes as u32).collect();
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    all.shuffle(&mut rng);
    let mut sample: Vec<u32> = all.into_iter().take(cap).collect();
    sample.sort_unstable();
    sample
}

/// Per-start-marker empirical tail of IBS run lengths over a sampled
/// haplotype subset (spec.md §3/§4.1). `rows[start][k]` is the number of
/// ordered pairs `(a,b)` from the sample, `a != b`, that are IBS on markers
/// `[start, start+k]`, truncated once the count drops below `minIbsPairs`.
pub struct IbsCounts {
    pub sample: Vec<u32>,
    pub n_pairs: u64,
    rows: Vec<Vec<u32>>,
}

impl IbsCounts {
    pub fn min_ibs_pairs(n_pairs: u64, local_max_cdf: f64) -> u64 {
        let raw = (1.0 - local_max_cdf) * n_pairs as f64;
        raw.ceil() as u64
    }

    pub fn build(markers: &dyn AlleleSource, sample: &[u32], local_max_cdf: f64) -> Self {
        let h = sample.len();
        let n_pairs = h as u64 * (h.saturating_sub(1)) as u64;
        let min_ibs_pairs = Self::min_ibs_pairs(n_pairs, local_max_cdf);
        let n_markers = markers.n_markers();
        let mut rows = Vec::with_capacity(n_markers);

        for start in 0..n_markers {
            let mut class_of: Vec<u32> = vec![0; h];
            let mut class_sizes: Vec<u64> = vec![h as u64];
            let mut ibs_pairs: u64 =
                class_sizes[0].saturating_mul(class_sizes[0].saturating_sub(1));
            let mut row = Vec::new();
            let mut seq_al_map: FxHashMap<(u32, u16), u32> = FxHashMap::default();

            for m in start..n_markers {
                let n_alleles = markers.n_alleles(m);
                if n_alleles > 1 {
                    seq_al_map.clear();
                    let mut new_sizes: Vec<u64> = Vec::new();
                    let mut new_class_of = vec![0u32; h];
                    for (j, &hap) in sample.iter().enumerate() {
                        let allele = markers.allele(m, hap as usize);
                        let key = (class_of[j], allele);
                        let new_class = *seq_al_map.entry(key).or_insert_with(|| {
                            new_sizes.push(0);
                            (new_sizes.len() - 1) as u32
                        });
                        new_sizes[new_class as usize] += 1;
                        new_class_of[j] = new_class;
                    }
                    if new_sizes.len() > 1 {
                        class_of = new_class_of;
                        class_sizes = new_sizes;
                        ibs_pairs =
                            class_sizes.iter().map(|c| c.saturating_mul(c.saturating_sub(1))).sum();
                    }
                }
                if ibs_pairs < min_ibs_pairs {
                    break;
                }
                row.push(ibs_pairs as u32);
            }
            rows.push(row);
        }

        Self { sample: sample.to_vec(), n_pairs, rows }
    }

    pub fn row_len(&self, start: usize) -> usize {
        self.rows.get(start).map(|r| r.len()).unwrap_or(0)
    }

    /// Looks up `ibsPairs(start, start+k)`.
    pub fn get(&self, start: usize, k: usize) -> Option<u32> {
        self.rows.get(start)?.get(k).copied()
    }

    /// Looks up `ibsPairs(start, end)` where `end >= start`.
    pub fn ibs_pairs_interval(&self, start: usize, end: usize) -> Option<u32> {
        if end < start {
            return None;
        }
        self.get(start, end - start)
    }

    /// Returns the table as if it had been built from markers scanned in
    /// reverse. Re-indexes the existing rows (a diagonal re-read) rather
    /// than rescanning: `reversed.rows[revStart][j] ==
    /// original.rows[n_markers-1-revStart-j][j]`, which is exactly the
    /// entry the forward scan already computed for the interval
    /// `[n_markers-1-revStart-j, n_markers-1-revStart]` — the same interval,
    /// since IBS membership over an interval does not depend on scan
    /// direction.
    pub fn reverse(&self, n_markers: usize) -> IbsCounts {
        let mut rows = Vec::with_capacity(n_markers);
        for rev_start in 0..n_markers {
            let mut row = Vec::new();
            let mut j = 0usize;
            loop {
                if j > rev_start {
                    break;
                }
                let orig_low = n_markers - 1 - rev_start - j;
                match self.rows.get(orig_low).and_then(|r| r.get(j)) {
                    Some(&v) => row.push(v),
                    None => break,
                }
                j += 1;
            }
            rows.push(row);
        }
        IbsCounts { sample: self.sample.clone(), n_pairs: self.n_pairs, rows }
    }
}
