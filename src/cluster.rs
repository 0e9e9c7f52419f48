use crate::hap_pair_segment::{sort_by_position, HapPairSegment};
use crate::markers::Markers;
use crate::partition::Partition;

/// A genetic output position on a fixed cM grid (spec.md §4.7).
#[derive(Debug, Clone, Copy)]
pub struct OutputLocus {
    pub chrom: u32,
    pub base_pos: u64,
    pub cm: f64,
}

/// Output positions are the integers `k` such that `k * out_cm * 0.01` (in
/// Morgans) lies within the chromosome's Morgan span; each is interpolated
/// to a base position using the chromosome's own marker coordinates.
pub fn output_loci(markers: &Markers, out_cm: f64) -> Vec<OutputLocus> {
    if markers.is_empty() {
        return Vec::new();
    }
    let step = out_cm * 0.01;
    let first_cm = markers.cm_pos[0];
    let last_cm = *markers.cm_pos.last().unwrap();
    if step <= 0.0 || first_cm > last_cm {
        return Vec::new();
    }
    let k_min = (first_cm / step).ceil() as i64;
    let k_max = (last_cm / step).floor() as i64;
    let mut loci = Vec::new();
    for k in k_min..=k_max {
        let target_cm = k as f64 * step;
        let base_pos = interpolate_base_pos(markers, target_cm);
        loci.push(OutputLocus { chrom: markers.chrom, base_pos, cm: target_cm });
    }
    loci
}

fn interpolate_base_pos(markers: &Markers, target_cm: f64) -> u64 {
    let idx = markers.cm_pos.partition_point(|&c| c < target_cm);
    if idx == 0 {
        return markers.base_pos[0];
    }
    if idx >= markers.len() {
        return *markers.base_pos.last().unwrap();
    }
    let (c0, c1) = (markers.cm_pos[idx - 1], markers.cm_pos[idx]);
    let (p0, p1) = (markers.base_pos[idx - 1], markers.base_pos[idx]);
    if (c1 - c0).abs() < f64::EPSILON {
        return p0;
    }
    let frac = (target_cm - c0) / (c1 - c0);
    (p0 as f64 + frac * (p1 as f64 - p0 as f64)).round() as u64
}

/// Streams IBD segments (sorted by `(startPos, inclEndPos, h1, h2)`) across
/// a chromosome's output loci, maintaining the set of segments active at
/// each locus and unioning their haplotype pairs into a fresh `Partition`
/// per locus (spec.md §4.7). The union-find for each locus is owned solely
/// by the caller and never shared (spec.md §5).
pub struct ClustAnalysis {
    segments: Vec<HapPairSegment>,
    seg_ptr: usize,
    active: Vec<HapPairSegment>,
}

impl ClustAnalysis {
    pub fn new(segments: Vec<HapPairSegment>) -> Self {
        Self { segments: sort_by_position(segments), seg_ptr: 0, active: Vec::new() }
    }

    /// Builds the partition for one output locus, advancing past segments
    /// whose `startPos` is now behind the locus and dropping ones that have
    /// already ended.
    pub fn partition_at(&mut self, locus: &OutputLocus, n_haplotypes: usize) -> Partition {
        while self.seg_ptr < self.segments.len()
            && self.segments[self.seg_ptr].start_pos <= locus.base_pos
        {
            self.active.push(self.segments[self.seg_ptr]);
            self.seg_ptr += 1;
        }
        self.active.retain(|s| s.incl_end_pos >= locus.base_pos);

        let mut partition = Partition::new(n_haplotypes, locus.chrom, locus.base_pos, locus.cm);
        for seg in &self.active {
            partition.union(seg.h1, seg.h2);
        }
        partition
    }
}

/// Scans markers strictly inside `[startPos, inclEndPos]` and counts allele
/// discordances between `h1` and `h2`, returning `(discordant, checked)`
/// (spec.md §4.7 "Allele discordance bookkeeping").
pub fn discordance_over_segment(markers: &Markers, seg: &HapPairSegment) -> (u64, u64) {
    let lo = markers.index_at_or_after(seg.start_pos);
    let hi = markers.index_at_or_after(seg.incl_end_pos + 1);
    let mut discordant = 0u64;
    let mut checked = 0u64;
    for m in lo..hi.min(markers.len()) {
        checked += 1;
        if markers.allele(m, seg.h1 as usize) != markers.allele(m, seg.h2 as usize) {
            discordant += 1;
        }
    }
    (discordant, checked)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn markers_with_span(n: usize) -> Markers {
        let mut m = Markers::new(0, 4);
        for i in 0..n {
            m.push_marker(i as u64 * 1000, i as f64 * 0.1, &[0, 0, 0, 0], 2);
        }
        m
    }

    #[test]
    fn output_loci_are_within_span_and_evenly_spaced() {
        let markers = markers_with_span(50);
        let loci = output_loci(&markers, 2.0);
        assert!(!loci.is_empty());
        for w in loci.windows(2) {
            assert!((w[1].cm - w[0].cm - 0.02).abs() < 1e-9);
        }
    }

    #[test]
    fn partition_at_unions_only_covering_segments() {
        let segs = vec![
            HapPairSegment::new(0, 1, 0, 10_000),
            HapPairSegment::new(2, 3, 5_000, 6_000),
        ];
        let mut analysis = ClustAnalysis::new(segs);
        let locus_before = OutputLocus { chrom: 0, base_pos: 1_000, cm: 0.0 };
        let mut p = analysis.partition_at(&locus_before, 4);
        let idx = p.cluster_indices();
        assert_eq!(idx[0], idx[1]);
        assert_ne!(idx[2], idx[3]);

        let locus_mid = OutputLocus { chrom: 0, base_pos: 5_500, cm: 0.1 };
        let mut p2 = analysis.partition_at(&locus_mid, 4);
        let idx2 = p2.cluster_indices();
        assert_eq!(idx2[0], idx2[1]);
        assert_eq!(idx2[2], idx2[3]);

        let locus_after = OutputLocus { chrom: 0, base_pos: 8_000, cm: 0.2 };
        let mut p3 = analysis.partition_at(&locus_after, 4);
        let idx3 = p3.cluster_indices();
        assert_eq!(idx3[0], idx3[1]);
        assert_ne!(idx3[2], idx3[3]);
    }
}
