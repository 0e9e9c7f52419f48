use crate::hap_pair_segment::{sort_and_merge_by_pair, HapPairSegment};
use crate::markers::AlleleSource;

/// Runs `pbwt` interleaved PBWT scans over markers `a, a+pbwt, a+2*pbwt, ...`
/// for `a in 0..pbwt`, emits long IBS haplotype-pair segments from each, and
/// merges the results (spec.md §4.4).
pub fn discover_segments(
    markers: &dyn AlleleSource,
    cm_pos: &[f64],
    base_pos: &[u64],
    pbwt: usize,
    min_ibs_cm: f64,
) -> Vec<HapPairSegment> {
    let pbwt = pbwt.max(1);
    let min_ibs_morgan = min_ibs_cm / 100.0;
    let n_markers = markers.n_markers();
    let mut all = Vec::new();
    for offset in 0..pbwt {
        let scanned: Vec<usize> = (offset..n_markers).step_by(pbwt).collect();
        if scanned.is_empty() {
            continue;
        }
        all.extend(run_scan(markers, &scanned, cm_pos, base_pos, min_ibs_morgan));
    }
    sort_and_merge_by_pair(all)
}

/// Largest `start` with `cMPos[start] + minIbsMorgan <= cMPos[at]`.
fn max_ibs_start(cm_pos: &[f64], at: usize, min_ibs_morgan: f64) -> Option<usize> {
    let target = cm_pos[at] - min_ibs_morgan;
    let idx = cm_pos.partition_point(|&c| c <= target);
    if idx == 0 {
        None
    } else {
        Some(idx - 1)
    }
}

fn run_scan(
    markers: &dyn AlleleSource,
    scanned: &[usize],
    cm_pos: &[f64],
    base_pos: &[u64],
    min_ibs_morgan: f64,
) -> Vec<HapPairSegment> {
    let n_hap = markers.n_haplotypes();
    let mut a: Vec<u32> = (0..n_hap as u32).collect();
    // Scan-local divergence: d[j] is the index into `scanned` of the
    // earliest processed marker from which A[j-1] and A[j] agree onward.
    let mut d: Vec<usize> = vec![0; n_hap];
    let mut segments = Vec::new();

    for (si, &m) in scanned.iter().enumerate() {
        let n_alleles = markers.n_alleles(m) as usize;
        let mut p: Vec<usize> = vec![si + 1; n_alleles.max(1)];
        let mut buckets: Vec<Vec<u32>> = vec![Vec::new(); n_alleles.max(1)];
        let mut div_buckets: Vec<Vec<usize>> = vec![Vec::new(); n_alleles.max(1)];

        for j in 0..n_hap {
            let hap = a[j];
            let allele = markers.allele(m, hap as usize) as usize;
            for t in p.iter_mut() {
                *t = (*t).max(d[j]);
            }
            buckets[allele].push(hap);
            div_buckets[allele].push(p[allele]);
            p[allele] = 0;
        }

        let mut new_a = Vec::with_capacity(n_hap);
        let mut new_d = Vec::with_capacity(n_hap);
        for (bucket, divs) in buckets.into_iter().zip(div_buckets.into_iter()) {
            new_a.extend(bucket);
            new_d.extend(divs);
        }
        a = new_a;
        d = new_d;

        let is_last = si == scanned.len() - 1;
        let max_start = max_ibs_start(cm_pos, m, min_ibs_morgan);
        let next_marker = if is_last { None } else { Some(scanned[si + 1]) };

        for j in 1..n_hap {
            let (h_prev, h_cur) = (a[j - 1], a[j]);
            let next_differs = match next_marker {
                None => true,
                Some(m_next) => {
                    markers.allele(m_next, h_prev as usize) != markers.allele(m_next, h_cur as usize)
                }
            };
            if !next_differs {
                continue;
            }
            let d_idx = d[j];
            if d_idx >= scanned.len() {
                continue;
            }
            let start_marker = scanned[d_idx];
            let Some(max_start) = max_start else { continue };
            if start_marker > max_start {
                continue;
            }
            segments.push(HapPairSegment::new(
                h_prev,
                h_cur,
                base_pos[start_marker],
                base_pos[m],
            ));
        }
    }

    segments
}
