use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use anyhow::{anyhow, bail, Context};

use crate::chrom_ids::ChromIds;

/// Base-pair back-off applied at either end of a chromosome's anchor span
/// when the outermost interval would otherwise produce a degenerate slope
/// (spec.md §3, `GeneticMap`).
const END_BACKOFF_BP: f64 = 5_000_000.0;
const END_BACKOFF_MORGAN: f64 = 0.05;

#[derive(Debug, Clone, Copy)]
struct Anchor {
    base_pos: u64,
    cm: f64,
}

/// A sorted sequence of (basePos, cM) anchors per chromosome, four-column
/// PLINK format (CHROM, ID, cM, basePos). Queries outside the anchor range
/// discard records; queries inside linearly interpolate.
#[derive(Debug, Default)]
pub struct GeneticMap {
    anchors: HashMap<u32, Vec<Anchor>>,
}

impl GeneticMap {
    pub fn from_file(path: &Path, chrom_ids: &mut ChromIds) -> anyhow::Result<Self> {
        let fh = File::open(path)
            .with_context(|| format!("opening genetic map {path:?}"))?;
        let reader = BufReader::new(fh);
        let mut by_chrom: HashMap<u32, Vec<Anchor>> = HashMap::new();
        for (lineno, line) in reader.lines().enumerate() {
            let line = line.with_context(|| {
                format!("reading genetic map {path:?} line {}", lineno + 1)
            })?;
            if line.trim().is_empty() {
                continue;
            }
            let fields: Vec<&str> = line.split_whitespace().collect();
            if fields.len() < 4 {
                bail!(
                    "genetic map {path:?} line {}: expected 4 columns (CHROM \
                     ID cM basePos), got {}",
                    lineno + 1,
                    fields.len()
                );
            }
            let chrom = fields[0];
            let raw_cm: f64 = fields[2].parse().with_context(|| {
                format!("genetic map {path:?} line {}: bad cM value", lineno + 1)
            })?;
            // Anchors are stored in Morgans (100 cM = 1 Morgan) so that every
            // downstream consumer of `cMPos` works in the same unit as `F`.
            let cm = raw_cm / 100.0;
            let base_pos: u64 = fields[3].parse().with_context(|| {
                format!(
                    "genetic map {path:?} line {}: bad basePos value",
                    lineno + 1
                )
            })?;
            let id = chrom_ids.intern(chrom);
            by_chrom.entry(id).or_default().push(Anchor { base_pos, cm });
        }
        for anchors in by_chrom.values_mut() {
            anchors.sort_by_key(|a| a.base_pos);
            force_apart_ties(anchors);
        }
        Ok(Self { anchors: by_chrom })
    }

    #[cfg(test)]
    pub fn from_anchors(chrom: u32, anchors: &[(u64, f64)]) -> Self {
        let mut anchors: Vec<Anchor> =
            anchors.iter().map(|(p, c)| Anchor { base_pos: *p, cm: *c }).collect();
        anchors.sort_by_key(|a| a.base_pos);
        force_apart_ties(&mut anchors);
        let mut map = HashMap::new();
        map.insert(chrom, anchors);
        Self { anchors: map }
    }

    pub fn has_chrom(&self, chrom: u32) -> bool {
        self.anchors.contains_key(&chrom)
    }

    /// `(firstBasePos, lastBasePos)` span of anchors for a chromosome.
    pub fn span(&self, chrom: u32) -> Option<(u64, u64)> {
        let anchors = self.anchors.get(&chrom)?;
        Some((anchors.first()?.base_pos, anchors.last()?.base_pos))
    }

    /// Interpolates the cM position of `base_pos` on `chrom`. Returns `None`
    /// when `base_pos` lies outside the anchor span, signalling to the
    /// caller that the record should be silently dropped (spec.md §7).
    pub fn interpolate(&self, chrom: u32, base_pos: u64) -> Option<f64> {
        let anchors = self.anchors.get(&chrom)?;
        if anchors.len() < 2 {
            return anchors.first().map(|a| a.cm);
        }
        let first = anchors.first().unwrap();
        let last = anchors.last().unwrap();
        if base_pos < first.base_pos || base_pos > last.base_pos {
            return None;
        }
        let idx = match anchors.binary_search_by_key(&base_pos, |a| a.base_pos) {
            Ok(i) => return Some(anchors[i].cm),
            Err(i) => i,
        };
        let lo = anchors[idx - 1];
        let hi = anchors[idx];
        let (lo, hi) = apply_backoff(anchors, idx - 1, idx, lo, hi);
        Some(linear_interp(base_pos, lo, hi))
    }
}

fn force_apart_ties(anchors: &mut [Anchor]) {
    const EPS: f64 = 1e-7;
    for i in 1..anchors.len() {
        if anchors[i].cm <= anchors[i - 1].cm {
            anchors[i].cm = anchors[i - 1].cm + EPS;
        }
    }
}

/// If the bracketing interval's slope would be degenerate (zero genetic
/// length over a wide physical span) because it sits at the extreme end of
/// the map, apply a 5 Mb / 0.05 Morgan back-off by substituting the anchor
/// a further step out, matching spec.md §3's "back-off of 5 Mb / 0.05
/// Morgan ... at the extreme ends".
fn apply_backoff(
    anchors: &[Anchor],
    lo_idx: usize,
    hi_idx: usize,
    lo: Anchor,
    hi: Anchor,
) -> (Anchor, Anchor) {
    let slope_is_degenerate = (hi.base_pos - lo.base_pos) as f64
        > END_BACKOFF_BP
        && (hi.cm - lo.cm) < 1e-9;
    if !slope_is_degenerate {
        return (lo, hi);
    }
    if lo_idx == 0 {
        if let Some(next) = anchors.get(hi_idx + 1) {
            if (next.cm - lo.cm) > END_BACKOFF_MORGAN {
                return (lo, *next);
            }
        }
    } else if hi_idx == anchors.len() - 1 {
        if let Some(prev) = anchors.get(lo_idx - 1) {
            if (hi.cm - prev.cm) > END_BACKOFF_MORGAN {
                return (*prev, hi);
            }
        }
    }
    (lo, hi)
}

fn linear_interp(base_pos: u64, lo: Anchor, hi: Anchor) -> f64 {
    let span_bp = (hi.base_pos - lo.base_pos) as f64;
    if span_bp <= 0.0 {
        return lo.cm;
    }
    let frac = (base_pos - lo.base_pos) as f64 / span_bp;
    lo.cm + frac * (hi.cm - lo.cm)
}
