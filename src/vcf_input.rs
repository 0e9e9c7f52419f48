use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use anyhow::{bail, Context};
use rust_htslib::bcf::record::GenotypeAllele;
use rust_htslib::bcf::{self, Read as BcfRead};
use rustc_hash::FxHashSet;

use crate::args::Config;
use crate::chrom_ids::ChromIds;
use crate::errs::IbdError;
use crate::genetic_map::GeneticMap;
use crate::markers::Markers;
use crate::stats::Stats;

/// The phased-genotype record stream, already MAF-filtered and clipped to
/// the genetic map's span, grouped into one `Markers` per chromosome block
/// in input order (spec.md §4.1 "Input adapter").
pub struct LoadedInput {
    pub sample_ids: Vec<String>,
    pub n_haplotypes: usize,
    pub chromosomes: Vec<Markers>,
}

/// Reads `cfg.gt` in full, applying sample/marker exclusion, the `chrom`
/// clip, MAF filtering, and genetic-map interpolation, and groups the
/// surviving records into contiguous per-chromosome `Markers`.
pub fn load(
    cfg: &Config,
    chrom_ids: &mut ChromIds,
    map: &GeneticMap,
    stats: &Stats,
) -> anyhow::Result<LoadedInput> {
    if cfg.gt.extension().and_then(|e| e.to_str()) == Some("bref3") {
        bail!(
            "{:?}: .bref3 compact-block input is not supported by this \
             build, convert to VCF/BCF first",
            cfg.gt
        );
    }
    std::fs::metadata(&cfg.gt)
        .map_err(|source| IbdError::MissingInputFile { path: cfg.gt.clone(), source })?;

    let mut reader = bcf::Reader::from_path(&cfg.gt)
        .with_context(|| format!("opening input VCF/BCF {:?}", cfg.gt))?;
    reader
        .set_threads(cfg.nthreads.max(1))
        .with_context(|| "configuring htslib decompression threads".to_string())?;

    let exclude_samples = read_id_set(cfg.excludesamples.as_deref())?;
    let exclude_markers = read_id_set(cfg.excludemarkers.as_deref())?;

    let header_sample_names: Vec<String> = reader
        .header()
        .samples()
        .iter()
        .map(|s| String::from_utf8_lossy(s).into_owned())
        .collect();
    let keep_sample: Vec<usize> = header_sample_names
        .iter()
        .enumerate()
        .filter(|(_, name)| !exclude_samples.contains(*name))
        .map(|(i, _)| i)
        .collect();
    let sample_ids: Vec<String> =
        keep_sample.iter().map(|&i| header_sample_names[i].clone()).collect();
    let n_haplotypes = keep_sample.len() * 2;

    let mut chromosomes: Vec<Markers> = Vec::new();
    let mut seen_chroms: FxHashSet<u32> = FxHashSet::default();
    let mut current_chrom: Option<u32> = None;
    let mut current: Option<Markers> = None;
    let mut current_any_in_map_span = false;

    for record_result in reader.records() {
        let record = record_result.with_context(|| format!("reading VCF record from {:?}", cfg.gt))?;
        let rid = match record.rid() {
            Some(r) => r,
            None => continue,
        };
        let chrom_name = String::from_utf8_lossy(record.header().rid2name(rid)?).into_owned();
        if let Some(region) = &cfg.chrom {
            if region.chrom != chrom_name {
                continue;
            }
        }
        let chrom_id = chrom_ids.intern(&chrom_name);
        let base_pos = (record.pos() + 1) as u64;
        if let Some(region) = &cfg.chrom {
            if region.start.is_some_and(|s| base_pos < s) || region.end.is_some_and(|e| base_pos > e) {
                continue;
            }
        }

        if current_chrom != Some(chrom_id) {
            if let Some(prev_id) = current_chrom {
                finalize_chromosome(
                    &mut chromosomes,
                    current.take(),
                    chrom_ids,
                    prev_id,
                    current_any_in_map_span,
                )?;
            }
            if seen_chroms.contains(&chrom_id) {
                bail!(IbdError::ChromosomeNotContiguous {
                    prev: chrom_ids.name(current_chrom.unwrap_or(chrom_id)).to_string(),
                    next: chrom_name.clone(),
                });
            }
            seen_chroms.insert(chrom_id);
            current_chrom = Some(chrom_id);
            current = Some(Markers::new(chrom_id, n_haplotypes));
            current_any_in_map_span = false;
        }

        stats.record_input();

        let record_id = String::from_utf8_lossy(record.id().as_slice()).into_owned();
        if exclude_markers.contains(&record_id)
            || exclude_markers.contains(&format!("{chrom_name}:{base_pos}"))
        {
            continue;
        }

        let alleles = record.alleles();
        let n_alleles = alleles.len() as u16;

        let cm_pos = match map.interpolate(chrom_id, base_pos) {
            Some(cm) => cm,
            None => continue,
        };
        current_any_in_map_span = true;

        let genotypes = record.genotypes().with_context(|| {
            format!("reading GT field at {chrom_name}:{base_pos}")
        })?;
        let mut hap_alleles = Vec::with_capacity(n_haplotypes);
        for (out_idx, &sample_idx) in keep_sample.iter().enumerate() {
            let gt = genotypes.get(sample_idx);
            if gt.len() != 2 {
                bail!(IbdError::UnphasedOrMissingGenotype {
                    chrom: chrom_name.clone(),
                    pos: base_pos,
                    sample: out_idx,
                });
            }
            for (allele_idx, allele) in gt.iter().enumerate() {
                let value = match allele {
                    GenotypeAllele::Unphased(v) | GenotypeAllele::Phased(v) => *v as u16,
                    GenotypeAllele::UnphasedMissing | GenotypeAllele::PhasedMissing => {
                        bail!(IbdError::UnphasedOrMissingGenotype {
                            chrom: chrom_name.clone(),
                            pos: base_pos,
                            sample: out_idx,
                        });
                    }
                };
                // VCF convention: the separator preceding an allele carries
                // the phase bit, so only the second (and later) alleles of
                // a genotype are marked `Phased`.
                if allele_idx > 0 && !matches!(allele, GenotypeAllele::Phased(_)) {
                    bail!(IbdError::UnphasedOrMissingGenotype {
                        chrom: chrom_name.clone(),
                        pos: base_pos,
                        sample: out_idx,
                    });
                }
                hap_alleles.push(value);
            }
        }

        if !passes_maf(&hap_alleles, n_alleles, cfg.min_maf) {
            continue;
        }
        stats.record_after_maf();
        current.as_mut().unwrap().push_marker(base_pos, cm_pos, &hap_alleles, n_alleles);
    }

    if let Some(prev_id) = current_chrom {
        finalize_chromosome(&mut chromosomes, current.take(), chrom_ids, prev_id, current_any_in_map_span)?;
    }

    Ok(LoadedInput { sample_ids, n_haplotypes, chromosomes })
}

/// Pushes the finished chromosome's markers, unless every one of its records
/// fell outside the genetic map's span (spec.md §7), in which case it bails.
/// A chromosome whose records were all inside the map's span but failed MAF
/// filtering is not a map error: it is pushed as an (possibly empty)
/// `Markers`, which the pipeline already skips harmlessly.
fn finalize_chromosome(
    chromosomes: &mut Vec<Markers>,
    markers: Option<Markers>,
    chrom_ids: &ChromIds,
    chrom_id: u32,
    any_in_map_span: bool,
) -> anyhow::Result<()> {
    let Some(markers) = markers else { return Ok(()) };
    if !any_in_map_span {
        bail!(IbdError::AllRecordsDroppedByMap { chrom: chrom_ids.name(chrom_id).to_string() });
    }
    chromosomes.push(markers);
    Ok(())
}

/// Second-largest allele count divided by the haplotype count, matching
/// spec.md §3's "second-largest allele count / (2·nSamples) ≥ min-maf".
fn passes_maf(alleles: &[u16], n_alleles: u16, min_maf: f64) -> bool {
    let mut counts = vec![0u32; n_alleles.max(1) as usize];
    for &a in alleles {
        counts[a as usize] += 1;
    }
    counts.sort_unstable_by(|a, b| b.cmp(a));
    let second = counts.get(1).copied().unwrap_or(0);
    second as f64 / alleles.len() as f64 >= min_maf
}

fn read_id_set(path: Option<&Path>) -> anyhow::Result<FxHashSet<String>> {
    let Some(path) = path else { return Ok(FxHashSet::default()) };
    let fh = File::open(path).with_context(|| format!("opening exclusion list {path:?}"))?;
    let mut set = FxHashSet::default();
    for line in BufReader::new(fh).lines() {
        let line = line.with_context(|| format!("reading exclusion list {path:?}"))?;
        let trimmed = line.trim();
        if !trimmed.is_empty() {
            set.insert(trimmed.to_string());
        }
    }
    Ok(set)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maf_filter_uses_second_largest_allele_count() {
        // 10 haplotypes: 8 major, 2 minor -> maf 0.2
        let mut alleles = vec![0u16; 8];
        alleles.extend([1, 1]);
        assert!(passes_maf(&alleles, 2, 0.1));
        assert!(!passes_maf(&alleles, 2, 0.3));
    }

    #[test]
    fn monomorphic_marker_fails_any_positive_maf_threshold() {
        let alleles = vec![0u16; 10];
        assert!(!passes_maf(&alleles, 1, 0.01));
        assert!(passes_maf(&alleles, 1, 0.0));
    }

    #[test]
    fn exclusion_list_reads_non_blank_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("exclude.txt");
        std::fs::write(&path, "sample1\n\nsample2\n").unwrap();
        let set = read_id_set(Some(&path)).unwrap();
        assert_eq!(set.len(), 2);
        assert!(set.contains("sample1"));
    }
}
