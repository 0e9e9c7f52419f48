use std::path::Path;
use std::time::Instant;

use anyhow::Context;
use indicatif::{ProgressBar, ProgressStyle};
use log::info;

use crate::args::Config;
use crate::chrom_ids::ChromIds;
use crate::cluster::{discordance_over_segment, output_loci, ClustAnalysis};
use crate::genetic_map::GeneticMap;
use crate::global_ibs_probs::GlobalIbsProbs;
use crate::hap_pair_segment::HapPairSegment;
use crate::ibd_estimator::IbdEstimatorParams;
use crate::ibs_counts::{sample_haplotypes, IbsCounts};
use crate::markers::Markers;
use crate::pbwt;
use crate::quantile_estimator::QuantileEstimator;
use crate::stats::Stats;
use crate::vcf_input::{self, LoadedInput};
use crate::workers;
use crate::writer::{check_not_colliding, format_locus_line, IbdClustWriter};

/// Runs the full pipeline for one invocation: loads input, processes each
/// chromosome independently (spec.md §2 "no inter-chromosome state"), and
/// streams clustered output.
pub fn run(cfg: &Config) -> anyhow::Result<()> {
    let start = Instant::now();
    info!("start: {}", humantime::format_rfc3339_seconds(std::time::SystemTime::now()));
    info!("parameters: {cfg:?}");

    let out_path = output_path(&cfg.out);
    check_not_colliding(&out_path, &[cfg.gt.as_path(), cfg.map.as_path()])
        .context("validating output path")?;

    let mut chrom_ids = ChromIds::new();
    let map = GeneticMap::from_file(&cfg.map, &mut chrom_ids).context("loading genetic map")?;
    let stats = Stats::new();

    info!("loading input from {:?}", cfg.gt);
    let LoadedInput { sample_ids, n_haplotypes, chromosomes } =
        vcf_input::load(cfg, &mut chrom_ids, &map, &stats).context("loading input genotypes")?;
    stats.n_samples.store(sample_ids.len() as u64, std::sync::atomic::Ordering::Relaxed);
    stats.n_haplotypes.store(n_haplotypes as u64, std::sync::atomic::Ordering::Relaxed);
    info!(
        "loaded {} samples ({} haplotypes) across {} chromosome(s)",
        sample_ids.len(),
        n_haplotypes,
        chromosomes.len()
    );

    let mut writer = IbdClustWriter::create(&out_path, cfg.nthreads, &sample_ids)
        .with_context(|| format!("opening output {out_path:?}"))?;

    let progress = ProgressBar::new(chromosomes.len() as u64);
    progress.set_style(master_progress_bar_style());
    progress.set_message("chromosomes");

    for markers in &chromosomes {
        let chrom_name = chrom_ids.name(markers.chrom).to_owned();
        process_chromosome(cfg, &chrom_ids, markers, &stats, &mut writer)
            .with_context(|| format!("processing chromosome {chrom_name}"))?;
        progress.inc(1);
    }
    progress.finish_and_clear();

    writer.finish().context("flushing output")?;

    let elapsed = start.elapsed();
    info!(
        "done: {} output positions, mean {:.3} clusters/position, discordance rate {:.6}, wall-clock {}",
        stats.output_positions.load(std::sync::atomic::Ordering::Relaxed),
        stats.mean_clusters_per_position(),
        stats.discordance_rate(),
        humantime::format_duration(elapsed),
    );
    Ok(())
}

fn master_progress_bar_style() -> ProgressStyle {
    ProgressStyle::with_template("[{elapsed_precise}] {bar:40.green/yellow} {pos:>7}/{len:7} {msg}")
        .unwrap()
        .progress_chars("##-")
}

fn output_path(prefix: &Path) -> std::path::PathBuf {
    let mut name = prefix.as_os_str().to_owned();
    name.push(".ibdclust.gz");
    std::path::PathBuf::from(name)
}

fn process_chromosome(
    cfg: &Config,
    chrom_ids: &ChromIds,
    markers: &Markers,
    stats: &Stats,
    writer: &mut IbdClustWriter,
) -> anyhow::Result<()> {
    let chrom_name = chrom_ids.name(markers.chrom);
    info!("{chrom_name}: {} markers", markers.len());
    if markers.is_empty() {
        return Ok(());
    }

    let sample = sample_haplotypes(markers.n_haplotypes(), cfg.local_segments, cfg.seed);
    let fwd_counts = IbsCounts::build(markers, &sample, cfg.local_max_cdf);
    let global = GlobalIbsProbs::build(
        markers,
        cfg.global_loci,
        cfg.global_segments,
        cfg.global_quantile,
        cfg.global_multiple,
        cfg.seed,
    );
    let quantiles = QuantileEstimator::new(
        markers,
        &fwd_counts,
        &global,
        cfg.ne,
        cfg.gc_bp,
        cfg.gc_discord,
        cfg.discord,
        cfg.min_cdf_ratio,
    );

    let seeds = pbwt::discover_segments(markers, &markers.cm_pos, &markers.base_pos, cfg.pbwt, cfg.min_ibs_cm);
    info!("{chrom_name}: {} candidate IBS segments", seeds.len());

    let params = IbdEstimatorParams {
        quantile: cfg.quantile,
        max_its: cfg.max_its,
        fix_focus: cfg.fix_focus,
        prefocus_quantile: cfg.prefocus_quantile,
        max_rel_change: cfg.max_rel_change,
        trim_cm: cfg.trim,
        min_ibd_cm: cfg.min_ibd_cm,
    };
    let ibd_segments = workers::refine_segments(seeds, markers, &quantiles, params, cfg.nthreads)
        .context("refining IBD segment endpoints")?;
    info!("{chrom_name}: {} surviving IBD segments", ibd_segments.len());

    for seg in &ibd_segments {
        let (discordant, checked) = discordance_over_segment(markers, seg);
        stats.record_discordance(discordant, checked);
    }

    emit_clusters(cfg, chrom_ids, markers, ibd_segments, stats, writer)
}

fn emit_clusters(
    cfg: &Config,
    chrom_ids: &ChromIds,
    markers: &Markers,
    ibd_segments: Vec<HapPairSegment>,
    stats: &Stats,
    writer: &mut IbdClustWriter,
) -> anyhow::Result<()> {
    let loci = output_loci(markers, cfg.out_cm);
    let mut analysis = ClustAnalysis::new(ibd_segments);

    let mut window: Vec<String> = Vec::with_capacity(cfg.out_window_size);
    for locus in &loci {
        let mut partition = analysis.partition_at(locus, markers.n_haplotypes());
        let cluster_indices = partition.cluster_indices();
        stats.record_output_locus(partition.n_sets());
        window.push(format_locus_line(chrom_ids, locus, &cluster_indices));
        if window.len() >= cfg.out_window_size {
            writer.write_window(&window).context("writing output window")?;
            window.clear();
        }
    }
    if !window.is_empty() {
        writer.write_window(&window).context("writing final output window")?;
    }
    Ok(())
}
