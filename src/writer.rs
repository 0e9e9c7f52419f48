use std::fs::File;
use std::io::Write;
use std::path::Path;

use anyhow::{bail, Context};
use gzp::deflate::Bgzf;
use gzp::par::compress::{ParCompress, ParCompressBuilder};

use crate::chrom_ids::ChromIds;
use crate::cluster::OutputLocus;

/// Tab-delimited, block-gzip compressed primary output
/// (`<out>.ibdclust.gz`, spec.md §6). One block-gzip member per
/// `out_window_size` loci, compressed in parallel across worker threads;
/// `gzp::ParCompress` already pipelines that internally given `num_threads`.
pub struct IbdClustWriter {
    inner: ParCompress<Bgzf>,
}

impl IbdClustWriter {
    pub fn create(path: &Path, threads: usize, sample_ids: &[String]) -> anyhow::Result<Self> {
        let fh = File::create(path).with_context(|| format!("creating output {path:?}"))?;
        let mut inner = ParCompressBuilder::<Bgzf>::new()
            .num_threads(threads.max(1))
            .map_err(|e| anyhow::anyhow!("building gzip writer: {e}"))?
            .from_writer(fh);
        let header = format_header(sample_ids);
        inner.write_all(header.as_bytes())?;
        Ok(Self { inner })
    }

    /// Writes one window's worth of already-formatted locus lines, in order.
    pub fn write_window(&mut self, lines: &[String]) -> anyhow::Result<()> {
        for line in lines {
            self.inner.write_all(line.as_bytes())?;
            self.inner.write_all(b"\n")?;
        }
        Ok(())
    }

    pub fn finish(mut self) -> anyhow::Result<()> {
        self.inner.flush()?;
        Ok(())
    }
}

fn format_header(sample_ids: &[String]) -> String {
    let mut header = String::from("CHROM\tPOS\tCM");
    for id in sample_ids {
        header.push('\t');
        header.push_str(id);
    }
    header.push('\n');
    header
}

/// Formats one output line: `CHROM POS CM <sampleId>*`, each sample column
/// the two haplotypes' cluster indices separated by `|` (spec.md §6).
pub fn format_locus_line(
    chrom_ids: &ChromIds,
    locus: &OutputLocus,
    cluster_indices: &[u32],
) -> String {
    let n_samples = cluster_indices.len() / 2;
    let mut line = format!(
        "{}\t{}\t{:.6}",
        chrom_ids.name(locus.chrom),
        locus.base_pos,
        locus.cm * 100.0
    );
    for s in 0..n_samples {
        let (a, b) = (cluster_indices[2 * s], cluster_indices[2 * s + 1]);
        line.push('\t');
        line.push_str(&format!("{a}|{b}"));
    }
    line
}

/// Refuses to overwrite an input path, per spec.md §7 "Output path collides
/// with an input path".
pub fn check_not_colliding(out_path: &Path, input_paths: &[&Path]) -> anyhow::Result<()> {
    for input in input_paths {
        if same_file(out_path, input) {
            bail!("output path {out_path:?} collides with an input path");
        }
    }
    Ok(())
}

fn same_file(a: &Path, b: &Path) -> bool {
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => a == b,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chrom_ids::ChromIds;

    #[test]
    fn formats_header_and_locus_line() {
        let mut ids = ChromIds::new();
        let chrom = ids.intern("1");
        let header = format_header(&["s1".to_string(), "s2".to_string()]);
        assert_eq!(header, "CHROM\tPOS\tCM\ts1\ts2\n");
        let locus = OutputLocus { chrom, base_pos: 1000, cm: 0.01 };
        let line = format_locus_line(&ids, &locus, &[0, 0, 1, 1]);
        assert_eq!(line, "1\t1000\t1.000000\t0|0\t1|1");
    }

    #[test]
    fn collision_check_catches_identical_paths() {
        let p = Path::new("/tmp/does-not-exist-ibdclust-test.gz");
        assert!(check_not_colliding(p, &[p]).is_err());
    }
}
