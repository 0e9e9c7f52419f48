use std::fs;
use std::io::Read as IoRead;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use flate2::read::MultiGzDecoder;

fn run_ibdclust(args: &[String]) -> anyhow::Result<Output> {
    let exe = Path::new(env!("CARGO_BIN_EXE_ibdclust"));
    assert!(exe.exists());
    let output = Command::new(exe).args(args).output()?;
    Ok(output)
}

fn write_vcf(dir: &Path, name: &str, contig: &str, samples: &[&str], records: &[String]) -> PathBuf {
    let path = dir.join(name);
    let mut body = String::new();
    body.push_str("##fileformat=VCFv4.2\n");
    body.push_str(&format!("##contig=<ID={contig}>\n"));
    body.push_str("#CHROM\tPOS\tID\tREF\tALT\tQUAL\tFILTER\tINFO\tFORMAT\t");
    body.push_str(&samples.join("\t"));
    body.push('\n');
    for record in records {
        body.push_str(record);
        body.push('\n');
    }
    fs::write(&path, body).unwrap();
    path
}

fn write_map(dir: &Path, name: &str, chrom: &str, anchors: &[(u64, f64)]) -> PathBuf {
    let path = dir.join(name);
    let mut body = String::new();
    for (pos, cm) in anchors {
        body.push_str(&format!("{chrom}\t.\t{cm}\t{pos}\n"));
    }
    fs::write(&path, body).unwrap();
    path
}

fn read_output_lines(gz_path: &Path) -> Vec<String> {
    let fh = fs::File::open(gz_path).unwrap();
    let mut decoder = MultiGzDecoder::new(fh);
    let mut text = String::new();
    decoder.read_to_string(&mut text).unwrap();
    text.lines().map(|l| l.to_string()).collect()
}

fn args(pairs: &[(&str, &str)]) -> Vec<String> {
    pairs.iter().map(|(k, v)| format!("{k}={v}")).collect()
}

#[test]
fn single_biallelic_marker_two_samples_produces_one_locus_with_header() {
    let dir = tempfile::tempdir().unwrap();
    let vcf = write_vcf(
        dir.path(),
        "in.vcf",
        "1",
        &["sample1", "sample2"],
        &["1\t100000\t.\tA\tC,G,T\t.\t.\t.\tGT\t0|1\t2|3".to_string()],
    );
    let map = write_map(dir.path(), "map.txt", "1", &[(0, 0.0), (1_000_000, 10.0)]);
    let out_prefix = dir.path().join("out");

    let mut a = args(&[
        ("gt", vcf.to_str().unwrap()),
        ("map", map.to_str().unwrap()),
        ("out", out_prefix.to_str().unwrap()),
        ("nthreads", "1"),
    ]);
    a.push("out-cm=0.02".to_string());
    let output = run_ibdclust(&a).unwrap();
    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));

    let gz_path = PathBuf::from(format!("{}.ibdclust.gz", out_prefix.to_str().unwrap()));
    let lines = read_output_lines(&gz_path);
    assert_eq!(lines[0], "CHROM\tPOS\tCM\tsample1\tsample2");
    // a single marker's genetic position lands on at most one out-cm grid point
    assert!(lines.len() <= 2);
    if let Some(locus_line) = lines.get(1) {
        let fields: Vec<&str> = locus_line.split('\t').collect();
        assert_eq!(fields[0], "1");
        assert_eq!(fields.len(), 5);
    }
}

#[test]
fn identical_haplotypes_over_a_long_span_cluster_together_somewhere() {
    let dir = tempfile::tempdir().unwrap();
    let mut records = Vec::new();
    for i in 0..40u64 {
        let pos = 100_000 + i * 10_000;
        records.push(format!("1\t{pos}\t.\tA\tC\t.\t.\t.\tGT\t0|0\t1|1"));
    }
    let vcf = write_vcf(dir.path(), "in.vcf", "1", &["sample1", "sample2"], &records);
    let map = write_map(dir.path(), "map.txt", "1", &[(0, 0.0), (2_000_000, 20.0)]);
    let out_prefix = dir.path().join("out");

    let a = args(&[
        ("gt", vcf.to_str().unwrap()),
        ("map", map.to_str().unwrap()),
        ("out", out_prefix.to_str().unwrap()),
        ("nthreads", "1"),
        ("min-maf", "0"),
        ("min-ibs-cm", "0.1"),
        ("min-ibd-cm", "0.1"),
    ]);
    let output = run_ibdclust(&a).unwrap();
    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));

    let gz_path = PathBuf::from(format!("{}.ibdclust.gz", out_prefix.to_str().unwrap()));
    let lines = read_output_lines(&gz_path);
    assert!(lines.len() > 1);
    let any_merged = lines[1..].iter().any(|line| {
        let fields: Vec<&str> = line.split('\t').collect();
        let col1: Vec<&str> = fields[3].split('|').collect();
        col1[0] == col1[1]
    });
    assert!(any_merged, "two identical haplotypes across a long span should share a cluster at some locus");
}

#[test]
fn reruns_with_the_same_seed_are_byte_identical() {
    let dir = tempfile::tempdir().unwrap();
    let mut records = Vec::new();
    for i in 0..20u64 {
        let pos = 100_000 + i * 20_000;
        records.push(format!("1\t{pos}\t.\tA\tC\t.\t.\t.\tGT\t0|1\t1|0"));
    }
    let vcf = write_vcf(dir.path(), "in.vcf", "1", &["sample1", "sample2"], &records);
    let map = write_map(dir.path(), "map.txt", "1", &[(0, 0.0), (2_000_000, 20.0)]);

    let out1 = dir.path().join("run1");
    let out2 = dir.path().join("run2");
    for out in [&out1, &out2] {
        let a = args(&[
            ("gt", vcf.to_str().unwrap()),
            ("map", map.to_str().unwrap()),
            ("out", out.to_str().unwrap()),
            ("nthreads", "1"),
            ("min-maf", "0"),
            ("seed", "42"),
        ]);
        let output = run_ibdclust(&a).unwrap();
        assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));
    }

    let lines1 = read_output_lines(&PathBuf::from(format!("{}.ibdclust.gz", out1.to_str().unwrap())));
    let lines2 = read_output_lines(&PathBuf::from(format!("{}.ibdclust.gz", out2.to_str().unwrap())));
    assert_eq!(lines1, lines2);
}

#[test]
fn unphased_genotype_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let vcf = write_vcf(
        dir.path(),
        "in.vcf",
        "1",
        &["sample1", "sample2"],
        &["1\t100000\t.\tA\tC\t.\t.\t.\tGT\t0/1\t1|0".to_string()],
    );
    let map = write_map(dir.path(), "map.txt", "1", &[(0, 0.0), (1_000_000, 10.0)]);
    let out_prefix = dir.path().join("out");

    let a = args(&[
        ("gt", vcf.to_str().unwrap()),
        ("map", map.to_str().unwrap()),
        ("out", out_prefix.to_str().unwrap()),
        ("nthreads", "1"),
        ("min-maf", "0"),
    ]);
    let output = run_ibdclust(&a).unwrap();
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("unphased"), "stderr: {stderr}");
}

#[test]
fn missing_input_file_is_reported_and_nonzero_exit() {
    let dir = tempfile::tempdir().unwrap();
    let map = write_map(dir.path(), "map.txt", "1", &[(0, 0.0), (1_000_000, 10.0)]);
    let out_prefix = dir.path().join("out");

    let a = args(&[
        ("gt", dir.path().join("does-not-exist.vcf").to_str().unwrap()),
        ("map", map.to_str().unwrap()),
        ("out", out_prefix.to_str().unwrap()),
    ]);
    let output = run_ibdclust(&a).unwrap();
    assert!(!output.status.success());
}

#[test]
fn output_path_colliding_with_input_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let vcf = write_vcf(
        dir.path(),
        "in.vcf",
        "1",
        &["sample1", "sample2"],
        &["1\t100000\t.\tA\tC\t.\t.\t.\tGT\t0|1\t1|0".to_string()],
    );
    // named so that `out=<dir>/collide` resolves its ".ibdclust.gz" output
    // path to this exact file; the map reader doesn't care about extension.
    let map = write_map(dir.path(), "collide.ibdclust.gz", "1", &[(0, 0.0), (1_000_000, 10.0)]);
    let out_prefix = dir.path().join("collide");

    let a = args(&[
        ("gt", vcf.to_str().unwrap()),
        ("map", map.to_str().unwrap()),
        ("out", out_prefix.to_str().unwrap()),
    ]);
    let output = run_ibdclust(&a).unwrap();
    assert!(!output.status.success());
}

#[test]
fn excluded_sample_is_dropped_from_header_and_haplotype_count() {
    let dir = tempfile::tempdir().unwrap();
    let vcf = write_vcf(
        dir.path(),
        "in.vcf",
        "1",
        &["sample1", "sample2"],
        &["1\t100000\t.\tA\tC\t.\t.\t.\tGT\t0|1\t1|0".to_string()],
    );
    let map = write_map(dir.path(), "map.txt", "1", &[(0, 0.0), (1_000_000, 10.0)]);
    let exclude = dir.path().join("exclude.txt");
    fs::write(&exclude, "sample2\n").unwrap();
    let out_prefix = dir.path().join("out");

    let a = args(&[
        ("gt", vcf.to_str().unwrap()),
        ("map", map.to_str().unwrap()),
        ("out", out_prefix.to_str().unwrap()),
        ("excludesamples", exclude.to_str().unwrap()),
        ("min-maf", "0"),
    ]);
    let output = run_ibdclust(&a).unwrap();
    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));

    let gz_path = PathBuf::from(format!("{}.ibdclust.gz", out_prefix.to_str().unwrap()));
    let lines = read_output_lines(&gz_path);
    assert_eq!(lines[0], "CHROM\tPOS\tCM\tsample1");
}
