use std::path::PathBuf;

use crate::errs::IbdError;

/// An optional `chrom=[CHROM]` or `chrom=[CHROM]:[start]-[end]` clip
/// (spec.md §6).
#[derive(Debug, Clone, PartialEq)]
pub struct ChromRegion {
    pub chrom: String,
    pub start: Option<u64>,
    pub end: Option<u64>,
}

/// Fully parsed, defaulted, and validated run configuration (spec.md §6,
/// SPEC_FULL.md §B). Parsed from `name=value` whitespace-separated tokens,
/// not `--flag value` pairs, since that's the wire format this CLI commits
/// to — `clap`'s derive conventions don't fit it.
#[derive(Debug, Clone)]
pub struct Config {
    pub gt: PathBuf,
    pub map: PathBuf,
    pub out: PathBuf,
    pub chrom: Option<ChromRegion>,
    pub excludesamples: Option<PathBuf>,
    pub excludemarkers: Option<PathBuf>,
    pub min_maf: f64,
    pub min_ibs_cm: f64,
    pub min_ibd_cm: f64,
    pub pbwt: usize,
    pub trim: f64,
    pub discord: f64,
    pub out_cm: f64,
    pub nthreads: usize,
    pub ne: f64,
    pub quantile: f64,
    pub gc_bp: u64,
    pub gc_discord: f64,
    pub local_segments: usize,
    pub local_max_cdf: f64,
    pub global_loci: usize,
    pub global_segments: usize,
    pub global_quantile: f64,
    pub global_multiple: f64,
    pub min_cdf_ratio: f64,
    pub max_its: u32,
    pub fix_focus: bool,
    pub prefocus_quantile: f64,
    pub max_rel_change: f64,
    pub out_window_size: usize,
    pub seed: u64,
}

impl Config {
    /// Parses `name=value` tokens, applying defaults and then validating.
    /// Unknown argument names are fatal (spec.md §6).
    pub fn parse<I, S>(args: I) -> Result<Self, IbdError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut raw: Vec<(String, String)> = Vec::new();
        for token in args {
            let token = token.as_ref();
            let (name, value) = token.split_once('=').ok_or_else(|| {
                IbdError::ArgParse(format!(
                    "argument {token:?} is not in name=value form"
                ))
            })?;
            raw.push((name.to_string(), value.to_string()));
        }
        Self::from_pairs(raw)
    }

    fn from_pairs(raw: Vec<(String, String)>) -> Result<Self, IbdError> {
        let mut get = |name: &str| -> Option<String> {
            raw.iter().find(|(k, _)| k == name).map(|(_, v)| v.clone())
        };

        let known = [
            "gt", "map", "out", "chrom", "excludesamples", "excludemarkers",
            "min-maf", "min-ibs-cm", "min-ibd-cm", "pbwt", "trim", "discord",
            "out-cm", "nthreads", "ne", "quantile", "gc_bp", "gc_discord",
            "local_segments", "local_max_cdf", "global_loci",
            "global_segments", "global_quantile", "global_multiple",
            "min_cdf_ratio", "max_its", "fix_focus", "prefocus_quantile",
            "max_rel_change", "out_window_size", "seed",
        ];
        for (name, _) in &raw {
            if !known.contains(&name.as_str()) {
                return Err(IbdError::ArgParse(format!("unknown argument {name:?}")));
            }
        }

        let gt = require_path(&mut get, "gt")?;
        let map = require_path(&mut get, "map")?;
        let out = require_path(&mut get, "out")?;

        let chrom = get("chrom").map(|s| parse_chrom_region(&s)).transpose()?;
        let excludesamples = get("excludesamples").map(PathBuf::from);
        let excludemarkers = get("excludemarkers").map(PathBuf::from);

        let default_threads = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);

        let cfg = Config {
            gt,
            map,
            out,
            chrom,
            excludesamples,
            excludemarkers,
            min_maf: parse_default(&mut get, "min-maf", 0.1)?,
            min_ibs_cm: parse_default(&mut get, "min-ibs-cm", 1.0)?,
            min_ibd_cm: parse_default(&mut get, "min-ibd-cm", 1.0)?,
            pbwt: parse_default(&mut get, "pbwt", 4)?,
            trim: parse_default(&mut get, "trim", 0.5)?,
            discord: parse_default(&mut get, "discord", 0.0005)?,
            out_cm: parse_default(&mut get, "out-cm", 0.02)?,
            nthreads: parse_default(&mut get, "nthreads", default_threads)?,
            ne: parse_default(&mut get, "ne", 1_000_000.0)?,
            quantile: parse_default(&mut get, "quantile", 0.5)?,
            gc_bp: parse_default(&mut get, "gc_bp", 500)?,
            gc_discord: parse_default(&mut get, "gc_discord", 0.01)?,
            local_segments: parse_default(&mut get, "local_segments", 10_000)?,
            local_max_cdf: parse_default(&mut get, "local_max_cdf", 0.5)?,
            global_loci: parse_default(&mut get, "global_loci", 500)?,
            global_segments: parse_default(&mut get, "global_segments", 10_000)?,
            global_quantile: parse_default(&mut get, "global_quantile", 0.5)?,
            global_multiple: parse_default(&mut get, "global_multiple", 3.0)?,
            min_cdf_ratio: parse_default(&mut get, "min_cdf_ratio", 1e-10)?,
            max_its: parse_default(&mut get, "max_its", 5)?,
            fix_focus: parse_default(&mut get, "fix_focus", false)?,
            prefocus_quantile: parse_default(&mut get, "prefocus_quantile", 0.5)?,
            max_rel_change: parse_default(&mut get, "max_rel_change", 0.001)?,
            out_window_size: parse_default(&mut get, "out_window_size", 500)?,
            seed: parse_default(&mut get, "seed", 42)?,
        };
        cfg.validate()?;
        Ok(cfg)
    }

    fn validate(&self) -> Result<(), IbdError> {
        if self.pbwt == 0 {
            return Err(IbdError::ArgParse("pbwt must be >= 1".to_string()));
        }
        if self.nthreads == 0 {
            return Err(IbdError::ArgParse("nthreads must be >= 1".to_string()));
        }
        if !(0.0..1.0).contains(&self.min_maf) {
            return Err(IbdError::ArgParse("min-maf must be in [0, 1)".to_string()));
        }
        Ok(())
    }
}

fn require_path(
    get: &mut impl FnMut(&str) -> Option<String>,
    name: &str,
) -> Result<PathBuf, IbdError> {
    get(name)
        .map(PathBuf::from)
        .ok_or_else(|| IbdError::ArgParse(format!("missing required argument {name}")))
}

fn parse_default<T: std::str::FromStr>(
    get: &mut impl FnMut(&str) -> Option<String>,
    name: &str,
    default: T,
) -> Result<T, IbdError> {
    match get(name) {
        None => Ok(default),
        Some(v) => v
            .parse()
            .map_err(|_| IbdError::ArgParse(format!("bad value for {name}: {v:?}"))),
    }
}

fn parse_chrom_region(raw: &str) -> Result<ChromRegion, IbdError> {
    let Some((chrom, range)) = raw.split_once(':') else {
        return Ok(ChromRegion { chrom: raw.to_string(), start: None, end: None });
    };
    let (start, end) = range.split_once('-').ok_or_else(|| {
        IbdError::ArgParse(format!("bad chrom region {raw:?}, expected CHROM:start-end"))
    })?;
    let start = start
        .parse()
        .map_err(|_| IbdError::ArgParse(format!("bad chrom region start {start:?}")))?;
    let end = end
        .parse()
        .map_err(|_| IbdError::ArgParse(format!("bad chrom region end {end:?}")))?;
    Ok(ChromRegion { chrom: chrom.to_string(), start: Some(start), end: Some(end) })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_required_arguments_and_defaults() {
        let cfg = Config::parse(["gt=in.vcf.gz", "map=map.txt", "out=prefix"]).unwrap();
        assert_eq!(cfg.gt, PathBuf::from("in.vcf.gz"));
        assert_eq!(cfg.pbwt, 4);
        assert_eq!(cfg.seed, 42);
        assert!((cfg.min_maf - 0.1).abs() < 1e-12);
    }

    #[test]
    fn missing_required_argument_is_an_error() {
        let err = Config::parse(["gt=in.vcf.gz", "map=map.txt"]).unwrap_err();
        assert!(matches!(err, IbdError::ArgParse(_)));
    }

    #[test]
    fn unknown_argument_is_fatal() {
        let err =
            Config::parse(["gt=in.vcf.gz", "map=map.txt", "out=prefix", "bogus=1"]).unwrap_err();
        assert!(matches!(err, IbdError::ArgParse(_)));
    }

    #[test]
    fn parses_chrom_region_with_and_without_range() {
        let cfg = Config::parse(["gt=a", "map=b", "out=c", "chrom=chr1:100-200"]).unwrap();
        let region = cfg.chrom.unwrap();
        assert_eq!(region.chrom, "chr1");
        assert_eq!(region.start, Some(100));
        assert_eq!(region.end, Some(200));

        let cfg2 = Config::parse(["gt=a", "map=b", "out=c", "chrom=chr2"]).unwrap();
        let region2 = cfg2.chrom.unwrap();
        assert_eq!(region2.chrom, "chr2");
        assert_eq!(region2.start, None);
    }
}
