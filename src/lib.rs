pub mod args;
pub mod chrom_ids;
pub mod cluster;
pub mod coalescent;
pub mod errs;
pub mod genetic_map;
pub mod global_ibs_probs;
pub mod hap_pair_segment;
pub mod ibd_estimator;
pub mod ibs_counts;
pub mod ibs_length_probs;
pub mod logging;
pub mod markers;
pub mod partition;
pub mod pbwt;
pub mod pipeline;
pub mod quantile_estimator;
pub mod stats;
pub mod vcf_input;
pub mod workers;
pub mod writer;

pub use args::Config;
pub use pipeline::run;
