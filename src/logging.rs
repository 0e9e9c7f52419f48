use std::path::{Path, PathBuf};

use anyhow::Context;
use log::LevelFilter;
use log4rs::append::console::{ConsoleAppender, Target};
use log4rs::append::file::FileAppender;
use log4rs::config::{Appender, Config, Root};
use log4rs::encode::pattern::PatternEncoder;
use log4rs::Handle;

const PATTERN: &str = "{d(%Y-%m-%dT%H:%M:%S%.3f)} {l} {t} - {m}{n}";

/// Dual-sink logging: human-readable lines to stderr, mirrored to a log
/// file alongside the output prefix, truncated on each run (spec.md §6
/// "Log"). Returns the handle so the caller keeps it alive for the run.
pub fn init_logging(out_prefix: &Path) -> anyhow::Result<Handle> {
    let stderr = ConsoleAppender::builder()
        .encoder(Box::new(PatternEncoder::new(PATTERN)))
        .target(Target::Stderr)
        .build();

    let mut log_name = out_prefix.as_os_str().to_owned();
    log_name.push(".log");
    let log_path = PathBuf::from(log_name);
    let file = FileAppender::builder()
        .encoder(Box::new(PatternEncoder::new(PATTERN)))
        .append(false)
        .build(&log_path)
        .with_context(|| format!("opening log file {log_path:?}"))?;

    let config = Config::builder()
        .appender(Appender::builder().build("stderr", Box::new(stderr)))
        .appender(Appender::builder().build("file", Box::new(file)))
        .build(Root::builder().appender("stderr").appender("file").build(LevelFilter::Info))
        .context("building logging configuration")?;

    log4rs::init_config(config).context("initializing logging")
}
