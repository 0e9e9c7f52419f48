use ibdclust::args::Config;

fn main() {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let cfg = match Config::parse(args) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("ibdclust: {e}");
            std::process::exit(1);
        }
    };

    if let Err(e) = ibdclust::logging::init_logging(&cfg.out) {
        eprintln!("ibdclust: failed to initialize logging: {e}");
        std::process::exit(1);
    }

    if let Err(e) = ibdclust::run(&cfg) {
        log::error!("{e:#}");
        std::process::exit(1);
    }
}
