use shape_lang::{
    config::{Config, LOG_ENV, SOURCE_EXTENSION},
    driver,
};
use std::env;
use std::process;

fn main() {
    init_tracing();

    let mut args = env::args().skip(1);
    let Some(filename) = args.next() else {
        eprintln!("Usage: shape <filename.{SOURCE_EXTENSION}> [args...]");
        process::exit(1);
    };
    if !filename.ends_with(&format!(".{SOURCE_EXTENSION}")) {
        eprintln!("Invalid file extension. Only .{SOURCE_EXTENSION} files are allowed.");
        process::exit(1);
    }

    let config = Config::from_env(filename, args.collect());
    match driver::run_file(config) {
        Ok(code) => process::exit(code),
        Err(err) => {
            err.report();
            process::exit(1);
        }
    }
}

/// Logs go to stderr, and only when `SHAPE_LOG` is set.
fn init_tracing() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    if env::var(LOG_ENV).is_ok() {
        let filter = EnvFilter::from_env(LOG_ENV);
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_target(true)
                    .with_level(true),
            )
            .with(filter)
            .init();
    }
}
