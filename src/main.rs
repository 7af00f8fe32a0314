use std::env;
use std::io;

fn main() {
    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_max_level(tracing::Level::WARN)
        .with_target(false)
        .init();

    let args: Vec<String> = env::args().collect();
    let exit_code = blockverity::run_cli(&args);
    std::process::exit(exit_code);
}
