use std::io::Write;

use driftwatch::cli::parse_cli;
use driftwatch::logging::init_logging;
use driftwatch::{ExitStatus, run};

fn main() {
    let cli = parse_cli();
    init_logging(cli.log_format, cli.verbose);

    let mut out = std::io::stdout().lock();
    let status = match run(cli, &mut out) {
        Ok(status) => status,
        Err(err) => {
            eprintln!("driftwatch: {err:#}");
            ExitStatus::Failure
        }
    };
    if let Err(err) = out.flush() {
        eprintln!("driftwatch: failed to flush stdout: {err}");
    }
    drop(out);

    std::process::exit(status.code());
}
