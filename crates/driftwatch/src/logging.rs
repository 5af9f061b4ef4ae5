use tracing_subscriber::EnvFilter;

use crate::cli::LogFormat;

pub const LOG_ENV_VAR: &str = "DRIFTWATCH_LOG";

/// Directive used when `DRIFTWATCH_LOG` is unset or unparseable.
pub fn default_directive(verbose: bool) -> &'static str {
    if verbose { "debug" } else { "warn" }
}

fn env_filter(verbose: bool) -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV_VAR)
        .unwrap_or_else(|_| EnvFilter::new(default_directive(verbose)))
}

/// Logs always go to stderr so stdout stays parseable for `--json`.
pub fn init_logging(format: LogFormat, verbose: bool) {
    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter(verbose))
        .with_target(false)
        .with_writer(std::io::stderr);

    let installed = match format {
        LogFormat::Human => builder.try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
    if let Err(err) = installed {
        eprintln!("driftwatch: logging already initialized: {err}");
    }
}
