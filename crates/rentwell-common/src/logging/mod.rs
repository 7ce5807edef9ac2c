//! Logging initialization shared by Rentwell binaries
//!
//! Filter resolution order:
//! 1. CLI flags (`-v/-q`)
//! 2. `RUST_LOG`
//! 3. The binary's default filter

use anyhow::Result;
use clap_verbosity_flag::{LogLevel, Verbosity};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Directive requested explicitly through `-v/-q`, if the flags moved the level off its default
pub fn flag_directive<L: LogLevel>(verbosity: &Verbosity<L>) -> Option<String> {
    let level = verbosity.log_level();
    if level == L::default() {
        return None;
    }
    Some(
        level
            .map(|l| l.to_string().to_lowercase())
            .unwrap_or_else(|| "off".to_string()),
    )
}

/// Build the filter for the given verbosity, falling back to `RUST_LOG` and then `default_filter`
pub fn resolve_filter<L: LogLevel>(
    verbosity: &Verbosity<L>,
    default_filter: &str,
) -> Result<EnvFilter> {
    let filter = match flag_directive(verbosity) {
        Some(directive) => EnvFilter::try_new(directive)?,
        None => {
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter))
        }
    };
    Ok(filter)
}

/// Install the global subscriber.
///
/// ```no_run
/// use clap::Parser;
/// use clap_verbosity_flag::{InfoLevel, Verbosity};
/// use rentwell_common::logging;
///
/// #[derive(Parser)]
/// struct Args {
///     #[clap(flatten)]
///     verbosity: Verbosity<InfoLevel>,
/// }
///
/// let args = Args::parse();
/// logging::init_logging(&args.verbosity, "rentwell_rentals=info").unwrap();
/// ```
pub fn init_logging<L: LogLevel>(verbosity: &Verbosity<L>, default_filter: &str) -> Result<()> {
    let filter = resolve_filter(verbosity, default_filter)?;

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_line_number(true)
                .compact(),
        )
        .try_init()?;

    Ok(())
}
