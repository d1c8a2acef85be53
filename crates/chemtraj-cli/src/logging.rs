use crate::error::Result;
use std::fs::File;
use std::path::Path;
use tracing::Subscriber;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::{EnvFilter, Layer, filter::LevelFilter, fmt, prelude::*};

fn level_for(verbosity: u8, quiet: bool) -> LevelFilter {
    match (quiet, verbosity) {
        (true, _) => LevelFilter::ERROR,
        (false, 0) => LevelFilter::WARN,
        (false, 1) => LevelFilter::INFO,
        (false, 2) => LevelFilter::DEBUG,
        (false, _) => LevelFilter::TRACE,
    }
}

/// Plain-text sink with thread ids, for attaching to bug reports.
fn file_sink<S>(path: &Path) -> Result<impl Layer<S>>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    let file = File::create(path)?;
    Ok(fmt::layer()
        .with_writer(file)
        .with_ansi(false)
        .with_thread_ids(true)
        .with_target(true))
}

/// Installs the global subscriber. `RUST_LOG`, when set, overrides the
/// level chosen by `-v`/`-q`.
pub fn setup_logging(verbosity: u8, quiet: bool, log_file: Option<&Path>) -> Result<()> {
    let filter = EnvFilter::builder()
        .with_default_directive(level_for(verbosity, quiet).into())
        .from_env_lossy();
    let file_layer = log_file.map(file_sink).transpose()?;

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .compact(),
        )
        .with(file_layer)
        .init();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CliError;
    use serial_test::serial;
    use tracing::{debug, info, trace};

    #[test]
    fn quiet_wins_over_verbosity() {
        assert_eq!(level_for(0, false), LevelFilter::WARN);
        assert_eq!(level_for(1, false), LevelFilter::INFO);
        assert_eq!(level_for(2, false), LevelFilter::DEBUG);
        assert_eq!(level_for(7, false), LevelFilter::TRACE);
        assert_eq!(level_for(7, true), LevelFilter::ERROR);
    }

    #[test]
    #[serial]
    fn file_sink_writes_events_with_thread_ids() {
        let dir = tempfile::tempdir().unwrap();
        let log_path = dir.path().join("chemtraj.log");
        let subscriber = tracing_subscriber::registry()
            .with(LevelFilter::DEBUG)
            .with(file_sink(&log_path).unwrap());

        tracing::subscriber::with_default(subscriber, || {
            info!(frames = 12, "Converted trajectory.");
            debug!(path = "traj.dcd", "Opened input.");
            trace!("Filtered out.");
        });

        let content = std::fs::read_to_string(log_path).unwrap();
        assert!(content.contains("Converted trajectory."));
        assert!(content.contains("frames=12"));
        assert!(content.contains("DEBUG"));
        assert!(content.contains("ThreadId"));
        assert!(!content.contains("Filtered out."));
    }

    #[test]
    #[serial]
    fn unwritable_log_path_is_an_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = setup_logging(0, false, Some(dir.path()));
        assert!(matches!(result, Err(CliError::Io(_))));
    }
}
