use crate::cli::{actions::Action, commands, commands::logging, dispatch, telemetry};
use anyhow::Result;

/// Parse the command line, bring up tracing, and hand back the action the
/// binary executes.
///
/// # Errors
///
/// Returns an error when telemetry initialization or argument dispatch
/// fails.
pub fn start() -> Result<Action> {
    let matches = commands::new().get_matches();

    let verbosity = matches
        .get_one::<u8>(logging::ARG_VERBOSITY)
        .copied()
        .unwrap_or(0);
    telemetry::init(logging::level_from_verbosity(verbosity))?;

    dispatch::handler(&matches)
}
