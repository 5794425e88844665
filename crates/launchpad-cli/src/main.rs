//! launchpad-boot
//!
//! Starts the application bundled into this executable's last PE section.
//! There are no flags and no environment variables: the bundle is the only
//! input. Build with `--features log` for diagnostics on stderr.

#[cfg(windows)]
mod host;
mod logging;
#[cfg(windows)]
mod reflective;

use launchpad_runtime::BootError;
use tracing::error;

fn main() {
    logging::init();
    std::process::exit(exit_status(boot()));
}

#[cfg(windows)]
fn boot() -> Result<i32, BootError> {
    host::boot()
}

#[cfg(not(windows))]
fn boot() -> Result<i32, BootError> {
    error!("launchpad-boot runs on Windows only");
    Ok(launchpad_runtime::EXIT_FAILURE)
}

/// Map the bootstrap outcome to the process status.
fn exit_status(result: Result<i32, BootError>) -> i32 {
    match result {
        Ok(status) => status,
        Err(e) => {
            error!("{}", e);
            e.exit_code()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use launchpad_runtime::{EXIT_FAILURE, EXIT_FINALIZE_FAILED};

    #[test]
    fn test_status_passes_through() {
        assert_eq!(exit_status(Ok(0)), 0);
        assert_eq!(exit_status(Ok(EXIT_FAILURE)), 1);
        assert_eq!(exit_status(Ok(EXIT_FINALIZE_FAILED)), 120);
    }

    #[test]
    fn test_errors_map_to_failure() {
        assert_eq!(exit_status(Err(BootError::HostRuntimeMissing)), 1);
        assert_eq!(exit_status(Err(BootError::AlreadyInitialized)), 1);
    }
}
