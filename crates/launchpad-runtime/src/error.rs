//! Bootstrap error types.

use launchpad_bundle::BundleError;

/// Process status for an ordinary failure.
pub const EXIT_FAILURE: i32 = 1;

/// Process status when the interpreter fails to finalize.
pub const EXIT_FINALIZE_FAILED: i32 = 120;

/// Fatal failures while starting the interpreter.
#[derive(Debug, thiserror::Error)]
pub enum BootError {
    /// The bundle could not be located, opened or assembled
    #[error(transparent)]
    Bundle(#[from] BundleError),

    /// The reflective loader could not be instantiated
    #[error("Reflective loader unavailable")]
    LoaderUnavailable,

    /// No library in the bundle is the interpreter image
    #[error("Bundle carries no host runtime image")]
    HostRuntimeMissing,

    /// The host runtime lacks a required export
    #[error("Host runtime does not export {0}")]
    MissingExport(String),

    /// The interpreter was started before the bootstrap ran
    #[error("Interpreter is already initialized")]
    AlreadyInitialized,

    /// An argument could not be decoded from the native encoding
    #[error("Unable to decode the command line argument #{position}")]
    ArgumentDecode { position: usize },

    /// The interpreter refused the built-in module table
    #[error("Interpreter rejected the built-in module table")]
    InittabRejected,

    /// The frozen table has no entry module
    #[error("Entry module {0} is not frozen")]
    EntryModuleMissing(String),
}

impl BootError {
    /// Process status reported for this error.
    pub fn exit_code(&self) -> i32 {
        EXIT_FAILURE
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_errors_exit_with_generic_failure() {
        let errors = [
            BootError::HostRuntimeMissing,
            BootError::ArgumentDecode { position: 2 },
            BootError::EntryModuleMissing("__main__".into()),
            BootError::Bundle(BundleError::EmptyEntry("a.pyc".into())),
        ];
        for error in &errors {
            assert_eq!(error.exit_code(), EXIT_FAILURE);
        }
        assert_ne!(EXIT_FAILURE, EXIT_FINALIZE_FAILED);
    }

    #[test]
    fn test_messages() {
        assert_eq!(
            BootError::ArgumentDecode { position: 3 }.to_string(),
            "Unable to decode the command line argument #3"
        );
        assert_eq!(
            BootError::MissingExport("Py_Initialize".into()).to_string(),
            "Host runtime does not export Py_Initialize"
        );
    }
}
