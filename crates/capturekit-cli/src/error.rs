// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Au-Zone Technologies

use std::fmt;
use std::process::ExitCode;

/// CLI-specific error type with exit code mapping
#[derive(Debug)]
pub enum CliError {
    /// Invalid command-line arguments
    InvalidArgs(String),
    /// Camera device not found or unusable
    CameraNotFound(String),
    /// Open/close gate or frame wait timed out
    Timeout(String),
    /// Device reported an error or disconnected
    Device(String),
    /// General error from the capturekit library
    General(String),
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::InvalidArgs(msg) => write!(f, "Invalid arguments: {}", msg),
            CliError::CameraNotFound(msg) => write!(f, "Camera not found: {}", msg),
            CliError::Timeout(msg) => write!(f, "Timeout: {}", msg),
            CliError::Device(msg) => write!(f, "Device error: {}", msg),
            CliError::General(msg) => write!(f, "Error: {}", msg),
        }
    }
}

impl std::error::Error for CliError {}

impl CliError {
    /// Get the exit code for this error
    pub fn exit_code(&self) -> ExitCode {
        ExitCode::from(self.code())
    }

    fn code(&self) -> u8 {
        match self {
            CliError::InvalidArgs(_) => 2,
            CliError::CameraNotFound(_) => 3,
            CliError::Timeout(_) => 6,
            CliError::Device(_) => 7,
            CliError::General(_) => 1,
        }
    }
}

/// Map capturekit::Error to CliError with appropriate exit codes
impl From<capturekit::Error> for CliError {
    fn from(err: capturekit::Error) -> Self {
        use capturekit::Error;

        match err {
            Error::Configuration(msg) => CliError::InvalidArgs(msg),
            Error::ResourceTimeout(_) => CliError::Timeout(err.to_string()),
            Error::NoUsableDevice { .. } => CliError::CameraNotFound(err.to_string()),
            Error::Device { .. } => CliError::Device(err.to_string()),
            Error::CapabilityMismatch { .. } | Error::TransientFrameDrop { .. } => {
                CliError::General(err.to_string())
            }
            Error::Io(io_err) => match io_err.kind() {
                std::io::ErrorKind::NotFound => {
                    CliError::CameraNotFound(format!("Device not found: {}", io_err))
                }
                std::io::ErrorKind::TimedOut => {
                    CliError::Timeout(format!("Operation timed out: {}", io_err))
                }
                _ => CliError::General(format!("I/O error: {}", io_err)),
            },
        }
    }
}

/// Helper function to convert result to exit code
pub fn result_to_exit_code<T>(result: Result<T, CliError>) -> ExitCode {
    match result {
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", e);
            e.exit_code()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_exit_codes() {
        assert_eq!(CliError::InvalidArgs("test".into()).code(), 2);
        assert_eq!(CliError::CameraNotFound("test".into()).code(), 3);
        assert_eq!(CliError::Timeout("test".into()).code(), 6);
        assert_eq!(CliError::Device("test".into()).code(), 7);
        assert_eq!(CliError::General("test".into()).code(), 1);
    }

    #[test]
    fn test_library_error_mapping() {
        let err: CliError = capturekit::Error::Configuration("bad".into()).into();
        assert!(matches!(err, CliError::InvalidArgs(_)));

        let err: CliError =
            capturekit::Error::ResourceTimeout(Duration::from_millis(2500)).into();
        assert!(matches!(err, CliError::Timeout(_)));

        let err: CliError = capturekit::Error::Device {
            code: Some(4),
            reason: "fault".into(),
        }
        .into();
        assert!(matches!(err, CliError::Device(_)));

        let err: CliError = capturekit::Error::NoUsableDevice {
            requested: Some("7".into()),
        }
        .into();
        assert!(matches!(err, CliError::CameraNotFound(_)));

        // A device error is never mistaken for a missing camera
        let err: CliError = capturekit::Error::Device {
            code: None,
            reason: "no usable camera device".into(),
        }
        .into();
        assert!(matches!(err, CliError::Device(_)));
    }

    #[test]
    fn test_error_display() {
        let err = CliError::CameraNotFound("7".to_string());
        assert_eq!(format!("{}", err), "Camera not found: 7");
    }
}
