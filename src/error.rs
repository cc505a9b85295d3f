//! Command error type
//!
//! Every command handler returns `CmdError`. The dispatcher formats each
//! kind differently: user input errors print as-is, service errors carry
//! the AWS error code and message, and I/O errors report the OS detail.

use aws_smithy_runtime_api::client::result::SdkError;
use aws_smithy_types::error::metadata::ProvideErrorMetadata;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CmdError {
    /// Malformed user input (bad flag, bad spec, missing argument).
    #[error("{0}")]
    Input(String),

    /// A service call failed; `detail` holds the full debug form for
    /// debug mode.
    #[error("{service} operation failed with error {code}: {message}")]
    Service {
        service: &'static str,
        code: String,
        message: String,
        detail: String,
    },

    /// Local I/O failure (unreadable credentials file, unwritable
    /// output file, ...).
    #[error("{0}")]
    Io(#[from] std::io::Error),
}

impl CmdError {
    pub fn input(msg: impl Into<String>) -> Self {
        CmdError::Input(msg.into())
    }

    /// Convert an SDK error into a `Service` error, pulling out the
    /// error code and message when the failure came from the service.
    pub fn service<E, R>(service: &'static str, err: SdkError<E, R>) -> Self
    where
        E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
        R: std::fmt::Debug,
    {
        let detail = format!("{err:?}");
        match err {
            SdkError::ServiceError(ctx) => {
                let meta = ctx.err().meta();
                CmdError::Service {
                    service,
                    code: meta.code().unwrap_or("Unknown").to_string(),
                    message: meta.message().unwrap_or("no further detail").to_string(),
                    detail,
                }
            }
            other => CmdError::Service {
                service,
                code: "RequestFailure".to_string(),
                message: other.to_string(),
                detail,
            },
        }
    }

    /// Full failure detail for debug mode; empty when there is none
    /// beyond the one-line message.
    pub fn detail(&self) -> &str {
        match self {
            CmdError::Service { detail, .. } => detail,
            _ => "",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn input_error_displays_message_only() {
        let err = CmdError::input("Bad filter spec: foo");
        assert_eq!(err.to_string(), "Bad filter spec: foo");
    }

    #[test]
    fn service_error_includes_code_and_message() {
        let err = CmdError::Service {
            service: "EC2",
            code: "UnauthorizedOperation".to_string(),
            message: "You are not authorized".to_string(),
            detail: String::new(),
        };
        assert_eq!(
            err.to_string(),
            "EC2 operation failed with error UnauthorizedOperation: You are not authorized"
        );
    }
}
