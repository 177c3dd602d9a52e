//! Errors surfaced by the typed command wrappers.

use thiserror::Error;

use crate::errors::CommandError;

/// Failure of a typed guider command.
#[derive(Debug, Error)]
pub enum GuiderError {
    /// An argument failed client-side validation; nothing was sent.
    #[error("invalid argument for {method}: {reason}")]
    InvalidArgument {
        /// Command method name.
        method: &'static str,
        /// What was wrong.
        reason: String,
    },
    /// The server refused the command.
    #[error("{method} rejected ({hint}): {message} (code {code})")]
    Rejected {
        /// Command method name.
        method: &'static str,
        /// What the command needs in order to succeed.
        hint: &'static str,
        /// Server error code.
        code: i64,
        /// Server error message.
        message: String,
    },
    /// The server returned a result of an unexpected shape.
    #[error("unexpected result for {method}: {source}")]
    UnexpectedResult {
        /// Command method name.
        method: &'static str,
        /// Decoder failure.
        #[source]
        source: serde_json::Error,
    },
    /// The round trip itself failed.
    #[error(transparent)]
    Command(#[from] CommandError),
}

impl GuiderError {
    pub(super) fn invalid(method: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidArgument {
            method,
            reason: reason.into(),
        }
    }

    pub(super) fn from_command(method: &'static str, error: CommandError) -> Self {
        match error {
            CommandError::Remote { code, message, .. } => Self::Rejected {
                method,
                hint: rejection_hint(method),
                code,
                message,
            },
            other => Self::Command(other),
        }
    }

    /// Method name of the command that failed.
    #[must_use]
    pub fn method(&self) -> &str {
        match self {
            Self::InvalidArgument { method, .. }
            | Self::Rejected { method, .. }
            | Self::UnexpectedResult { method, .. } => method,
            Self::Command(error) => error.method(),
        }
    }

    /// Whether repeating the same command might succeed.
    ///
    /// Only timeouts qualify; the client never retries on its own.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Command(CommandError::Timeout { .. }))
    }
}

fn rejection_hint(method: &str) -> &'static str {
    match method {
        "set_profile" => "profile id must reference an existing profile while equipment is disconnected",
        "set_connected" => "the selected profile must name reachable equipment",
        "set_exposure" => "exposure must be one of the camera's supported durations",
        "guide" => "equipment must be connected and a guide star available",
        "dither" => "guiding must be active",
        "get_star_image" => "a guide star must be selected",
        "get_camera_frame_size" | "get_ccd_temperature" | "get_cooler_status" => {
            "the camera must be connected"
        }
        "get_calibration_data" | "clear_calibration" | "flip_calibration" => {
            "the mount must be connected"
        }
        "save_image" => "an image must have been captured",
        _ => "the server could not perform the command in its current state",
    }
}
