// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Status codes, backend errors and the process-wide last error message.

use model_ir::ModelError;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Mutex;

/// Status returned by every exported function.
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    Success = 0,
    /// Invalid arguments or a panic inside the backend.
    StdError = 1,
    UnknownError = 2,
    InvalidFilename = 3,
    UnsupportedOnnxOpsetVersion = 4,
    OnnxParseError = 5,
    InvalidDtype = 6,
    InvalidAttributeType = 7,
    UnsupportedOperatorAttribute = 8,
    DimensionMismatch = 9,
    VariableNotFound = 10,
    IndexOutOfRange = 11,
    JsonParseError = 12,
    InvalidBackendName = 13,
    UnsupportedOperator = 14,
    FailedToConfigureOperator = 15,
    BackendError = 16,
    SameNameVariableAlreadyExist = 17,
}

impl ErrorCode {
    /// Returns the code's name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::StdError => "std error",
            Self::UnknownError => "unknown error",
            Self::InvalidFilename => "invalid filename",
            Self::UnsupportedOnnxOpsetVersion => "unsupported ONNX opset version",
            Self::OnnxParseError => "ONNX parse error",
            Self::InvalidDtype => "invalid dtype",
            Self::InvalidAttributeType => "invalid attribute type",
            Self::UnsupportedOperatorAttribute => "unsupported operator attribute",
            Self::DimensionMismatch => "dimension mismatch",
            Self::VariableNotFound => "variable not found",
            Self::IndexOutOfRange => "index out of range",
            Self::JsonParseError => "JSON parse error",
            Self::InvalidBackendName => "invalid backend name",
            Self::UnsupportedOperator => "unsupported operator",
            Self::FailedToConfigureOperator => "failed to configure operator",
            Self::BackendError => "backend error",
            Self::SameNameVariableAlreadyExist => "same name variable already exist",
        }
    }

    pub fn is_success(self) -> bool {
        self == Self::Success
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors raised inside the backend before they are flattened to an
/// [`ErrorCode`] and a message at the C boundary.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("invalid filename: {0}")]
    InvalidFilename(String),

    #[error("unsupported opset version: {0}")]
    UnsupportedOpset(String),

    #[error("model parse error: {0}")]
    OnnxParse(String),

    #[error("invalid dtype: {0}")]
    InvalidDtype(String),

    #[error("invalid attribute type: {0}")]
    InvalidAttributeType(String),

    #[error("unsupported operator attribute: {0}")]
    UnsupportedOperatorAttribute(String),

    #[error("dimension mismatch: {0}")]
    DimensionMismatch(String),

    #[error("variable not found: {0}")]
    VariableNotFound(String),

    #[error("index out of range: {0}")]
    IndexOutOfRange(String),

    #[error("backend config parse error: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("invalid backend name: {0}")]
    InvalidBackendName(String),

    #[error("unsupported operator: {0}")]
    UnsupportedOperator(String),

    #[error("failed to configure operator: {0}")]
    FailedToConfigureOperator(String),

    #[error("backend error: {0}")]
    Backend(String),

    #[error("same name variable already exists: {0}")]
    SameNameVariableAlreadyExist(String),
}

impl BackendError {
    /// Returns the status code reported for this error.
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::InvalidArgument(_) => ErrorCode::StdError,
            Self::InvalidFilename(_) => ErrorCode::InvalidFilename,
            Self::UnsupportedOpset(_) => ErrorCode::UnsupportedOnnxOpsetVersion,
            Self::OnnxParse(_) => ErrorCode::OnnxParseError,
            Self::InvalidDtype(_) => ErrorCode::InvalidDtype,
            Self::InvalidAttributeType(_) => ErrorCode::InvalidAttributeType,
            Self::UnsupportedOperatorAttribute(_) => ErrorCode::UnsupportedOperatorAttribute,
            Self::DimensionMismatch(_) => ErrorCode::DimensionMismatch,
            Self::VariableNotFound(_) => ErrorCode::VariableNotFound,
            Self::IndexOutOfRange(_) => ErrorCode::IndexOutOfRange,
            Self::JsonParse(_) => ErrorCode::JsonParseError,
            Self::InvalidBackendName(_) => ErrorCode::InvalidBackendName,
            Self::UnsupportedOperator(_) => ErrorCode::UnsupportedOperator,
            Self::FailedToConfigureOperator(_) => ErrorCode::FailedToConfigureOperator,
            Self::Backend(_) => ErrorCode::BackendError,
            Self::SameNameVariableAlreadyExist(_) => ErrorCode::SameNameVariableAlreadyExist,
        }
    }
}

impl From<ModelError> for BackendError {
    fn from(err: ModelError) -> Self {
        let msg = err.to_string();
        match err {
            ModelError::InvalidFilename { .. } => Self::InvalidFilename(msg),
            ModelError::Io(_) => Self::InvalidFilename(msg),
            ModelError::EmptyModel | ModelError::Parse(_) => Self::OnnxParse(msg),
            ModelError::UnsupportedOpset { .. } => Self::UnsupportedOpset(msg),
            ModelError::UnsupportedOperator { .. } => Self::UnsupportedOperator(msg),
            ModelError::InvalidAttribute { .. } => Self::InvalidAttributeType(msg),
            ModelError::UnsupportedDtype { .. } => Self::InvalidDtype(msg),
            ModelError::DuplicateName(_) => Self::SameNameVariableAlreadyExist(msg),
            ModelError::NoCurrentNode => Self::InvalidArgument(msg),
            ModelError::InvalidTensor { .. }
            | ModelError::Tensor(_)
            | ModelError::InvalidGraph(_) => Self::OnnxParse(msg),
        }
    }
}

// ── Last error message ─────────────────────────────────────────────

/// Shared by every handle and every thread in the process.
static LAST_ERROR: Mutex<String> = Mutex::new(String::new());

pub(crate) fn set_last_error(message: String) {
    let mut slot = LAST_ERROR.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    *slot = message;
}

/// Returns a copy of the most recent error message recorded by any call in
/// this process.
pub fn last_error_message() -> String {
    LAST_ERROR
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
        .clone()
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        *s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "unknown panic payload"
    }
}

/// Runs `f` behind the C boundary: errors become a status code plus the
/// last error message, and panics never unwind into the caller.
pub(crate) fn guarded<F>(op: &'static str, f: F) -> ErrorCode
where
    F: FnOnce() -> Result<(), BackendError>,
{
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(Ok(())) => ErrorCode::Success,
        Ok(Err(err)) => {
            let code = err.code();
            tracing::debug!("{op} failed ({code}): {err}");
            set_last_error(format!("{op}: {err}"));
            code
        }
        Err(payload) => {
            let msg = panic_message(&*payload);
            tracing::warn!("{op} panicked: {msg}");
            set_last_error(format!("{op}: panic: {msg}"));
            ErrorCode::StdError
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Serialises the tests in this binary that write the shared message.
    static MESSAGE_LOCK: Mutex<()> = Mutex::new(());

    fn lock_message() -> std::sync::MutexGuard<'static, ()> {
        MESSAGE_LOCK.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    #[test]
    fn test_guarded_records_message() {
        let _guard = lock_message();
        let code = guarded("test_op", || {
            Err(BackendError::VariableNotFound("ghost".into()))
        });
        assert_eq!(code, ErrorCode::VariableNotFound);
        let message = last_error_message();
        assert!(message.starts_with("test_op: "), "{message}");
        assert!(message.contains("ghost"), "{message}");
    }

    #[test]
    fn test_guarded_catches_panic() {
        let _guard = lock_message();
        let code = guarded("panicking_op", || panic!("boom"));
        assert_eq!(code, ErrorCode::StdError);
        assert_eq!(last_error_message(), "panicking_op: panic: boom");
    }

    #[test]
    fn test_model_error_mapping() {
        let err: BackendError = ModelError::UnsupportedOpset { version: 20, max: 13 }.into();
        assert_eq!(err.code(), ErrorCode::UnsupportedOnnxOpsetVersion);
        let err: BackendError = ModelError::EmptyModel.into();
        assert_eq!(err.code(), ErrorCode::OnnxParseError);
        let err: BackendError = ModelError::UnsupportedOperator { op: "Conv".into() }.into();
        assert_eq!(err.code(), ErrorCode::UnsupportedOperator);
    }

    #[test]
    fn test_code_names() {
        assert_eq!(ErrorCode::Success.as_str(), "success");
        assert!(ErrorCode::Success.is_success());
        assert_eq!(ErrorCode::DimensionMismatch as i32, 9);
    }
}
