// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Backend configuration passed as a JSON string to model compilation.

use crate::BackendError;
use serde::{Deserialize, Serialize};

/// Name under which this backend is selected.
pub const BACKEND_NAME: &str = "cpu";

/// Options accepted in the `backend_config` string.
///
/// An empty string means all defaults. Unknown keys are rejected.
///
/// ```json
/// { "cpu_id": 0, "fuse_activations": false }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CpuBackendConfig {
    /// Device index. Only `0` exists.
    pub cpu_id: u32,
    /// Fold a `Relu` into the preceding `Gemm`, `MatMul` or `Add`.
    pub fuse_activations: bool,
}

impl Default for CpuBackendConfig {
    fn default() -> Self {
        Self {
            cpu_id: 0,
            fuse_activations: true,
        }
    }
}

impl CpuBackendConfig {
    /// Parses a backend config string.
    pub fn parse(s: &str) -> Result<Self, BackendError> {
        if s.trim().is_empty() {
            return Ok(Self::default());
        }
        let config: Self = serde_json::from_str(s)?;
        if config.cpu_id != 0 {
            return Err(BackendError::Backend(format!(
                "cpu_id {} is not available (only device 0)",
                config.cpu_id
            )));
        }
        Ok(config)
    }

    /// Serialises the config to its JSON form.
    pub fn to_json(&self) -> Result<String, BackendError> {
        Ok(serde_json::to_string(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorCode;

    #[test]
    fn test_empty_is_default() {
        assert_eq!(CpuBackendConfig::parse("").unwrap(), CpuBackendConfig::default());
        assert_eq!(CpuBackendConfig::parse("  ").unwrap(), CpuBackendConfig::default());
        assert_eq!(CpuBackendConfig::parse("{}").unwrap(), CpuBackendConfig::default());
    }

    #[test]
    fn test_partial_override() {
        let c = CpuBackendConfig::parse(r#"{"fuse_activations": false}"#).unwrap();
        assert!(!c.fuse_activations);
        assert_eq!(c.cpu_id, 0);
    }

    #[test]
    fn test_rejects_malformed_and_unknown() {
        let err = CpuBackendConfig::parse("{not json").unwrap_err();
        assert_eq!(err.code(), ErrorCode::JsonParseError);
        let err = CpuBackendConfig::parse(r#"{"threads": 4}"#).unwrap_err();
        assert_eq!(err.code(), ErrorCode::JsonParseError);
    }

    #[test]
    fn test_rejects_missing_device() {
        let err = CpuBackendConfig::parse(r#"{"cpu_id": 1}"#).unwrap_err();
        assert_eq!(err.code(), ErrorCode::BackendError);
    }

    #[test]
    fn test_json_round_trip() {
        let c = CpuBackendConfig {
            cpu_id: 0,
            fuse_activations: false,
        };
        assert_eq!(CpuBackendConfig::parse(&c.to_json().unwrap()).unwrap(), c);
    }
}
