//! Execution device selection.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{EmbedError, Result};

/// Requested device, as written in config or on the command line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DevicePreference {
    /// CUDA when available, otherwise CPU
    #[default]
    Auto,
    Cpu,
    Cuda,
}

impl FromStr for DevicePreference {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "cpu" => Ok(Self::Cpu),
            "cuda" | "gpu" => Ok(Self::Cuda),
            other => Err(format!("unknown device '{other}' (expected auto, cpu or cuda)")),
        }
    }
}

/// Device the session actually runs on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Device {
    Cpu,
    Cuda,
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cpu => write!(f, "CPU"),
            Self::Cuda => write!(f, "CUDA"),
        }
    }
}

impl DevicePreference {
    pub fn resolve(self) -> Result<Device> {
        self.resolve_with(cuda_available())
    }

    fn resolve_with(self, cuda: bool) -> Result<Device> {
        match self {
            Self::Cpu => Ok(Device::Cpu),
            Self::Auto if cuda => Ok(Device::Cuda),
            Self::Auto => Ok(Device::Cpu),
            Self::Cuda if cuda => Ok(Device::Cuda),
            Self::Cuda => Err(EmbedError::model_unavailable(
                "CUDA execution provider",
                "Build with `--features cuda` and install the CUDA and cuDNN libraries, or set device = \"cpu\".",
            )),
        }
    }
}

#[cfg(feature = "cuda")]
fn cuda_available() -> bool {
    use ort::ep::{ExecutionProvider, CUDA};
    CUDA::default()
        .is_available()
        .unwrap_or(false)
}

#[cfg(not(feature = "cuda"))]
fn cuda_available() -> bool {
    false
}
