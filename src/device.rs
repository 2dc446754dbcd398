use crate::error::Error;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The kind of compute unit a tensor lives on.
///
/// All in-tree engines are host engines; `Cuda` exists so that device
/// requests can be expressed (and rejected with a precise error) before an
/// accelerator engine is registered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeviceType {
    Cpu,
    Cuda,
}

/// Identifies a specific compute unit, e.g. `cpu` or `cuda:1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Device {
    device_type: DeviceType,
    index: usize,
}

impl Device {
    pub fn cpu() -> Self {
        Self {
            device_type: DeviceType::Cpu,
            index: 0,
        }
    }

    pub fn cuda(index: usize) -> Self {
        Self {
            device_type: DeviceType::Cuda,
            index,
        }
    }

    pub fn device_type(&self) -> DeviceType {
        self.device_type
    }

    pub fn index(&self) -> usize {
        self.index
    }

    /// Whether this device addresses host memory.
    pub fn is_host(&self) -> bool {
        self.device_type == DeviceType::Cpu
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.device_type {
            DeviceType::Cpu => write!(f, "cpu"),
            DeviceType::Cuda => write!(f, "cuda:{}", self.index),
        }
    }
}

impl FromStr for Device {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (kind, index) = match s.split_once(':') {
            Some((kind, index)) => {
                let index = index
                    .parse::<usize>()
                    .map_err(|_| Error::InvalidDevice(s.to_string()))?;
                (kind, index)
            }
            None => (s, 0),
        };
        match kind {
            "cpu" => Ok(Device {
                device_type: DeviceType::Cpu,
                index,
            }),
            "cuda" => Ok(Device {
                device_type: DeviceType::Cuda,
                index,
            }),
            _ => Err(Error::InvalidDevice(s.to_string())),
        }
    }
}
