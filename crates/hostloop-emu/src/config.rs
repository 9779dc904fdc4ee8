//! Network description (TOML)
//!
//! ```toml
//! [executor]
//! cancel_on_abort = false
//!
//! [[hosts]]
//! name = "peer_one"
//!
//! [[hosts.interfaces]]
//! name = "p1.eth1"
//! address = "127.3.2.1"
//! mask = "255.255.255.0"
//! gateway = "127.0.0.0"
//! ```

use crate::error::EmuError;
use hostloop_sched::{ConfigError, ExecutorConfig};
use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;
use std::path::Path;

/// Addressing of one host interface
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct InterfaceConfig {
    /// Interface name, unique within its host
    pub name: String,

    /// IPv4 address
    pub address: Ipv4Addr,

    /// Network mask
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mask: Option<Ipv4Addr>,

    /// Default gateway
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gateway: Option<Ipv4Addr>,
}

impl InterfaceConfig {
    /// Build from dotted-quad strings
    pub fn parse(
        name: &str,
        address: &str,
        mask: Option<&str>,
        gateway: Option<&str>,
    ) -> Result<Self, EmuError> {
        let config = Self {
            name: name.to_string(),
            address: parse_addr(address)?,
            mask: mask.map(parse_addr).transpose()?,
            gateway: gateway.map(parse_addr).transpose()?,
        };
        config.validate().map_err(EmuError::Config)?;
        Ok(config)
    }

    /// Validate name and mask
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.name.is_empty() {
            return Err(ConfigError::Invalid(
                "Interface name cannot be empty".to_string(),
            ));
        }
        if let Some(mask) = self.mask {
            if !is_contiguous_mask(mask) {
                return Err(ConfigError::Invalid(format!(
                    "Interface {} has a non-contiguous mask: {}",
                    self.name, mask
                )));
            }
        }
        Ok(())
    }

    /// Prefix length of the mask, if one is set
    pub fn prefix_len(&self) -> Option<u32> {
        self.mask.map(|mask| u32::from(mask).leading_ones())
    }
}

fn parse_addr(text: &str) -> Result<Ipv4Addr, EmuError> {
    text.trim()
        .parse()
        .map_err(|_| EmuError::InvalidAddress(text.to_string()))
}

fn is_contiguous_mask(mask: Ipv4Addr) -> bool {
    let bits = u32::from(mask);
    bits.leading_ones() + bits.trailing_zeros() >= 32
}

/// One emulated host
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct HostConfig {
    /// Host name, unique within the network
    pub name: String,

    /// Interfaces attached to the bus
    #[serde(default)]
    pub interfaces: Vec<InterfaceConfig>,
}

/// Complete network description
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct NetworkConfig {
    /// Settings shared by the bus and host executors
    #[serde(default)]
    pub executor: ExecutorConfig,

    /// Hosts on the bus
    #[serde(default)]
    pub hosts: Vec<HostConfig>,
}

impl NetworkConfig {
    /// Parse a network description from a file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_str(&content)
    }

    /// Parse a network description from a string
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(content: &str) -> Result<Self, ConfigError> {
        let config: NetworkConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the description
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.executor.validate()?;

        let mut host_names = FxHashSet::default();
        for host in &self.hosts {
            if host.name.is_empty() {
                return Err(ConfigError::Invalid(
                    "Host name cannot be empty".to_string(),
                ));
            }
            if !host_names.insert(host.name.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "Duplicate host: {}",
                    host.name
                )));
            }

            let mut interface_names = FxHashSet::default();
            for interface in &host.interfaces {
                interface.validate()?;
                if !interface_names.insert(interface.name.as_str()) {
                    return Err(ConfigError::Invalid(format!(
                        "Duplicate interface {} on host {}",
                        interface.name, host.name
                    )));
                }
            }
        }
        Ok(())
    }
}
