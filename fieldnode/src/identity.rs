//! Node identity derived from a network hardware address.

use std::fmt;
use std::path::Path;

use tracing::debug;

use crate::error::{NodeError, Result};

/// Configuration value that asks for the identity to be detected.
pub const AUTO_NODE_ID: &str = "auto";

/// Where Linux exposes network interfaces.
pub const SYSFS_NET: &str = "/sys/class/net";

/// Stable identity of a node.
///
/// Rendered as canonical uppercase hex with every byte zero-padded, so
/// `0a:1b:...` becomes `0A1B...`. Used as the broker session identity and
/// inside the configuration topic name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NodeIdentity {
    bytes: Vec<u8>,
    hex: String,
}

impl NodeIdentity {
    /// Build an identity from raw address bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.is_empty() {
            return Err(NodeError::identity("empty address"));
        }
        let hex = bytes.iter().map(|b| format!("{:02X}", b)).collect();
        Ok(Self {
            bytes: bytes.to_vec(),
            hex,
        })
    }

    /// Parse a hex identity, with or without `:`/`-` separators.
    ///
    /// # Example
    /// ```
    /// use fieldnode::identity::NodeIdentity;
    ///
    /// let id = NodeIdentity::parse("aa:bb:cc:dd:ee:ff").unwrap();
    /// assert_eq!(id.as_str(), "AABBCCDDEEFF");
    /// ```
    pub fn parse(text: &str) -> Result<Self> {
        let digits: String = text
            .trim()
            .chars()
            .filter(|c| *c != ':' && *c != '-')
            .collect();

        if digits.is_empty() {
            return Err(NodeError::identity("identity is empty"));
        }
        if !digits.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(NodeError::identity(format!("'{}' is not hex", text)));
        }
        if digits.len() % 2 != 0 {
            return Err(NodeError::identity(format!(
                "'{}' has an odd number of hex digits",
                text
            )));
        }

        let bytes = (0..digits.len())
            .step_by(2)
            .map(|i| u8::from_str_radix(&digits[i..i + 2], 16))
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| NodeError::identity(e.to_string()))?;

        Self::from_bytes(&bytes)
    }

    /// Read the hardware address of a network interface.
    ///
    /// With no interface named, the first interface (in name order) that is
    /// not loopback and has a non-zero address is used.
    pub fn from_sysfs(net_dir: impl AsRef<Path>, interface: Option<&str>) -> Result<Self> {
        let net_dir = net_dir.as_ref();

        if let Some(interface) = interface {
            return read_address(net_dir, interface)?.ok_or_else(|| {
                NodeError::identity(format!("interface '{}' has no hardware address", interface))
            });
        }

        let mut names: Vec<String> = std::fs::read_dir(net_dir)?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.file_name().to_string_lossy().into_owned())
            .filter(|name| name != "lo")
            .collect();
        names.sort();

        for name in &names {
            match read_address(net_dir, name) {
                Ok(Some(identity)) => {
                    debug!(interface = %name, identity = %identity, "Using hardware address");
                    return Ok(identity);
                }
                Ok(None) => {}
                Err(e) => debug!(interface = %name, error = %e, "Skipping interface"),
            }
        }

        Err(NodeError::identity(format!(
            "no interface with a hardware address under {}",
            net_dir.display()
        )))
    }

    /// Resolve the configured identity.
    ///
    /// `"auto"` reads the hardware address from sysfs; anything else is
    /// parsed as hex.
    pub fn resolve(node_id: &str, interface: Option<&str>) -> Result<Self> {
        if node_id == AUTO_NODE_ID {
            Self::from_sysfs(SYSFS_NET, interface)
        } else {
            Self::parse(node_id)
        }
    }

    /// Canonical hex form.
    pub fn as_str(&self) -> &str {
        &self.hex
    }

    /// Raw address bytes.
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }
}

impl fmt::Display for NodeIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.hex)
    }
}

/// `Ok(None)` when the interface exists but its address is all zeros.
fn read_address(net_dir: &Path, interface: &str) -> Result<Option<NodeIdentity>> {
    let path = net_dir.join(interface).join("address");
    let content = std::fs::read_to_string(&path)?;
    let identity = NodeIdentity::parse(&content)?;

    if identity.bytes.iter().all(|b| *b == 0) {
        Ok(None)
    } else {
        Ok(Some(identity))
    }
}
