//! Handshake version negotiation.
//!
//! A client announces its version in `connect`. Clients on another major
//! version are refused; otherwise the session runs at the lower of the two
//! minor versions and the `connected` reply carries that agreed version.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Version spoken by this build.
pub const PROTOCOL_VERSION: Version = Version::new(1, 0);

/// A `major.minor` protocol version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Version {
    pub major: u8,
    pub minor: u8,
}

/// A client whose major version differs from ours.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("Unsupported protocol version {client}, server speaks {server}")]
pub struct VersionMismatch {
    pub client: Version,
    pub server: Version,
}

impl Version {
    #[must_use]
    pub const fn new(major: u8, minor: u8) -> Self {
        Self { major, minor }
    }

    /// Agree on the version to use with a client.
    ///
    /// # Errors
    ///
    /// Returns [`VersionMismatch`] when the major versions differ.
    pub fn negotiate(self, client: Version) -> Result<Version, VersionMismatch> {
        if self.major != client.major {
            return Err(VersionMismatch {
                client,
                server: self,
            });
        }
        Ok(self.min(client))
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}
