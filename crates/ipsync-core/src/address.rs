//! Validated public network address

use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;

use crate::error::{Error, Result};

/// Address family of a [`PublicAddress`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AddressFamily {
    V4,
    V6,
}

/// A validated public network address (IPv4 or IPv6 literal)
///
/// Construction always goes through [`PublicAddress::parse`] or
/// `From<IpAddr>`, so an instance is never empty or malformed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PublicAddress(IpAddr);

impl PublicAddress {
    /// Parse an address from text, trimming surrounding whitespace
    ///
    /// Lookup services usually terminate the body with a newline, and
    /// hand-edited state files may carry one as well.
    pub fn parse(text: &str) -> Result<Self> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Err(Error::invalid_address("empty value"));
        }

        trimmed
            .parse::<IpAddr>()
            .map(Self)
            .map_err(|_| Error::invalid_address(format!("'{}' is not an IP address", trimmed)))
    }

    /// The underlying IP address
    pub fn ip(&self) -> IpAddr {
        self.0
    }

    /// The address family
    pub fn family(&self) -> AddressFamily {
        match self.0 {
            IpAddr::V4(_) => AddressFamily::V4,
            IpAddr::V6(_) => AddressFamily::V6,
        }
    }
}

impl From<IpAddr> for PublicAddress {
    fn from(ip: IpAddr) -> Self {
        Self(ip)
    }
}

impl FromStr for PublicAddress {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for PublicAddress {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<PublicAddress> for String {
    fn from(address: PublicAddress) -> Self {
        address.to_string()
    }
}

impl fmt::Display for PublicAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}
