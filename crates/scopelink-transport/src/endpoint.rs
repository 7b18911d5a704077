//! Endpoint addressing.
//!
//! Every bridge owns two endpoints that share a base location and a logical
//! channel name and differ only in their direction suffix:
//!
//! ```text
//! /tmp/ + scope + TX  ->  /tmp/scopeTX   (bridge writes, peer reads)
//! /tmp/ + scope + RX  ->  /tmp/scopeRX   (peer writes, bridge reads)
//! ```

use std::fmt;

/// Default base location for endpoint addresses.
#[cfg(unix)]
pub const DEFAULT_BASE_PATH: &str = "/tmp/";
/// Default base location for endpoint addresses.
#[cfg(windows)]
pub const DEFAULT_BASE_PATH: &str = r"\\.\pipe\";

/// Which way packets flow through an endpoint, seen from the bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Outbound: the bridge transmits, the peer reads.
    Tx,
    /// Inbound: the peer writes, the bridge receives.
    Rx,
}

impl Direction {
    /// Suffix appended to the logical name.
    pub fn suffix(self) -> &'static str {
        match self {
            Direction::Tx => "TX",
            Direction::Rx => "RX",
        }
    }

    /// Short lowercase label used in log fields.
    pub fn label(self) -> &'static str {
        match self {
            Direction::Tx => "tx",
            Direction::Rx => "rx",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A fully qualified channel address.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Endpoint {
    base: String,
    name: String,
    direction: Direction,
}

impl Endpoint {
    /// Endpoint under the platform default base location.
    pub fn new(name: impl Into<String>, direction: Direction) -> Self {
        Self::with_base(DEFAULT_BASE_PATH, name, direction)
    }

    /// Endpoint under an explicit base location.
    ///
    /// The base is concatenated verbatim, so it normally ends with a path
    /// separator.
    pub fn with_base(
        base: impl Into<String>,
        name: impl Into<String>,
        direction: Direction,
    ) -> Self {
        Self {
            base: base.into(),
            name: name.into(),
            direction,
        }
    }

    /// The opposite-direction endpoint under the same base and name.
    pub fn counterpart(&self) -> Self {
        let direction = match self.direction {
            Direction::Tx => Direction::Rx,
            Direction::Rx => Direction::Tx,
        };
        Self {
            base: self.base.clone(),
            name: self.name.clone(),
            direction,
        }
    }

    /// `base + name + suffix`.
    pub fn address(&self) -> String {
        format!("{}{}{}", self.base, self.name, self.direction.suffix())
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.base, self.name, self.direction.suffix())
    }
}
