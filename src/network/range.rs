//! Address range expressions.
//!
//! A range is written `<A.B.C.D>-<N>`: the dotted quad gives the three-octet
//! prefix and the first host octet, `N` is the inclusive last host octet.
//! `192.168.22.0-20` covers `192.168.22.0` through `192.168.22.20`.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RangeError {
    #[error("Malformed address range: {0}")]
    Malformed(String),
}

/// A parsed, validated address range.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AddressRange {
    prefix: [u8; 3],
    start: u8,
    end: u8,
}

impl AddressRange {
    /// Parse a `base-end` expression.
    pub fn parse(expr: &str) -> Result<Self, RangeError> {
        let malformed = |why: &str| RangeError::Malformed(format!("{:?}: {}", expr, why));

        let (base, end) = expr
            .trim()
            .split_once('-')
            .ok_or_else(|| malformed("expected `<a.b.c.d>-<end>`"))?;

        let octets: Vec<&str> = base.split('.').collect();
        if octets.len() != 4 {
            return Err(malformed("base must be a dotted quad"));
        }

        let mut parsed = [0u8; 4];
        for (slot, octet) in parsed.iter_mut().zip(&octets) {
            *slot = octet
                .parse::<u8>()
                .map_err(|_| malformed("base octets must be integers in 0..=255"))?;
        }

        // Parse wide so that `256` reports "exceeds 255" rather than "not a number".
        let end: u32 = end
            .trim()
            .parse()
            .map_err(|_| malformed("end must be a non-negative integer"))?;
        if end > 255 {
            return Err(malformed("end exceeds 255"));
        }

        let start = parsed[3];
        let end = end as u8;
        if end < start {
            return Err(malformed("range is empty (end < start)"));
        }

        Ok(Self {
            prefix: [parsed[0], parsed[1], parsed[2]],
            start,
            end,
        })
    }

    /// Number of addresses covered.
    pub fn len(&self) -> usize {
        (self.end - self.start) as usize + 1
    }

    /// Always false; a parsed range holds at least one address.
    pub fn is_empty(&self) -> bool {
        false
    }

    /// The three-octet prefix as `a.b.c`.
    pub fn prefix(&self) -> String {
        format!("{}.{}.{}", self.prefix[0], self.prefix[1], self.prefix[2])
    }

    /// All addresses, ascending by last octet.
    pub fn addresses(&self) -> Vec<String> {
        let prefix = self.prefix();
        (self.start..=self.end)
            .map(|host| format!("{}.{}", prefix, host))
            .collect()
    }
}

impl FromStr for AddressRange {
    type Err = RangeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for AddressRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}-{}", self.prefix(), self.start, self.end)
    }
}

/// Expand a range expression into its ordered address list.
pub fn expand(expr: &str) -> Result<Vec<String>, RangeError> {
    Ok(AddressRange::parse(expr)?.addresses())
}
