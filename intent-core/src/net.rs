//! Address and port arithmetic.
//!
//! Addresses are held as inclusive `u128` intervals tagged with their family so
//! IPv4 and IPv6 literals share one representation. [`RangeSet`] keeps merged,
//! sorted intervals and answers containment questions used by canonicalization
//! and shadow detection.

use std::fmt::{self, Display, Formatter};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const PORT_MAX: u16 = u16::MAX;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NetError {
    #[error("invalid address '{0}'")]
    InvalidAddress(String),
    #[error("invalid prefix length in '{0}'")]
    InvalidPrefix(String),
    #[error("invalid address range '{0}'")]
    InvalidRange(String),
    #[error("invalid port list '{0}'")]
    InvalidPort(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Family {
    V4,
    V6,
}

impl Family {
    fn bits(self) -> u32 {
        match self {
            Family::V4 => 32,
            Family::V6 => 128,
        }
    }

    fn max(self) -> u128 {
        match self {
            Family::V4 => u128::from(u32::MAX),
            Family::V6 => u128::MAX,
        }
    }
}

/// Inclusive address interval within one family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AddrRange {
    pub family: Family,
    pub start: u128,
    pub end: u128,
}

impl AddrRange {
    pub fn full(family: Family) -> Self {
        Self {
            family,
            start: 0,
            end: family.max(),
        }
    }

    pub fn contains(&self, other: &AddrRange) -> bool {
        self.family == other.family && self.start <= other.start && other.end <= self.end
    }

    /// Prefix length when the interval is exactly one CIDR block.
    pub fn prefix_len(&self) -> Option<u32> {
        let bits = self.family.bits();
        (0..=bits).find(|prefix| {
            let (start, end) = cidr_bounds(self.family, self.start, *prefix);
            start == self.start && end == self.end
        })
    }
}

impl Display for AddrRange {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self.prefix_len() {
            Some(prefix) => write!(f, "{}/{}", render_ip(self.family, self.start), prefix),
            None => write!(
                f,
                "{}-{}",
                render_ip(self.family, self.start),
                render_ip(self.family, self.end)
            ),
        }
    }
}

/// Parse a host, CIDR block, or `a-b` range.
pub fn parse_address(input: &str) -> Result<AddrRange, NetError> {
    let value = input.trim();
    if let Some((low, high)) = value.split_once('-') {
        let low = parse_ip(low.trim()).ok_or_else(|| NetError::InvalidRange(value.to_string()))?;
        let high =
            parse_ip(high.trim()).ok_or_else(|| NetError::InvalidRange(value.to_string()))?;
        if low.0 != high.0 || low.1 > high.1 {
            return Err(NetError::InvalidRange(value.to_string()));
        }
        return Ok(AddrRange {
            family: low.0,
            start: low.1,
            end: high.1,
        });
    }

    let (ip_part, prefix_part) = match value.split_once('/') {
        Some((ip, prefix)) => (ip.trim(), Some(prefix.trim())),
        None => (value, None),
    };
    let (family, addr) =
        parse_ip(ip_part).ok_or_else(|| NetError::InvalidAddress(value.to_string()))?;
    let prefix = match prefix_part {
        Some(raw) => raw
            .parse::<u32>()
            .ok()
            .filter(|p| *p <= family.bits())
            .ok_or_else(|| NetError::InvalidPrefix(value.to_string()))?,
        None => family.bits(),
    };
    let (start, end) = cidr_bounds(family, addr, prefix);
    Ok(AddrRange { family, start, end })
}

/// Canonical spelling of an address literal, `None` when `input` is not a literal.
pub fn canonical_address(input: &str) -> Option<String> {
    parse_address(input).ok().map(|range| range.to_string())
}

fn parse_ip(input: &str) -> Option<(Family, u128)> {
    match input.parse::<IpAddr>().ok()? {
        IpAddr::V4(v4) => Some((Family::V4, u128::from(u32::from(v4)))),
        IpAddr::V6(v6) => Some((Family::V6, u128::from(v6))),
    }
}

fn render_ip(family: Family, value: u128) -> String {
    match family {
        Family::V4 => Ipv4Addr::from(value as u32).to_string(),
        Family::V6 => Ipv6Addr::from(value).to_string(),
    }
}

fn cidr_bounds(family: Family, addr: u128, prefix: u32) -> (u128, u128) {
    let host_bits = family.bits() - prefix;
    if host_bits >= 128 {
        return (0, u128::MAX);
    }
    let host_mask = (1u128 << host_bits) - 1;
    let start = addr & !host_mask & family.max();
    (start, start | host_mask)
}

/// Sorted, merged set of address intervals.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RangeSet {
    ranges: Vec<AddrRange>,
}

impl RangeSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, range: AddrRange) {
        self.ranges.push(range);
        self.ranges.sort();
        let mut merged: Vec<AddrRange> = Vec::with_capacity(self.ranges.len());
        for current in self.ranges.drain(..) {
            match merged.last_mut() {
                Some(last)
                    if last.family == current.family
                        && current.start <= last.end.saturating_add(1) =>
                {
                    last.end = last.end.max(current.end);
                }
                _ => merged.push(current),
            }
        }
        self.ranges = merged;
    }

    pub fn ranges(&self) -> &[AddrRange] {
        &self.ranges
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    /// True when the set spans the whole space of `family`.
    pub fn is_full(&self, family: Family) -> bool {
        self.covers_range(&AddrRange::full(family))
    }

    pub fn covers_range(&self, range: &AddrRange) -> bool {
        // merged intervals never touch, so containment must be by a single interval
        self.ranges.iter().any(|own| own.contains(range))
    }

    pub fn covers(&self, other: &RangeSet) -> bool {
        other.ranges.iter().all(|range| self.covers_range(range))
    }
}

/// Inclusive port interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PortRange {
    pub start: u16,
    pub end: u16,
}

impl PortRange {
    pub const ALL: PortRange = PortRange {
        start: 0,
        end: PORT_MAX,
    };

    pub fn contains(&self, other: &PortRange) -> bool {
        self.start <= other.start && other.end <= self.end
    }
}

impl Display for PortRange {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        if self.start == self.end {
            write!(f, "{}", self.start)
        } else {
            write!(f, "{}-{}", self.start, self.end)
        }
    }
}

/// Parse a comma separated port list into sorted, merged ranges.
///
/// `any` and the empty string both mean every port.
pub fn parse_ports(input: &str) -> Result<Vec<PortRange>, NetError> {
    let value = input.trim();
    if value.is_empty() || value.eq_ignore_ascii_case("any") {
        return Ok(vec![PortRange::ALL]);
    }

    let mut ranges = Vec::new();
    for item in value.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        let range = match item.split_once('-') {
            Some((low, high)) => PortRange {
                start: parse_port(low, value)?,
                end: parse_port(high, value)?,
            },
            None => {
                let port = parse_port(item, value)?;
                PortRange {
                    start: port,
                    end: port,
                }
            }
        };
        if range.start > range.end {
            return Err(NetError::InvalidPort(value.to_string()));
        }
        ranges.push(range);
    }
    if ranges.is_empty() {
        return Err(NetError::InvalidPort(value.to_string()));
    }
    Ok(merge_ports(ranges))
}

fn parse_port(raw: &str, whole: &str) -> Result<u16, NetError> {
    raw.trim()
        .parse::<u16>()
        .map_err(|_| NetError::InvalidPort(whole.to_string()))
}

pub fn merge_ports(mut ranges: Vec<PortRange>) -> Vec<PortRange> {
    ranges.sort();
    let mut merged: Vec<PortRange> = Vec::with_capacity(ranges.len());
    for current in ranges {
        match merged.last_mut() {
            Some(last) if u32::from(current.start) <= u32::from(last.end) + 1 => {
                last.end = last.end.max(current.end);
            }
            _ => merged.push(current),
        }
    }
    merged
}

/// Canonical spelling of a port list: merged ranges, or `any` for the full range.
pub fn canonical_ports(input: &str) -> Result<String, NetError> {
    Ok(render_ports(&parse_ports(input)?))
}

pub fn render_ports(ranges: &[PortRange]) -> String {
    if ranges == [PortRange::ALL] {
        return "any".to_string();
    }
    ranges
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(",")
}

/// True when every range of `inner` lies inside one range of `outer`.
///
/// Both slices must already be merged.
pub fn ports_cover(outer: &[PortRange], inner: &[PortRange]) -> bool {
    inner
        .iter()
        .all(|range| outer.iter().any(|own| own.contains(range)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_and_cidr_literals_normalize() {
        assert_eq!(canonical_address(" 10.1.2.3/16 ").as_deref(), Some("10.1.0.0/16"));
        assert_eq!(canonical_address("192.0.2.7").as_deref(), Some("192.0.2.7/32"));
        assert_eq!(canonical_address("2001:db8::1/32").as_deref(), Some("2001:db8::/32"));
        assert_eq!(canonical_address("0.0.0.0/0").as_deref(), Some("0.0.0.0/0"));
        assert_eq!(canonical_address("web-servers"), None);
    }

    #[test]
    fn aligned_ranges_render_as_cidr() {
        assert_eq!(
            canonical_address("10.0.0.0-10.0.0.255").as_deref(),
            Some("10.0.0.0/24")
        );
        assert_eq!(
            canonical_address("10.0.0.1-10.0.0.5").as_deref(),
            Some("10.0.0.1-10.0.0.5")
        );
        assert!(parse_address("10.0.0.9-10.0.0.1").is_err());
        assert!(parse_address("10.0.0.1-2001:db8::1").is_err());
    }

    #[test]
    fn full_v6_space_round_trips() {
        let range = parse_address("::/0").expect("parse");
        assert_eq!(range, AddrRange::full(Family::V6));
        assert_eq!(range.to_string(), "::/0");
    }

    #[test]
    fn range_set_merges_adjacent_blocks() {
        let mut set = RangeSet::new();
        set.insert(parse_address("10.0.0.0/25").expect("a"));
        set.insert(parse_address("10.0.0.128/25").expect("b"));
        assert_eq!(set.ranges().len(), 1);
        assert!(set.covers_range(&parse_address("10.0.0.0/24").expect("c")));
        assert!(!set.covers_range(&parse_address("10.0.1.0/24").expect("d")));
    }

    #[test]
    fn port_lists_merge_and_sort() {
        assert_eq!(canonical_ports("443, 80,80-90").expect("ports"), "80-90,443");
        assert_eq!(canonical_ports("0-65535").expect("ports"), "any");
        assert_eq!(canonical_ports("").expect("ports"), "any");
        assert!(canonical_ports("70000").is_err());
        assert!(canonical_ports("90-80").is_err());
    }

    #[test]
    fn port_cover_requires_single_containing_range() {
        let outer = parse_ports("1-1024").expect("outer");
        assert!(ports_cover(&outer, &parse_ports("22,80,443").expect("inner")));
        assert!(!ports_cover(&outer, &parse_ports("8080").expect("inner")));
    }
}
