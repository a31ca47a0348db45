//! Address range expressions.
//!
//! An expression is a comma-separated list of segments. Each segment is one of
//!
//! - `A-B` with `B` a full address: an inclusive range (`10.0.0.1-10.0.0.9`)
//! - `A-N` with `N` a decimal octet: replaces the last octet of `A` (`10.0.0.1-9`)
//! - `net/len`: every usable host of a CIDR block
//! - a single address
//!
//! Segments are parsed independently; a bad one is logged and skipped.

use std::collections::BTreeSet;
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::str::FromStr;

use ipnet::IpNet;
use thiserror::Error;

/// Upper bound on the addresses one IPv6 segment may produce. IPv4 segments
/// are never capped.
pub const MAX_SEGMENT_ADDRESSES: u128 = 1 << 20;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RangeError {
    #[error("empty segment")]
    Empty,

    #[error("invalid address '{0}'")]
    InvalidAddress(String),

    #[error("invalid CIDR block '{0}'")]
    InvalidCidr(String),

    #[error("invalid last octet '{0}' (expected 0-255)")]
    InvalidOctet(String),

    #[error("last-octet shorthand requires an IPv4 start address")]
    ShorthandNotIpv4,

    #[error("range endpoints are of different address families")]
    FamilyMismatch,

    #[error("range start {start} is after end {end}")]
    Reversed { start: IpAddr, end: IpAddr },

    #[error("IPv6 segment expands to {count} addresses (limit {})", MAX_SEGMENT_ADDRESSES)]
    TooLarge { count: u128 },
}

/// One parsed segment of a range expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressRange {
    Single(IpAddr),
    Cidr(IpNet),
    DottedPair { start: IpAddr, end: IpAddr },
    LastOctet { start: Ipv4Addr, end_octet: u8 },
}

impl FromStr for AddressRange {
    type Err = RangeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(RangeError::Empty);
        }

        let range = if let Some((a, b)) = s.split_once('-') {
            parse_dash_range(a.trim(), b.trim())?
        } else if s.contains('/') {
            let net: IpNet = s
                .parse()
                .map_err(|_| RangeError::InvalidCidr(s.to_string()))?;
            AddressRange::Cidr(net.trunc())
        } else {
            AddressRange::Single(parse_addr(s)?)
        };

        let count = range.len();
        if !range.is_v4() && count > MAX_SEGMENT_ADDRESSES {
            return Err(RangeError::TooLarge { count });
        }
        Ok(range)
    }
}

fn parse_addr(s: &str) -> Result<IpAddr, RangeError> {
    s.parse()
        .map_err(|_| RangeError::InvalidAddress(s.to_string()))
}

fn parse_dash_range(a: &str, b: &str) -> Result<AddressRange, RangeError> {
    let start = parse_addr(a)?;

    if b.contains('.') {
        let end = parse_addr(b)?;
        if start.is_ipv4() != end.is_ipv4() {
            return Err(RangeError::FamilyMismatch);
        }
        if start > end {
            return Err(RangeError::Reversed { start, end });
        }
        return Ok(AddressRange::DottedPair { start, end });
    }

    let IpAddr::V4(start) = start else {
        return Err(RangeError::ShorthandNotIpv4);
    };
    let end_octet: u8 = b
        .parse()
        .map_err(|_| RangeError::InvalidOctet(b.to_string()))?;
    let start_octet = start.octets()[3];
    if end_octet < start_octet {
        let mut end = start.octets();
        end[3] = end_octet;
        return Err(RangeError::Reversed {
            start: IpAddr::V4(start),
            end: IpAddr::V4(Ipv4Addr::from(end)),
        });
    }
    Ok(AddressRange::LastOctet { start, end_octet })
}

impl AddressRange {
    /// Number of addresses this segment expands to.
    #[allow(clippy::len_without_is_empty)]
    pub fn len(&self) -> u128 {
        let (lo, hi) = self.bounds();
        hi.saturating_sub(lo) + 1
    }

    /// Inclusive numeric bounds. Parsing guarantees `lo <= hi`.
    fn bounds(&self) -> (u128, u128) {
        match *self {
            AddressRange::Single(ip) => (to_u128(ip), to_u128(ip)),
            AddressRange::DottedPair { start, end } => (to_u128(start), to_u128(end)),
            AddressRange::LastOctet { start, end_octet } => {
                let base = u32::from(start) & 0xffff_ff00;
                (u32::from(start) as u128, (base | end_octet as u32) as u128)
            }
            AddressRange::Cidr(net) => {
                let first = to_u128(net.network());
                let last = to_u128(net.broadcast());
                let host_bits = net.max_prefix_len() - net.prefix_len();
                match net {
                    // /31 and /32 have no network/broadcast to exclude.
                    IpNet::V4(_) if host_bits >= 2 => (first + 1, last - 1),
                    // IPv6 has no broadcast; skip the subnet-router anycast address.
                    IpNet::V6(_) if host_bits >= 2 => (first + 1, last),
                    _ => (first, last),
                }
            }
        }
    }

    fn is_v4(&self) -> bool {
        match self {
            AddressRange::Single(ip) => ip.is_ipv4(),
            AddressRange::DottedPair { start, .. } => start.is_ipv4(),
            AddressRange::LastOctet { .. } => true,
            AddressRange::Cidr(net) => matches!(net, IpNet::V4(_)),
        }
    }

    /// The concrete addresses, in ascending order.
    pub fn addresses(&self) -> impl Iterator<Item = IpAddr> {
        let v4 = self.is_v4();
        let (lo, hi) = self.bounds();
        (lo..=hi).map(move |n| from_u128(n, v4))
    }
}

impl fmt::Display for AddressRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AddressRange::Single(ip) => write!(f, "{ip}"),
            AddressRange::Cidr(net) => write!(f, "{net}"),
            AddressRange::DottedPair { start, end } => write!(f, "{start}-{end}"),
            AddressRange::LastOctet { start, end_octet } => write!(f, "{start}-{end_octet}"),
        }
    }
}

fn to_u128(ip: IpAddr) -> u128 {
    match ip {
        IpAddr::V4(v4) => u32::from(v4) as u128,
        IpAddr::V6(v6) => u128::from(v6),
    }
}

fn from_u128(n: u128, v4: bool) -> IpAddr {
    if v4 {
        IpAddr::V4(Ipv4Addr::from(n as u32))
    } else {
        IpAddr::V6(Ipv6Addr::from(n))
    }
}

/// Parse every segment of `expression`, returning the valid ones and the
/// rejected segments with their errors.
pub fn parse_expression(expression: &str) -> (Vec<AddressRange>, Vec<(String, RangeError)>) {
    let mut ranges = Vec::new();
    let mut rejected = Vec::new();

    for segment in expression.split(',') {
        let segment = segment.trim();
        if segment.is_empty() {
            continue;
        }
        match segment.parse::<AddressRange>() {
            Ok(range) => ranges.push(range),
            Err(e) => rejected.push((segment.to_string(), e)),
        }
    }

    (ranges, rejected)
}

/// Expand a range expression into a deduplicated, ascending address list.
///
/// Invalid segments are logged and skipped; an entirely invalid expression
/// yields an empty list.
pub fn expand(expression: &str) -> Vec<IpAddr> {
    let (ranges, rejected) = parse_expression(expression);

    for (segment, error) in &rejected {
        tracing::warn!(segment = %segment, error = %error, "Skipping invalid range segment");
    }

    let addresses: BTreeSet<IpAddr> = ranges.iter().flat_map(|r| r.addresses()).collect();

    tracing::debug!(
        segments = ranges.len(),
        rejected = rejected.len(),
        addresses = addresses.len(),
        "Expanded range expression"
    );

    addresses.into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ips(list: &[&str]) -> Vec<IpAddr> {
        list.iter().map(|s| s.parse().unwrap()).collect()
    }

    #[test]
    fn test_dotted_pair_range() {
        assert_eq!(
            expand("10.0.0.1-10.0.0.3"),
            ips(&["10.0.0.1", "10.0.0.2", "10.0.0.3"])
        );
    }

    #[test]
    fn test_cidr_excludes_network_and_broadcast() {
        assert_eq!(expand("10.0.0.0/30"), ips(&["10.0.0.1", "10.0.0.2"]));

        for prefix in [24u8, 25, 28, 29, 30] {
            let expected = (1usize << (32 - prefix)) - 2;
            let got = expand(&format!("192.168.4.0/{prefix}"));
            assert_eq!(got.len(), expected, "prefix /{prefix}");
            assert!(!got.contains(&"192.168.4.0".parse().unwrap()));
        }
    }

    #[test]
    fn test_cidr_host_bits_are_truncated() {
        assert_eq!(expand("10.0.0.2/30"), ips(&["10.0.0.1", "10.0.0.2"]));
    }

    #[test]
    fn test_small_prefixes_keep_all_addresses() {
        assert_eq!(expand("10.0.0.4/31"), ips(&["10.0.0.4", "10.0.0.5"]));
        assert_eq!(expand("10.0.0.4/32"), ips(&["10.0.0.4"]));
    }

    #[test]
    fn test_reversed_shorthand_is_skipped() {
        assert!(expand("10.0.0.5-2").is_empty());
        assert!(matches!(
            "10.0.0.5-2".parse::<AddressRange>(),
            Err(RangeError::Reversed { .. })
        ));
    }

    #[test]
    fn test_shorthand_does_not_carry_into_third_octet() {
        assert!(expand("10.0.0.250-10").is_empty());
    }

    #[test]
    fn test_shorthand_range() {
        assert_eq!(
            expand("192.168.1.10-12"),
            ips(&["192.168.1.10", "192.168.1.11", "192.168.1.12"])
        );
        assert_eq!(expand("192.168.1.7-7"), ips(&["192.168.1.7"]));
    }

    #[test]
    fn test_reversed_dotted_pair_is_skipped() {
        assert!(expand("10.0.0.9-10.0.0.1").is_empty());
    }

    #[test]
    fn test_family_mismatch_is_skipped() {
        assert_eq!(
            "fe80::1-10.0.0.1".parse::<AddressRange>(),
            Err(RangeError::FamilyMismatch)
        );
        assert_eq!(
            "fe80::1-5".parse::<AddressRange>(),
            Err(RangeError::ShorthandNotIpv4)
        );
    }

    #[test]
    fn test_bad_segments_do_not_abort_others() {
        let got = expand("garbage, 10.0.0.1, 10.0.0.9-300, 10.0.0.0/33, 10.0.0.2");
        assert_eq!(got, ips(&["10.0.0.1", "10.0.0.2"]));
    }

    #[test]
    fn test_overlaps_are_deduplicated_and_sorted() {
        let got = expand("10.0.0.3, 10.0.0.0/30, 10.0.0.1-10.0.0.4, 10.0.0.2");
        assert_eq!(
            got,
            ips(&["10.0.0.1", "10.0.0.2", "10.0.0.3", "10.0.0.4"])
        );
    }

    #[test]
    fn test_numeric_not_lexical_order() {
        let got = expand("10.0.0.10, 10.0.0.9, 10.0.0.100");
        assert_eq!(got, ips(&["10.0.0.9", "10.0.0.10", "10.0.0.100"]));
    }

    #[test]
    fn test_empty_input() {
        assert!(expand("").is_empty());
        assert!(expand(" , ,").is_empty());
        assert!(expand("not-an-ip").is_empty());
    }

    #[test]
    fn test_ipv6_single_and_cidr() {
        assert_eq!(expand("2001:db8::1"), ips(&["2001:db8::1"]));
        assert_eq!(
            expand("2001:db8::/126"),
            ips(&["2001:db8::1", "2001:db8::2", "2001:db8::3"])
        );
    }

    #[test]
    fn test_oversized_segment_rejected() {
        assert!(matches!(
            "2001:db8::/64".parse::<AddressRange>(),
            Err(RangeError::TooLarge { .. })
        ));
        assert!(expand("2001:db8::/100").is_empty());
        assert_eq!(expand("2001:db8::/108").len(), (1 << 20) - 1);
    }

    #[test]
    fn test_large_ipv4_blocks_are_not_capped() {
        let net: AddressRange = "10.0.0.0/8".parse().unwrap();
        assert_eq!(net.len(), (1 << 24) - 2);

        let hosts = expand("10.0.0.0/11");
        assert_eq!(hosts.len(), (1 << 21) - 2);
        assert_eq!(hosts[0], "10.0.0.1".parse::<IpAddr>().unwrap());
        assert_eq!(
            hosts[hosts.len() - 1],
            "10.31.255.254".parse::<IpAddr>().unwrap()
        );

        let pair: AddressRange = "10.0.0.0-10.32.0.0".parse().unwrap();
        assert_eq!(pair.len(), (1 << 21) + 1);
    }

    #[test]
    fn test_parse_expression_reports_rejections() {
        let (ranges, rejected) = parse_expression("10.0.0.1, 10.0.0.5-2, bogus");
        assert_eq!(ranges, vec![AddressRange::Single("10.0.0.1".parse().unwrap())]);
        assert_eq!(rejected.len(), 2);
        assert_eq!(rejected[0].0, "10.0.0.5-2");
    }

    #[test]
    fn test_display_roundtrip() {
        for s in ["10.0.0.1", "10.0.0.0/24", "10.0.0.1-10.0.0.5", "10.0.0.1-5"] {
            let r: AddressRange = s.parse().unwrap();
            assert_eq!(r.to_string(), s);
        }
    }
}
