//! Network address parsing: IP addresses, Unix socket paths, CIDR blocks and
//! `host:port` endpoints.

use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::path::PathBuf;
use std::str::FromStr;

const UNIX_SCHEME: &str = "unix:";

#[lithium_derive::lithium_error]
#[derive(PartialEq, Eq)]
pub enum AddressError {
    #[error("Invalid address{}: {message}", format_context(.context))]
    Invalid { message: Cow<'static, str>, context: Option<Cow<'static, str>> },

    #[error("Invalid port{}: {message}", format_context(.context))]
    InvalidPort { message: Cow<'static, str>, context: Option<Cow<'static, str>> },

    #[error("Invalid prefix length{}: {message}", format_context(.context))]
    InvalidPrefix { message: Cow<'static, str>, context: Option<Cow<'static, str>> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AddressKind {
    Ipv4,
    Ipv6,
    Unix,
}

/// A parsed socket address target.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Address {
    V4(Ipv4Addr),
    V6(Ipv6Addr),
    Unix(PathBuf),
}

impl Address {
    /// Accepts `192.168.1.10`, `fe80::1`, `[::1]`, `unix:/run/lithium.sock` and
    /// absolute paths (`/run/lithium.sock`).
    ///
    /// # Errors
    /// [`AddressError::Invalid`] for anything else, including empty Unix paths.
    pub fn parse(raw: &str) -> Result<Self, AddressError> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(invalid(raw, "empty input"));
        }

        if let Some(path) = raw.strip_prefix(UNIX_SCHEME) {
            if path.is_empty() {
                return Err(invalid(raw, "missing socket path"));
            }
            return Ok(Self::Unix(PathBuf::from(path)));
        }
        if raw.starts_with('/') {
            return Ok(Self::Unix(PathBuf::from(raw)));
        }

        let unbracketed = raw.strip_prefix('[').and_then(|r| r.strip_suffix(']'));
        if let Some(inner) = unbracketed {
            return inner.parse::<Ipv6Addr>().map(Self::V6).map_err(|e| invalid(raw, &e.to_string()));
        }

        raw.parse::<IpAddr>().map(Self::from).map_err(|e| invalid(raw, &e.to_string()))
    }

    #[must_use]
    pub const fn kind(&self) -> AddressKind {
        match self {
            Self::V4(_) => AddressKind::Ipv4,
            Self::V6(_) => AddressKind::Ipv6,
            Self::Unix(_) => AddressKind::Unix,
        }
    }

    #[must_use]
    pub const fn ip(&self) -> Option<IpAddr> {
        match self {
            Self::V4(ip) => Some(IpAddr::V4(*ip)),
            Self::V6(ip) => Some(IpAddr::V6(*ip)),
            Self::Unix(_) => None,
        }
    }

    /// Bit string of the address: 32 characters for IPv4, 128 for IPv6.
    ///
    /// Unix sockets have no binary form.
    #[must_use]
    pub fn to_binary(&self) -> Option<String> {
        match self {
            Self::V4(ip) => Some(format!("{:032b}", u32::from(*ip))),
            Self::V6(ip) => Some(format!("{:0128b}", u128::from(*ip))),
            Self::Unix(_) => None,
        }
    }

    /// Inclusive range check; `false` across families and for Unix sockets.
    #[must_use]
    pub fn is_in_range(&self, start: &Self, end: &Self) -> bool {
        match (self, start, end) {
            (Self::V4(ip), Self::V4(lo), Self::V4(hi)) => {
                (u32::from(*lo)..=u32::from(*hi)).contains(&u32::from(*ip))
            },
            (Self::V6(ip), Self::V6(lo), Self::V6(hi)) => {
                (u128::from(*lo)..=u128::from(*hi)).contains(&u128::from(*ip))
            },
            _ => false,
        }
    }
}

impl From<IpAddr> for Address {
    fn from(ip: IpAddr) -> Self {
        match ip {
            IpAddr::V4(v4) => Self::V4(v4),
            IpAddr::V6(v6) => Self::V6(v6),
        }
    }
}

impl FromStr for Address {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::V4(ip) => write!(f, "{ip}"),
            Self::V6(ip) => write!(f, "{ip}"),
            Self::Unix(path) => write!(f, "{UNIX_SCHEME}{}", path.display()),
        }
    }
}

/// An IP network in CIDR notation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Cidr {
    network: IpAddr,
    prefix: u8,
}

impl Cidr {
    /// Parses `10.0.0.0/8` or `fd00::/8`. Host bits are cleared.
    ///
    /// # Errors
    /// [`AddressError::Invalid`] for a bad address or missing `/`,
    /// [`AddressError::InvalidPrefix`] for a prefix longer than the family allows.
    pub fn parse(raw: &str) -> Result<Self, AddressError> {
        let (addr, prefix) =
            raw.trim().split_once('/').ok_or_else(|| invalid(raw, "expected <address>/<prefix>"))?;
        let ip: IpAddr = addr.parse().map_err(|e: std::net::AddrParseError| invalid(raw, &e.to_string()))?;
        let prefix: u8 = prefix.parse().map_err(|_| AddressError::InvalidPrefix {
            message: format!("'{prefix}' is not a number").into(),
            context: Some(raw.to_owned().into()),
        })?;

        let max = if ip.is_ipv4() { 32 } else { 128 };
        if prefix > max {
            return Err(AddressError::InvalidPrefix {
                message: format!("{prefix} exceeds {max}").into(),
                context: Some(raw.to_owned().into()),
            });
        }

        let network = match ip {
            IpAddr::V4(v4) => IpAddr::V4(Ipv4Addr::from(u32::from(v4) & mask_v4(prefix))),
            IpAddr::V6(v6) => IpAddr::V6(Ipv6Addr::from(u128::from(v6) & mask_v6(prefix))),
        };
        Ok(Self { network, prefix })
    }

    #[must_use]
    pub const fn network(&self) -> IpAddr {
        self.network
    }

    #[must_use]
    pub const fn prefix(&self) -> u8 {
        self.prefix
    }

    #[must_use]
    pub fn contains(&self, ip: &IpAddr) -> bool {
        match (self.network, ip) {
            (IpAddr::V4(net), IpAddr::V4(ip)) => {
                u32::from(*ip) & mask_v4(self.prefix) == u32::from(net)
            },
            (IpAddr::V6(net), IpAddr::V6(ip)) => {
                u128::from(*ip) & mask_v6(self.prefix) == u128::from(net)
            },
            _ => false,
        }
    }

    /// Like [`contains`](Self::contains) for a parsed [`Address`]; Unix sockets never match.
    #[must_use]
    pub fn contains_address(&self, address: &Address) -> bool {
        address.ip().is_some_and(|ip| self.contains(&ip))
    }
}

impl fmt::Display for Cidr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.network, self.prefix)
    }
}

/// A host with an optional port, as written in device connection strings.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Endpoint {
    pub host: String,
    pub port: Option<u16>,
}

impl Endpoint {
    /// Parses `host`, `host:port`, `[v6]`, `[v6]:port` and bare IPv6 literals.
    ///
    /// # Errors
    /// [`AddressError::Invalid`] for an empty host or unbalanced brackets,
    /// [`AddressError::InvalidPort`] for a non-numeric or out-of-range port.
    pub fn parse(raw: &str) -> Result<Self, AddressError> {
        let raw = raw.trim();

        if let Some(rest) = raw.strip_prefix('[') {
            let (host, tail) =
                rest.split_once(']').ok_or_else(|| invalid(raw, "unbalanced brackets"))?;
            host.parse::<Ipv6Addr>().map_err(|e| invalid(raw, &e.to_string()))?;
            let port = match tail {
                "" => None,
                _ => Some(parse_port(
                    tail.strip_prefix(':').ok_or_else(|| invalid(raw, "expected ':' after ']'"))?,
                )?),
            };
            return Ok(Self { host: host.to_owned(), port });
        }

        // Two or more colons without brackets can only be an IPv6 literal.
        if raw.matches(':').count() > 1 {
            raw.parse::<Ipv6Addr>().map_err(|e| invalid(raw, &e.to_string()))?;
            return Ok(Self { host: raw.to_owned(), port: None });
        }

        let (host, port) = match raw.split_once(':') {
            Some((host, port)) => (host, Some(parse_port(port)?)),
            None => (raw, None),
        };
        if host.is_empty() {
            return Err(invalid(raw, "missing host"));
        }
        Ok(Self { host: host.to_owned(), port })
    }

    #[must_use]
    pub fn port_or(&self, default: u16) -> u16 {
        self.port.unwrap_or(default)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let host: Cow<'_, str> = if self.host.contains(':') {
            Cow::Owned(format!("[{}]", self.host))
        } else {
            Cow::Borrowed(&self.host)
        };
        match self.port {
            Some(port) => write!(f, "{host}:{port}"),
            None => f.write_str(&host),
        }
    }
}

fn parse_port(raw: &str) -> Result<u16, AddressError> {
    raw.parse::<u16>().map_err(|_| AddressError::InvalidPort {
        message: format!("'{raw}' is not a port number").into(),
        context: None,
    })
}

fn invalid(raw: &str, reason: &str) -> AddressError {
    AddressError::Invalid { message: reason.to_owned().into(), context: Some(raw.to_owned().into()) }
}

const fn mask_v4(prefix: u8) -> u32 {
    if prefix == 0 { 0 } else { u32::MAX << (32 - prefix as u32) }
}

const fn mask_v6(prefix: u8) -> u128 {
    if prefix == 0 { 0 } else { u128::MAX << (128 - prefix as u32) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_every_family() {
        assert_eq!(Address::parse("192.168.1.10").unwrap().kind(), AddressKind::Ipv4);
        assert_eq!(Address::parse("fe80::1").unwrap().kind(), AddressKind::Ipv6);
        assert_eq!(Address::parse("[::1]").unwrap(), Address::V6(Ipv6Addr::LOCALHOST));
        assert_eq!(
            Address::parse("unix:/run/lithium.sock").unwrap(),
            Address::Unix(PathBuf::from("/run/lithium.sock"))
        );
        assert_eq!(Address::parse("/tmp/indi.sock").unwrap().kind(), AddressKind::Unix);
    }

    #[test]
    fn rejects_garbage() {
        for bad in ["", "256.1.1.1", "1.2.3", "unix:", "[::1", "hello", "::g"] {
            assert!(Address::parse(bad).is_err(), "{bad:?} should not parse");
        }
    }

    #[test]
    fn binary_form() {
        let v4 = Address::parse("192.168.0.1").unwrap().to_binary().unwrap();
        assert_eq!(v4, "11000000101010000000000000000001");
        let v6 = Address::parse("::1").unwrap().to_binary().unwrap();
        assert_eq!(v6.len(), 128);
        assert!(v6.ends_with("01"));
        assert!(Address::parse("/tmp/x").unwrap().to_binary().is_none());
    }

    #[test]
    fn inclusive_ranges() {
        let lo = Address::parse("10.0.0.1").unwrap();
        let hi = Address::parse("10.0.0.20").unwrap();
        assert!(Address::parse("10.0.0.1").unwrap().is_in_range(&lo, &hi));
        assert!(Address::parse("10.0.0.20").unwrap().is_in_range(&lo, &hi));
        assert!(!Address::parse("10.0.0.21").unwrap().is_in_range(&lo, &hi));
        assert!(!Address::parse("::1").unwrap().is_in_range(&lo, &hi));
    }

    #[test]
    fn cidr_membership() {
        let net = Cidr::parse("192.168.1.77/24").unwrap();
        assert_eq!(net.to_string(), "192.168.1.0/24");
        assert!(net.contains(&"192.168.1.200".parse().unwrap()));
        assert!(!net.contains(&"192.168.2.1".parse().unwrap()));
        assert!(!net.contains(&"::1".parse().unwrap()));

        let all = Cidr::parse("0.0.0.0/0").unwrap();
        assert!(all.contains_address(&Address::parse("8.8.8.8").unwrap()));
        assert!(!all.contains_address(&Address::parse("/tmp/sock").unwrap()));

        let v6 = Cidr::parse("fd00::/8").unwrap();
        assert!(v6.contains(&"fd12:3456::1".parse().unwrap()));

        assert!(matches!(Cidr::parse("10.0.0.0/33"), Err(AddressError::InvalidPrefix { .. })));
        assert!(matches!(Cidr::parse("10.0.0.0"), Err(AddressError::Invalid { .. })));
    }

    #[test]
    fn endpoints() {
        assert_eq!(
            Endpoint::parse("localhost:7624").unwrap(),
            Endpoint { host: "localhost".into(), port: Some(7624) }
        );
        assert_eq!(Endpoint::parse("indi.local").unwrap().port_or(7624), 7624);
        assert_eq!(
            Endpoint::parse("[::1]:11111").unwrap(),
            Endpoint { host: "::1".into(), port: Some(11111) }
        );
        assert_eq!(Endpoint::parse("fe80::2").unwrap().port, None);
        assert_eq!(Endpoint::parse("[::1]:80").unwrap().to_string(), "[::1]:80");

        assert!(matches!(Endpoint::parse("host:99999"), Err(AddressError::InvalidPort { .. })));
        assert!(matches!(Endpoint::parse(":80"), Err(AddressError::Invalid { .. })));
        assert!(matches!(Endpoint::parse("[::1"), Err(AddressError::Invalid { .. })));
    }
}
