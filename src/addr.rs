use std::cmp::Ordering;
use std::fmt::{Display, Formatter};
use std::net::IpAddr;
use std::str::FromStr;

use anyhow::{bail, Context};
use ipnetwork::IpNetwork;
use serde::Serialize;
use serde_with::{DeserializeFromStr, SerializeDisplay};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum AddressFamily {
    #[serde(rename = "ipv4")]
    Ipv4,
    #[serde(rename = "ipv6")]
    Ipv6,
}

impl AddressFamily {
    pub fn of(addr: &IpAddr) -> Self {
        match addr {
            IpAddr::V4(_) => Self::Ipv4,
            IpAddr::V6(_) => Self::Ipv6,
        }
    }
}

impl Display for AddressFamily {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Ipv4 => "IPv4",
            Self::Ipv6 => "IPv6",
        })
    }
}

/// One entry of an address list: `*`, a single address, an inclusive
/// `from - to` range or a CIDR network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, SerializeDisplay, DeserializeFromStr)]
pub enum AddrRange {
    Any,
    Single(IpAddr),
    Range { from: IpAddr, to: IpAddr },
    Network(IpNetwork),
}

impl AddrRange {
    pub fn contains(&self, addr: IpAddr) -> bool {
        match self {
            Self::Any => true,
            Self::Single(a) => *a == addr,
            // Both ends share a family, so a foreign-family address falls outside.
            Self::Range { from, to } => *from <= addr && addr <= *to,
            Self::Network(n) => n.contains(addr),
        }
    }

    /// `None` for the wildcard, which belongs to every family.
    pub fn family(&self) -> Option<AddressFamily> {
        match self {
            Self::Any => None,
            Self::Single(a) | Self::Range { from: a, .. } => Some(AddressFamily::of(a)),
            Self::Network(n) => Some(AddressFamily::of(&n.ip())),
        }
    }

    pub fn is_family(&self, family: AddressFamily) -> bool {
        self.family().map_or(true, |f| f == family)
    }

    fn sort_key(&self) -> (u8, Option<(IpAddr, IpAddr)>) {
        match self {
            Self::Any => (0, None),
            Self::Single(a) => (1, Some((*a, *a))),
            Self::Range { from, to } => (2, Some((*from, *to))),
            Self::Network(n) => (3, Some((n.network(), n.ip()))),
        }
    }
}

impl PartialOrd for AddrRange {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for AddrRange {
    fn cmp(&self, other: &Self) -> Ordering {
        self.sort_key()
            .cmp(&other.sort_key())
            .then_with(|| match (self, other) {
                (Self::Network(a), Self::Network(b)) => a.prefix().cmp(&b.prefix()),
                _ => Ordering::Equal,
            })
    }
}

impl FromStr for AddrRange {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s == "*" {
            return Ok(Self::Any);
        }

        if s.contains('/') {
            return Ok(Self::Network(
                s.parse()
                    .with_context(|| format!("Parsing network: {s}"))?,
            ));
        }

        if let Some((from, to)) = s.split_once('-') {
            let from: IpAddr = from
                .trim()
                .parse()
                .with_context(|| format!("Parsing start of range: {s}"))?;
            let to: IpAddr = to
                .trim()
                .parse()
                .with_context(|| format!("Parsing end of range: {s}"))?;
            if AddressFamily::of(&from) != AddressFamily::of(&to) {
                bail!("Range {s} mixes address families");
            }
            if from > to {
                bail!("Range {s} starts after it ends");
            }
            return Ok(Self::Range { from, to });
        }

        Ok(Self::Single(
            s.parse().with_context(|| format!("Parsing address: {s}"))?,
        ))
    }
}

impl Display for AddrRange {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Any => f.write_str("*"),
            Self::Single(a) => write!(f, "{a}"),
            Self::Range { from, to } => write!(f, "{from} - {to}"),
            Self::Network(n) => write!(f, "{n}"),
        }
    }
}

/// The group or source side of a rule: either listed inline or taken from a
/// named table.
///
/// Tables can't change once defined, so a reference keeps the table's name
/// for display next to a copy of its entries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AddrSet {
    Inline(Vec<AddrRange>),
    Table {
        name: String,
        entries: Vec<AddrRange>,
    },
}

impl AddrSet {
    pub fn any() -> Self {
        Self::Inline(vec![AddrRange::Any])
    }

    pub fn entries(&self) -> &[AddrRange] {
        match self {
            Self::Inline(entries) | Self::Table { entries, .. } => entries,
        }
    }

    pub fn contains(&self, addr: IpAddr) -> bool {
        self.entries().iter().any(|r| r.contains(addr))
    }
}

impl Display for AddrSet {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Table { name, .. } => write!(f, "table {name}"),
            Self::Inline(entries) if entries.len() == 1 => write!(f, "{}", entries[0]),
            Self::Inline(entries) => {
                f.write_str("[")?;
                for (i, e) in entries.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{e}")?;
                }
                f.write_str("]")
            }
        }
    }
}
