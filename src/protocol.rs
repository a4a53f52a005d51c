use std::fmt::{Display, Formatter};
use std::str::FromStr;

use anyhow::bail;
use serde_with::{DeserializeFromStr, SerializeDisplay};

use crate::addr::AddressFamily;

/// Group membership protocol the proxy speaks. The version also fixes the
/// address family every table and rule must use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, SerializeDisplay, DeserializeFromStr)]
pub enum GroupMemProtocol {
    IgmpV1,
    IgmpV2,
    #[default]
    IgmpV3,
    MldV1,
    MldV2,
}

impl GroupMemProtocol {
    pub fn family(&self) -> AddressFamily {
        match self {
            Self::IgmpV1 | Self::IgmpV2 | Self::IgmpV3 => AddressFamily::Ipv4,
            Self::MldV1 | Self::MldV2 => AddressFamily::Ipv6,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::IgmpV1 => "IGMPv1",
            Self::IgmpV2 => "IGMPv2",
            Self::IgmpV3 => "IGMPv3",
            Self::MldV1 => "MLDv1",
            Self::MldV2 => "MLDv2",
        }
    }
}

impl FromStr for GroupMemProtocol {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        for p in [
            Self::IgmpV1,
            Self::IgmpV2,
            Self::IgmpV3,
            Self::MldV1,
            Self::MldV2,
        ] {
            if s.eq_ignore_ascii_case(p.name()) {
                return Ok(p);
            }
        }
        bail!("Unknown protocol {s}. Expect one of IGMPv1, IGMPv2, IGMPv3, MLDv1 or MLDv2")
    }
}

impl Display for GroupMemProtocol {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parsing_works() {
        assert_eq!("IGMPv2".parse::<GroupMemProtocol>().unwrap(), GroupMemProtocol::IgmpV2);
        assert_eq!("mldv2".parse::<GroupMemProtocol>().unwrap(), GroupMemProtocol::MldV2);
        "IGMPv4".parse::<GroupMemProtocol>().expect_err("To fail parsing");

        assert_eq!(GroupMemProtocol::default(), GroupMemProtocol::IgmpV3);
        assert_eq!(GroupMemProtocol::MldV1.family(), AddressFamily::Ipv6);
        assert_eq!(GroupMemProtocol::IgmpV1.family(), AddressFamily::Ipv4);
    }
}
