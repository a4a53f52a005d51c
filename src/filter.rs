use std::collections::BTreeSet;
use std::fmt::{Display, Formatter};
use std::net::IpAddr;
use std::str::FromStr;

use anyhow::bail;
use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::addr::{AddrRange, AddrSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum Direction {
    #[serde(rename = "in")]
    In,
    #[serde(rename = "out")]
    Out,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum FilterType {
    #[serde(rename = "blacklist")]
    Blacklist,
    #[serde(rename = "whitelist")]
    Whitelist,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    #[default]
    Deny,
    Allow,
}

impl FromStr for Direction {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("in") {
            Ok(Self::In)
        } else if s.eq_ignore_ascii_case("out") {
            Ok(Self::Out)
        } else {
            bail!("Invalid direction: {s}. Expect in or out");
        }
    }
}

impl FromStr for FilterType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("whitelist") {
            Ok(Self::Whitelist)
        } else if s.eq_ignore_ascii_case("blacklist") {
            Ok(Self::Blacklist)
        } else {
            bail!("Invalid filter type: {s}. Expect whitelist or blacklist");
        }
    }
}

impl Display for Direction {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::In => "IN",
            Self::Out => "OUT",
        })
    }
}

impl Display for FilterType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Blacklist => "BLACKLIST",
            Self::Whitelist => "WHITELIST",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Rule {
    /// `None` matches every interface.
    pub interface: Option<String>,
    pub group: AddrSet,
    pub sources: AddrSet,
}

impl Rule {
    fn applies_to(&self, if_name: &str, group: IpAddr) -> bool {
        self.interface.as_deref().map_or(true, |i| i == if_name) && self.group.contains(group)
    }
}

impl Display for Rule {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{{{}, {}, {}}}",
            self.interface.as_deref().unwrap_or("*"),
            self.group,
            self.sources
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DirectionFilter {
    pub filter_type: FilterType,
    pub rules: Vec<Rule>,
}

impl Display for DirectionFilter {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.filter_type)?;
        for rule in &self.rules {
            write!(f, " {rule}")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FilterModel {
    #[serde(rename = "in")]
    inbound: Option<DirectionFilter>,
    #[serde(rename = "out")]
    outbound: Option<DirectionFilter>,
    unmatched: Verdict,
}

impl FilterModel {
    pub fn get(&self, direction: Direction) -> Option<&DirectionFilter> {
        match direction {
            Direction::In => self.inbound.as_ref(),
            Direction::Out => self.outbound.as_ref(),
        }
    }

    fn slot(&mut self, direction: Direction) -> &mut Option<DirectionFilter> {
        match direction {
            Direction::In => &mut self.inbound,
            Direction::Out => &mut self.outbound,
        }
    }

    /// Adds `filter` to `direction`. Rules of a second filter of the same type
    /// are appended; a filter of the other type is rejected.
    pub fn attach(&mut self, direction: Direction, filter: DirectionFilter) -> anyhow::Result<()> {
        match self.slot(direction) {
            Some(existing) if existing.filter_type != filter.filter_type => bail!(
                "{direction} filter is already a {}, can not add a {}",
                existing.filter_type,
                filter.filter_type
            ),
            Some(existing) => existing.rules.extend(filter.rules),
            slot => *slot = Some(filter),
        }
        Ok(())
    }

    pub fn unmatched(&self) -> Verdict {
        self.unmatched
    }

    pub(crate) fn set_unmatched(&mut self, verdict: Verdict) {
        self.unmatched = verdict;
    }

    pub fn filter_type(&self, direction: Direction) -> Option<FilterType> {
        self.get(direction).map(|f| f.filter_type)
    }

    pub fn is_source_allowed(
        &self,
        direction: Direction,
        if_name: &str,
        group: IpAddr,
        source: IpAddr,
    ) -> bool {
        let filter = match self.get(direction) {
            Some(v) => v,
            None => return self.unmatched == Verdict::Allow,
        };

        let mut selected = false;
        let mut matched = false;
        for rule in filter
            .rules
            .iter()
            .filter(|r| r.applies_to(if_name, group))
        {
            selected = true;
            if rule.sources.contains(source) {
                log::debug!("{direction} {if_name} ({group}, {source}) matches {rule}");
                matched = true;
                break;
            }
        }

        if !selected {
            log::debug!(
                "No {direction} rule for {if_name} and group {group}, using {:?}",
                self.unmatched
            );
            return self.unmatched == Verdict::Allow;
        }

        match filter.filter_type {
            FilterType::Whitelist => matched,
            FilterType::Blacklist => !matched,
        }
    }

    pub fn saddr_set(
        &self,
        direction: Direction,
        if_pattern: &str,
        group: IpAddr,
    ) -> BTreeSet<AddrRange> {
        self.get(direction)
            .into_iter()
            .flat_map(|f| f.rules.iter())
            .filter(|r| r.applies_to(if_pattern, group))
            .flat_map(|r| r.sources.entries().iter().copied())
            .collect()
    }
}
