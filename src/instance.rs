use std::collections::BTreeSet;
use std::fmt::{Display, Formatter};
use std::net::IpAddr;
use std::str::FromStr;

use anyhow::bail;
use serde::Serialize;

use crate::addr::AddrRange;
use crate::filter::{Direction, FilterModel, FilterType, Verdict};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Role {
    #[serde(rename = "downstream")]
    Downstream,
    #[serde(rename = "upstream")]
    Upstream,
}

impl FromStr for Role {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("downstream") {
            Ok(Self::Downstream)
        } else if s.eq_ignore_ascii_case("upstream") {
            Ok(Self::Upstream)
        } else {
            bail!("Invalid interface role: {s}. Expect downstream or upstream");
        }
    }
}

impl Display for Role {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Downstream => "downstream",
            Self::Upstream => "upstream",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InterfaceDefinition {
    name: String,
    filters: FilterModel,
}

impl InterfaceDefinition {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            filters: Default::default(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn filters(&self) -> &FilterModel {
        &self.filters
    }

    pub(crate) fn filters_mut(&mut self) -> &mut FilterModel {
        &mut self.filters
    }

    pub fn is_source_allowed(
        &self,
        direction: Direction,
        if_name: &str,
        group: IpAddr,
        source: IpAddr,
    ) -> bool {
        self.filters
            .is_source_allowed(direction, if_name, group, source)
    }

    /// `None` when nothing was configured for `direction`.
    pub fn get_filter_type(&self, direction: Direction) -> Option<FilterType> {
        self.filters.filter_type(direction)
    }

    pub fn get_saddr_set(
        &self,
        direction: Direction,
        if_pattern: &str,
        group: IpAddr,
    ) -> BTreeSet<AddrRange> {
        self.filters.saddr_set(direction, if_pattern, group)
    }
}

impl Display for InterfaceDefinition {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.name)?;
        for direction in [Direction::In, Direction::Out] {
            if let Some(filter) = self.filters.get(direction) {
                write!(f, " {direction}: {filter}")?;
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InstanceDefinition {
    name: String,
    downstreams: Vec<InterfaceDefinition>,
    upstreams: Vec<InterfaceDefinition>,
}

impl InstanceDefinition {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            downstreams: Vec::new(),
            upstreams: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn downstreams(&self) -> &[InterfaceDefinition] {
        &self.downstreams
    }

    pub fn upstreams(&self) -> &[InterfaceDefinition] {
        &self.upstreams
    }

    pub fn interfaces(&self, role: Role) -> &[InterfaceDefinition] {
        match role {
            Role::Downstream => &self.downstreams,
            Role::Upstream => &self.upstreams,
        }
    }

    pub(crate) fn interfaces_mut(&mut self, role: Role) -> &mut Vec<InterfaceDefinition> {
        match role {
            Role::Downstream => &mut self.downstreams,
            Role::Upstream => &mut self.upstreams,
        }
    }

    pub fn interface(&self, role: Role, name: &str) -> Option<&InterfaceDefinition> {
        self.interfaces(role).iter().find(|i| i.name == name)
    }

    #[must_use]
    pub fn add_interface(&mut self, role: Role, interface: InterfaceDefinition) -> bool {
        if self.interface(role, &interface.name).is_some() {
            return false;
        }
        self.interfaces_mut(role).push(interface);
        true
    }

    pub(crate) fn set_unmatched(&mut self, verdict: Verdict) {
        for i in self.downstreams.iter_mut().chain(self.upstreams.iter_mut()) {
            i.filters.set_unmatched(verdict);
        }
    }
}

impl Display for InstanceDefinition {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "instance {}", self.name)?;
        for role in [Role::Upstream, Role::Downstream] {
            for i in self.interfaces(role) {
                writeln!(f, "  {role}: {i}")?;
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(transparent)]
pub struct InstanceSet {
    instances: Vec<InstanceDefinition>,
}

impl InstanceSet {
    pub fn get(&self, name: &str) -> Option<&InstanceDefinition> {
        self.instances.iter().find(|i| i.name == name)
    }

    pub(crate) fn get_mut(&mut self, name: &str) -> Option<&mut InstanceDefinition> {
        self.instances.iter_mut().find(|i| i.name == name)
    }

    #[must_use]
    pub fn insert(&mut self, instance: InstanceDefinition) -> bool {
        if self.get(&instance.name).is_some() {
            return false;
        }
        self.instances.push(instance);
        true
    }

    pub fn iter(&self) -> impl Iterator<Item = &InstanceDefinition> {
        self.instances.iter()
    }

    pub(crate) fn iter_mut(&mut self) -> impl Iterator<Item = &mut InstanceDefinition> {
        self.instances.iter_mut()
    }

    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }
}

impl Display for InstanceSet {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        for i in &self.instances {
            write!(f, "{i}")?;
        }
        Ok(())
    }
}
