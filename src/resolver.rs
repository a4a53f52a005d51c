use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt::{Display, Formatter};
use std::num::NonZeroU32;

use serde::Serialize;

use crate::addr::AddressFamily;
use crate::error::{CompileError, Result};
use crate::instance::{InstanceDefinition, InstanceSet, Role};

pub trait InterfaceResolver {
    /// `None` or `Some(0)` when no such interface exists.
    fn if_index(&self, name: &str) -> Option<u32>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemResolver;

#[cfg(unix)]
impl InterfaceResolver for SystemResolver {
    fn if_index(&self, name: &str) -> Option<u32> {
        match nix::net::if_::if_nametoindex(name) {
            Ok(index) => Some(index),
            Err(e) => {
                log::debug!("if_nametoindex({name}) failed: {e}");
                None
            }
        }
    }
}

#[cfg(not(unix))]
impl InterfaceResolver for SystemResolver {
    fn if_index(&self, name: &str) -> Option<u32> {
        log::warn!("Interface lookup of {name} is not supported on this platform");
        None
    }
}

#[derive(Debug, Clone, Default)]
pub struct StaticResolver(HashMap<String, u32>);

impl From<HashMap<String, u32>> for StaticResolver {
    fn from(map: HashMap<String, u32>) -> Self {
        Self(map)
    }
}

impl<S: Into<String>> FromIterator<(S, u32)> for StaticResolver {
    fn from_iter<T: IntoIterator<Item = (S, u32)>>(iter: T) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }
}

impl InterfaceResolver for StaticResolver {
    fn if_index(&self, name: &str) -> Option<u32> {
        self.0.get(name).copied()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedInterface {
    pub name: String,
    pub index: NonZeroU32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedInterfaceGroup {
    pub instance_name: String,
    pub family: AddressFamily,
    pub reset_reverse_path_filter: bool,
    pub downstreams: Vec<ResolvedInterface>,
    pub upstreams: Vec<ResolvedInterface>,
}

impl ResolvedInterfaceGroup {
    pub fn handles(&self) -> BTreeSet<NonZeroU32> {
        self.downstreams
            .iter()
            .chain(self.upstreams.iter())
            .map(|i| i.index)
            .collect()
    }

    pub fn contains(&self, index: u32) -> bool {
        self.downstreams
            .iter()
            .chain(self.upstreams.iter())
            .any(|i| i.index.get() == index)
    }
}

impl Display for ResolvedInterfaceGroup {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "interfaces of {} ({}", self.instance_name, self.family)?;
        if self.reset_reverse_path_filter {
            f.write_str(", reset rp_filter")?;
        }
        f.write_str("):")?;
        for (role, list) in [
            (Role::Upstream, &self.upstreams),
            (Role::Downstream, &self.downstreams),
        ] {
            for i in list {
                write!(f, " {role} {}#{}", i.name, i.index)?;
            }
        }
        Ok(())
    }
}

fn resolve_instance(
    instance: &InstanceDefinition,
    family: AddressFamily,
    reset_reverse_path_filter: bool,
    resolver: &impl InterfaceResolver,
) -> Result<ResolvedInterfaceGroup> {
    let resolve = |role: Role| -> Result<Vec<ResolvedInterface>> {
        instance
            .interfaces(role)
            .iter()
            .map(|i| {
                resolver
                    .if_index(i.name())
                    .and_then(NonZeroU32::new)
                    .map(|index| ResolvedInterface {
                        name: i.name().to_string(),
                        index,
                    })
                    .ok_or_else(|| CompileError::UnknownInterface {
                        instance: instance.name().to_string(),
                        interface: i.name().to_string(),
                    })
            })
            .collect()
    };

    let group = ResolvedInterfaceGroup {
        instance_name: instance.name().to_string(),
        family,
        reset_reverse_path_filter,
        downstreams: resolve(Role::Downstream)?,
        upstreams: resolve(Role::Upstream)?,
    };

    for up in &group.upstreams {
        if group.downstreams.iter().any(|d| d.index == up.index) {
            log::warn!(
                "Interface #{} serves both upstream and downstream of {}",
                up.index,
                group.instance_name
            );
        }
    }

    Ok(group)
}

/// Resolves every interface of every instance. Nothing is returned unless
/// all lookups succeed.
pub fn resolve_instances(
    instances: &InstanceSet,
    family: AddressFamily,
    reset_reverse_path_filter: bool,
    resolver: &impl InterfaceResolver,
) -> Result<BTreeMap<String, ResolvedInterfaceGroup>> {
    let mut result = BTreeMap::new();

    for instance in instances.iter() {
        let group = resolve_instance(instance, family, reset_reverse_path_filter, resolver)?;
        if result.contains_key(instance.name()) {
            return Err(CompileError::ResolutionFailure {
                instance: instance.name().to_string(),
                reason: "proxy instance already exists".to_string(),
            });
        }
        log::debug!("{group}");
        result.insert(instance.name().to_string(), group);
    }

    Ok(result)
}
