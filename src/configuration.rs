use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{CompileError, Entity, Result};
use crate::filter::Verdict;
use crate::instance::{InstanceDefinition, InstanceSet};
use crate::parser::{self, RuleBinding, Statement};
use crate::protocol::GroupMemProtocol;
use crate::resolver::{resolve_instances, InterfaceResolver, ResolvedInterfaceGroup, SystemResolver};
use crate::script::{split_commands, strip_comments, Command};
use crate::table::TableSet;

const fn default_resolve_interfaces() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompileOptions {
    /// Look up every interface once the script is parsed. Turn off to check
    /// a script on a machine that lacks its interfaces.
    #[serde(default = "default_resolve_interfaces")]
    pub resolve_interfaces: bool,
    #[serde(default)]
    pub reset_reverse_path_filter: bool,
    /// Answer for traffic no rule speaks about.
    #[serde(default)]
    pub unmatched: Verdict,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            resolve_interfaces: default_resolve_interfaces(),
            reset_reverse_path_filter: false,
            unmatched: Verdict::default(),
        }
    }
}

impl CompileOptions {
    /// Parse only; no interface is looked up.
    pub fn debug_testing() -> Self {
        Self {
            resolve_interfaces: false,
            ..Default::default()
        }
    }
}

/// A compiled, validated proxy configuration.
#[derive(Debug, Clone, Serialize)]
pub struct Configuration {
    protocol: GroupMemProtocol,
    tables: TableSet,
    instances: InstanceSet,
    interfaces: BTreeMap<String, ResolvedInterfaceGroup>,
    options: CompileOptions,
}

/// State threaded through the commands of one script.
#[derive(Default)]
struct Compiler {
    protocol: Option<GroupMemProtocol>,
    tables: TableSet,
    instances: InstanceSet,
}

impl Compiler {
    fn protocol(&self) -> GroupMemProtocol {
        self.protocol.unwrap_or_default()
    }

    fn apply(&mut self, command: &Command) -> Result<()> {
        log::trace!("Parsing command at line {}", command.line);

        match parser::parse(command, &self.tables, self.protocol())? {
            Statement::Protocol(p) => {
                if let Some(existing) = self.protocol {
                    return Err(CompileError::DuplicateDefinition {
                        line: command.line,
                        entity: Entity::Protocol,
                        name: format!("{p} (already set to {existing})"),
                    });
                }
                self.protocol = Some(p);
            }
            Statement::Table(t) => {
                let name = t.name.clone();
                if !self.tables.insert(t) {
                    return Err(CompileError::DuplicateDefinition {
                        line: command.line,
                        entity: Entity::Table,
                        name,
                    });
                }
            }
            Statement::Instance(i) => {
                let name = i.name().to_string();
                if !self.instances.insert(i) {
                    return Err(CompileError::DuplicateDefinition {
                        line: command.line,
                        entity: Entity::Instance,
                        name,
                    });
                }
            }
            Statement::Binding(b) => self.bind(b)?,
        }

        Ok(())
    }

    fn bind(&mut self, binding: RuleBinding) -> Result<()> {
        let RuleBinding {
            line,
            instance,
            role,
            interface,
            direction,
            filter,
        } = binding;

        let inst: &mut InstanceDefinition = self.instances.get_mut(&instance).ok_or_else(|| {
            CompileError::UnresolvedReference {
                line,
                entity: Entity::Instance,
                name: instance.clone(),
            }
        })?;

        let targets: Vec<_> = inst
            .interfaces_mut(role)
            .iter_mut()
            .filter(|i| interface.as_deref().map_or(true, |name| i.name() == name))
            .collect();

        if targets.is_empty() {
            return Err(CompileError::UnresolvedReference {
                line,
                entity: Entity::Interface,
                name: format!(
                    "{} ({role} of {instance})",
                    interface.as_deref().unwrap_or("*")
                ),
            });
        }

        for target in targets {
            log::trace!(
                "Binding {direction} {} to {} of {instance}",
                filter.filter_type,
                target.name()
            );
            target
                .filters_mut()
                .attach(direction, filter.clone())
                .map_err(|e| CompileError::malformed(line, format!("{}: {e}", target.name())))?;
        }

        Ok(())
    }

    fn finish(
        mut self,
        options: &CompileOptions,
        resolver: &impl InterfaceResolver,
    ) -> Result<Configuration> {
        for inst in self.instances.iter_mut() {
            inst.set_unmatched(options.unmatched);
        }

        let protocol = self.protocol();
        let interfaces = if options.resolve_interfaces {
            resolve_instances(
                &self.instances,
                protocol.family(),
                options.reset_reverse_path_filter,
                resolver,
            )?
        } else {
            Default::default()
        };

        Ok(Configuration {
            protocol,
            tables: self.tables,
            instances: self.instances,
            interfaces,
            options: options.clone(),
        })
    }
}

/// Compiles `script`, looking interfaces up on this host if the options ask for it.
pub fn compile(script: &str, options: &CompileOptions) -> Result<Configuration> {
    compile_with_resolver(script, options, &SystemResolver)
}

pub fn compile_with_resolver(
    script: &str,
    options: &CompileOptions,
    resolver: &impl InterfaceResolver,
) -> Result<Configuration> {
    let mut compiler = Compiler::default();
    for command in split_commands(&strip_comments(script)) {
        compiler.apply(&command)?;
    }

    let config = compiler.finish(options, resolver)?;
    log::info!(
        "Compiled {} table(s) and {} proxy instance(s) for {}",
        config.tables.len(),
        config.instances.len(),
        config.protocol
    );
    Ok(config)
}

impl Configuration {
    pub fn load(path: impl AsRef<Path>, options: &CompileOptions) -> Result<Self> {
        Self::load_with_resolver(path, options, &SystemResolver)
    }

    pub fn load_with_resolver(
        path: impl AsRef<Path>,
        options: &CompileOptions,
        resolver: &impl InterfaceResolver,
    ) -> Result<Self> {
        let path = path.as_ref();
        let script = std::fs::read_to_string(path).map_err(|source| CompileError::IoFailure {
            path: path.to_path_buf(),
            source,
        })?;
        compile_with_resolver(&script, options, resolver)
    }

    pub fn options(&self) -> &CompileOptions {
        &self.options
    }

    pub fn group_mem_protocol(&self) -> GroupMemProtocol {
        self.protocol
    }

    pub fn tables(&self) -> &TableSet {
        &self.tables
    }

    pub fn instances(&self) -> &InstanceSet {
        &self.instances
    }

    pub fn instance(&self, name: &str) -> Option<&InstanceDefinition> {
        self.instances.get(name)
    }

    pub fn instance_names(&self) -> Vec<&str> {
        self.instances.iter().map(|i| i.name()).collect()
    }

    /// `None` for unknown instances and whenever resolution was skipped.
    pub fn resolved_interfaces(&self, instance: &str) -> Option<&ResolvedInterfaceGroup> {
        self.interfaces.get(instance)
    }
}

impl Display for Configuration {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "# proxy configuration")?;
        writeln!(f, "protocol {}", self.protocol)?;
        write!(f, "{}", self.tables)?;
        write!(f, "{}", self.instances)?;
        for group in self.interfaces.values() {
            writeln!(f, "{group}")?;
        }
        Ok(())
    }
}
