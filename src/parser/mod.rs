//! Parses single commands of a configuration script.
//!
//! A command is classified by its leading words and parsed into a
//! [`Statement`]. The parser keeps no state between commands: tables defined
//! so far are passed in read-only, and applying a statement is left to the
//! compiler in [`crate::configuration`].

mod token;

use crate::addr::{AddrRange, AddrSet};
use crate::error::{CompileError, Entity, Result};
use crate::filter::{Direction, DirectionFilter, FilterType, Rule};
use crate::instance::{InstanceDefinition, InterfaceDefinition, Role};
use crate::protocol::GroupMemProtocol;
use crate::script::Command;
use crate::table::{Table, TableSet};

use token::{Cursor, Token};

/// What a single command turned out to be.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Statement {
    Protocol(GroupMemProtocol),
    Table(Table),
    Instance(InstanceDefinition),
    Binding(RuleBinding),
}

/// Filter rules to attach to interfaces of an instance defined earlier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleBinding {
    pub line: usize,
    pub instance: String,
    pub role: Role,
    /// `None` binds every interface of `role`.
    pub interface: Option<String>,
    pub direction: Direction,
    pub filter: DirectionFilter,
}

pub fn parse(
    command: &Command,
    tables: &TableSet,
    protocol: GroupMemProtocol,
) -> Result<Statement> {
    let mut parser = Parser {
        cursor: Cursor::new(&command.text, command.line),
        tables,
        protocol,
    };

    let keyword = parser
        .cursor
        .expect_word("protocol, table or instance")?;
    match keyword.to_ascii_lowercase().as_str() {
        "protocol" => parser.parse_protocol().map(Statement::Protocol),
        "table" => parser.parse_table().map(Statement::Table),
        "instance" | "pinstance" => parser.parse_instance_command(),
        _ => Err(CompileError::malformed(
            command.line,
            format!("unknown command {keyword}, expected protocol, table or instance"),
        )),
    }
}

struct Parser<'a> {
    cursor: Cursor,
    tables: &'a TableSet,
    protocol: GroupMemProtocol,
}

fn is_name(s: &str) -> bool {
    let mut chars = s.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
}

/// Linux caps interface names at IFNAMSIZ - 1 bytes.
const MAX_IF_NAME_LEN: usize = 15;

fn is_if_name(s: &str) -> bool {
    !s.is_empty()
        && s.len() <= MAX_IF_NAME_LEN
        && s.chars().all(|c| c.is_ascii_graphic() && !matches!(c, ':' | '*' | '/'))
}

fn add_interface(
    instance: &mut InstanceDefinition,
    role: Role,
    interface: InterfaceDefinition,
    line: usize,
) -> Result<()> {
    let if_name = interface.name().to_string();
    if !instance.add_interface(role, interface) {
        return Err(CompileError::DuplicateDefinition {
            line,
            entity: Entity::Interface,
            name: format!("{if_name} ({role} of {})", instance.name()),
        });
    }
    Ok(())
}

impl<'a> Parser<'a> {
    fn parse_protocol(&mut self) -> Result<GroupMemProtocol> {
        let line = self.cursor.line();
        let name = self.cursor.expect_word("a protocol name")?;
        let protocol = name.parse::<GroupMemProtocol>().map_err(|e| {
            CompileError::malformed(line, format!("malformed protocol declaration: {e}"))
        })?;
        self.cursor.expect_end("protocol declaration")?;
        Ok(protocol)
    }

    fn parse_name(&mut self, what: &str) -> Result<String> {
        let line = self.cursor.line();
        let name = self.cursor.expect_word(what)?;
        if !is_name(&name) {
            return Err(CompileError::malformed(line, format!("invalid {what}: {name}")));
        }
        Ok(name)
    }

    fn parse_if_name(&mut self, what: &str) -> Result<String> {
        let line = self.cursor.line();
        let name = self.cursor.expect_word(what)?;
        if !is_if_name(&name) {
            return Err(CompileError::malformed(
                line,
                format!("invalid interface name: {name}"),
            ));
        }
        Ok(name)
    }

    /// Resolves a table reference; tables must be defined before use.
    fn parse_table_ref(&mut self) -> Result<(String, Vec<AddrRange>)> {
        let line = self.cursor.line();
        let name = self.parse_name("address or table name")?;
        let table = self
            .tables
            .get(&name)
            .ok_or_else(|| CompileError::UnresolvedReference {
                line,
                entity: Entity::Table,
                name: name.clone(),
            })?;

        // Tables defined before the protocol declaration may be of the other family
        let family = self.protocol.family();
        if let Some(range) = table.entries.iter().find(|r| !r.is_family(family)) {
            return Err(CompileError::malformed(
                line,
                format!(
                    "table {name} holds {range}, which is not {family}, as required by {}",
                    self.protocol
                ),
            ));
        }
        Ok((name, table.entries.clone()))
    }

    fn parse_table(&mut self) -> Result<Table> {
        let name = self.parse_name("table name")?;
        self.cursor.expect(&Token::Open, "'{' after table name")?;

        let mut entries = Vec::new();
        let mut first = true;
        while !self.cursor.eat(&Token::Close) {
            if !std::mem::take(&mut first) {
                self.cursor.expect(&Token::Comma, "',' or '}' in table")?;
            }

            if self.cursor.peek_keyword("table") {
                self.cursor.next();
                let (_, nested) = self.parse_table_ref()?;
                entries.extend(nested);
            } else {
                entries.push(self.parse_addr_range()?);
            }
        }

        self.cursor.expect_end("table definition")?;
        Ok(Table { name, entries })
    }

    fn looks_like_addr(&self) -> bool {
        match self.cursor.peek_word() {
            Some(w) => {
                w == "*"
                    || w.trim_end_matches('-').parse::<AddrRange>().is_ok()
                    || matches!(self.cursor.peek_nth(1), Some(Token::Word(n)) if n.starts_with('-'))
            }
            None => false,
        }
    }

    fn parse_addr_range(&mut self) -> Result<AddrRange> {
        let line = self.cursor.line();
        let mut text = self.cursor.expect_word("an address")?;
        // `a - b`, `a -b` and `a- b` all name one range
        if text.len() > 1 && text.ends_with('-') {
            let to = self.cursor.expect_word("end of address range")?;
            text.push_str(&to);
        } else if let Some(rest) = self
            .cursor
            .peek_word()
            .and_then(|w| w.strip_prefix('-'))
            .map(str::to_string)
        {
            self.cursor.next();
            let to = if rest.is_empty() {
                self.cursor.expect_word("end of address range")?
            } else {
                rest
            };
            text = format!("{text}-{to}");
        }

        let range = text.parse::<AddrRange>().map_err(|e| {
            CompileError::malformed(line, format!("malformed address {text}: {e:#}"))
        })?;

        let family = self.protocol.family();
        if !range.is_family(family) {
            return Err(CompileError::malformed(
                line,
                format!(
                    "address {range} is not {family}, as required by {}",
                    self.protocol
                ),
            ));
        }
        Ok(range)
    }

    /// `*`, an address range, `[range, ...]` or a table reference.
    fn parse_addr_set(&mut self) -> Result<AddrSet> {
        if self.cursor.eat(&Token::LBracket) {
            let mut entries = vec![self.parse_addr_range()?];
            while self.cursor.eat(&Token::Comma) {
                entries.push(self.parse_addr_range()?);
            }
            self.cursor.expect(&Token::RBracket, "',' or ']' in address list")?;
            return Ok(AddrSet::Inline(entries));
        }

        if self.looks_like_addr() {
            return Ok(AddrSet::Inline(vec![self.parse_addr_range()?]));
        }

        if self.cursor.peek_keyword("table") {
            self.cursor.next();
        }
        let (name, entries) = self.parse_table_ref()?;
        Ok(AddrSet::Table { name, entries })
    }

    /// `{interface, group, sources}`; an empty or `*` interface matches all.
    fn parse_rule(&mut self) -> Result<Rule> {
        self.cursor.expect(&Token::Open, "'{' to start a rule")?;

        let interface = match self.cursor.peek_word() {
            None => None,
            Some("*") => {
                self.cursor.next();
                None
            }
            Some(_) => Some(self.parse_if_name("interface name or '*'")?),
        };
        self.cursor.expect(&Token::Comma, "',' after rule interface")?;
        let group = self.parse_addr_set()?;
        self.cursor.expect(&Token::Comma, "',' after rule group")?;
        let sources = self.parse_addr_set()?;
        self.cursor.expect(&Token::Close, "'}' to end a rule")?;

        Ok(Rule {
            interface,
            group,
            sources,
        })
    }

    fn parse_filter(&mut self) -> Result<DirectionFilter> {
        let line = self.cursor.line();
        let filter_type = self
            .cursor
            .expect_word("whitelist or blacklist")?
            .parse::<FilterType>()
            .map_err(|e| CompileError::malformed(line, e.to_string()))?;

        let mut rules = Vec::new();
        while self.cursor.peek() == Some(&Token::Open) {
            rules.push(self.parse_rule()?);
        }
        Ok(DirectionFilter { filter_type, rules })
    }

    fn parse_direction(&mut self) -> Result<Direction> {
        let line = self.cursor.line();
        self.cursor
            .expect_word("in or out")?
            .parse::<Direction>()
            .map_err(|e| CompileError::malformed(line, e.to_string()))
    }

    fn parse_instance_command(&mut self) -> Result<Statement> {
        let name = self.parse_name("instance name")?;
        match self.cursor.peek() {
            Some(Token::Open) => self.parse_instance_body(name).map(Statement::Instance),
            Some(Token::Colon) => self.parse_instance_shorthand(name).map(Statement::Instance),
            Some(Token::Word(w)) if w.parse::<Role>().is_ok() => {
                self.parse_binding(name).map(Statement::Binding)
            }
            _ => Err(self
                .cursor
                .error("expected '{', ':', upstream or downstream after instance name")),
        }
    }

    fn at_section_label(&self) -> Option<Role> {
        match (self.cursor.peek_word(), self.cursor.peek_nth(1)) {
            (Some(w), Some(Token::Colon)) => w.parse().ok(),
            _ => None,
        }
    }

    fn parse_instance_body(&mut self, name: String) -> Result<InstanceDefinition> {
        self.cursor.expect(&Token::Open, "'{'")?;
        let mut instance = InstanceDefinition::new(name);
        let mut seen = Vec::new();

        while !self.cursor.eat(&Token::Close) {
            let role = self
                .at_section_label()
                .ok_or_else(|| self.cursor.error("expected downstream: or upstream: section"))?;
            if seen.contains(&role) {
                return Err(self.cursor.error(format!("{role} section given twice")));
            }
            seen.push(role);
            self.cursor.next();
            self.cursor.next();

            let mut count = 0;
            while self.cursor.peek_word().is_some() && self.at_section_label().is_none() {
                let line = self.cursor.line();
                let if_name = self.parse_if_name("interface name")?;

                let mut interface = InterfaceDefinition::new(if_name);
                if self.cursor.eat(&Token::Open) {
                    while !self.cursor.eat(&Token::Close) {
                        let direction = self.parse_direction()?;
                        self.cursor.expect(&Token::Colon, "':' after direction")?;
                        let filter_line = self.cursor.line();
                        let filter = self.parse_filter()?;
                        interface
                            .filters_mut()
                            .attach(direction, filter)
                            .map_err(|e| CompileError::malformed(filter_line, e.to_string()))?;
                    }
                }

                add_interface(&mut instance, role, interface, line)?;
                count += 1;
                self.cursor.eat(&Token::Comma);
            }

            if count == 0 {
                return Err(self
                    .cursor
                    .error(format!("expected at least one {role} interface")));
            }
        }

        for role in [Role::Downstream, Role::Upstream] {
            if !seen.contains(&role) {
                return Err(self.cursor.error(format!(
                    "instance {} lacks a {role} section",
                    instance.name()
                )));
            }
        }

        self.cursor.expect_end("instance definition")?;
        Ok(instance)
    }

    /// `NAME: up... ==> down...`
    fn parse_instance_shorthand(&mut self, name: String) -> Result<InstanceDefinition> {
        self.cursor.expect(&Token::Colon, "':'")?;
        let mut instance = InstanceDefinition::new(name);

        for (role, terminator) in [(Role::Upstream, Some(Token::Arrow)), (Role::Downstream, None)] {
            let mut count = 0;
            while self.cursor.peek_word().is_some() {
                let line = self.cursor.line();
                let interface = InterfaceDefinition::new(self.parse_if_name("interface name")?);
                add_interface(&mut instance, role, interface, line)?;
                self.cursor.eat(&Token::Comma);
                count += 1;
            }

            if count == 0 {
                return Err(self
                    .cursor
                    .error(format!("expected at least one {role} interface")));
            }

            if let Some(t) = terminator {
                self.cursor.expect(&t, "'==>' between upstream and downstream interfaces")?;
            }
        }

        self.cursor.expect_end("instance definition")?;
        Ok(instance)
    }

    /// `NAME ROLE (IFNAME | *) DIR FTYPE {rule}...`
    fn parse_binding(&mut self, instance: String) -> Result<RuleBinding> {
        let line = self.cursor.line();
        let role = self
            .cursor
            .expect_word("upstream or downstream")?
            .parse::<Role>()
            .map_err(|e| CompileError::malformed(line, e.to_string()))?;
        let interface = if self.cursor.eat(&Token::Word("*".to_string())) {
            None
        } else {
            Some(self.parse_if_name("interface name or '*'")?)
        };
        let direction = self.parse_direction()?;
        let filter = self.parse_filter()?;
        self.cursor.expect_end("rule binding")?;

        Ok(RuleBinding {
            line,
            instance,
            role,
            interface,
            direction,
            filter,
        })
    }
}
