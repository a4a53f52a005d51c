use std::fmt::{Display, Formatter};
use std::path::PathBuf;

use thiserror::Error;

/// The kind of named thing a definition or reference error is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Entity {
    Protocol,
    Table,
    Instance,
    Interface,
    Filter,
}

impl Display for Entity {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Protocol => "protocol",
            Self::Table => "table",
            Self::Instance => "proxy instance",
            Self::Interface => "interface",
            Self::Filter => "filter",
        })
    }
}

/// Everything that can go wrong while turning a script into a [`crate::Configuration`].
///
/// Compilation stops at the first error; no partially built configuration
/// escapes alongside it.
#[derive(Debug, Error)]
pub enum CompileError {
    #[error("failed to open config file {path}: {source}")]
    IoFailure {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("line {line}: {message}")]
    MalformedCommand { line: usize, message: String },

    #[error("line {line}: {entity} {name} already exists")]
    DuplicateDefinition {
        line: usize,
        entity: Entity,
        name: String,
    },

    #[error("line {line}: unknown {entity} {name}")]
    UnresolvedReference {
        line: usize,
        entity: Entity,
        name: String,
    },

    #[error("interface {interface} of proxy instance {instance} not found")]
    UnknownInterface { instance: String, interface: String },

    #[error("failed to add proxy instance {instance}: {reason}")]
    ResolutionFailure { instance: String, reason: String },
}

impl CompileError {
    pub(crate) fn malformed(line: usize, message: impl Into<String>) -> Self {
        Self::MalformedCommand {
            line,
            message: message.into(),
        }
    }

    /// Source line the error points at, when it came from a script command.
    pub fn line(&self) -> Option<usize> {
        match self {
            Self::MalformedCommand { line, .. }
            | Self::DuplicateDefinition { line, .. }
            | Self::UnresolvedReference { line, .. } => Some(*line),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, CompileError>;
