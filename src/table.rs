use std::fmt::{Display, Formatter};

use serde::Serialize;

use crate::addr::AddrRange;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Table {
    pub name: String,
    pub entries: Vec<AddrRange>,
}

/// Named tables in definition order.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(transparent)]
pub struct TableSet {
    tables: Vec<Table>,
}

impl TableSet {
    pub fn get(&self, name: &str) -> Option<&Table> {
        self.tables.iter().find(|t| t.name == name)
    }

    /// Returns `false` and leaves the set untouched if the name is taken.
    #[must_use]
    pub fn insert(&mut self, table: Table) -> bool {
        if self.get(&table.name).is_some() {
            return false;
        }
        self.tables.push(table);
        true
    }

    pub fn iter(&self) -> impl Iterator<Item = &Table> {
        self.tables.iter()
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}

impl Display for Table {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "table {} {{", self.name)?;
        for (i, e) in self.entries.iter().enumerate() {
            f.write_str(if i == 0 { " " } else { ", " })?;
            write!(f, "{e}")?;
        }
        f.write_str(" }")
    }
}

impl Display for TableSet {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        for t in &self.tables {
            writeln!(f, "{t}")?;
        }
        Ok(())
    }
}
