pub mod addr;
pub mod configuration;
pub mod error;
pub mod filter;
pub mod instance;
pub mod parser;
pub mod protocol;
pub mod resolver;
pub mod script;
pub mod table;

pub use configuration::{compile, compile_with_resolver, CompileOptions, Configuration};
pub use error::{CompileError, Entity};

#[cfg(test)]
mod test;
