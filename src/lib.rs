//! Collect `>>>` examples from documentation files, execute them and compare
//! their output with the expected one.
mod check;
mod config;
mod options;
mod parse;
mod runner;

pub use check::{CheckError, output_matches};
pub use config::{CONFIG_FILE, Config, ConfigError, Project};
pub use options::Options;
pub use parse::{Directive, Directives, Example, ParseError, parse};
pub use runner::{BuildError, TestError};
