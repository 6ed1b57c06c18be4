use clap::Parser;
use std::ffi::OsString;

/// Options of a single doctest run.
///
/// Built once from the command line (or with the builder methods below) and
/// handed by value to [`Project::run_tests`](crate::Project::run_tests).
#[derive(Debug, Clone, Default, Parser)]
#[command(
  name = "doctest",
  version,
  about = "Run the doctest examples of a project",
  long_about = None
)]
pub struct Options {
  #[clap(short, long, help = "Print every example together with its result")]
  pub verbose: bool,
  #[clap(
    short,
    long,
    help = "Normal mode, prepend the configured prelude to every example [default: strict]"
  )]
  pub normal: bool,
  /// Paths relative to the project root that are never tested.
  /// Glob patterns are allowed.
  #[clap(skip)]
  pub blacklist: Vec<String>,
  #[clap(
    value_parser,
    help = "Only test files whose path contains one of the targets [default: all]"
  )]
  pub targets: Vec<String>,
}

impl Options {
  pub fn new() -> Self {
    Self::default()
  }
  pub const fn verbose(mut self) -> Self {
    self.verbose = true;
    self
  }
  pub const fn normal(mut self) -> Self {
    self.normal = true;
    self
  }
  pub fn blacklist(mut self, iter: impl IntoIterator<Item = impl AsRef<str>>) -> Self {
    self.blacklist = iter.into_iter().map(|s| s.as_ref().into()).collect();
    self
  }
  pub fn targets(mut self, iter: impl IntoIterator<Item = impl AsRef<str>>) -> Self {
    self.targets = iter.into_iter().map(|s| s.as_ref().into()).collect();
    self
  }
  pub fn parse_from<I, T>(itr: I) -> Self
  where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
  {
    <Self as Parser>::parse_from(itr)
  }
}
