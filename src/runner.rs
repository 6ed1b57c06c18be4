use core::fmt;
use std::{
  io,
  path::{Component, Path, PathBuf},
  time::{Duration, Instant},
};

use colored::Colorize;
use itertools::{Either, Itertools};

use crate::{
  Options,
  check::{self, CheckError, DisplayErrs},
  config::Project,
  parse::{self, Example, ParseError},
};

const MATCH_OPTIONS: glob::MatchOptions = glob::MatchOptions {
  case_sensitive: true,
  require_literal_separator: true,
  require_literal_leading_dot: false,
};

#[derive(Debug, thiserror::Error)]
pub enum BuildError {
  #[error("read dir \"{0}\": {1}")]
  ReadDir(PathBuf, io::Error),
  #[error("search path \"{0}\" does not exist")]
  MissingPath(PathBuf),
  #[error("blacklist entry \"{0}\": {1}")]
  Blacklist(String, glob::PatternError),
}

#[derive(Debug, thiserror::Error)]
pub enum TestError {
  #[error("file \"{0}\": {1}")]
  UnableToRead(PathBuf, io::Error),
  #[error(transparent)]
  Parse(#[from] ParseError),
  #[error("line {line}: {code}\n{err}")]
  Example { line: usize, code: String, err: CheckError },
}

#[derive(Debug)]
pub(crate) struct FailedFile {
  name: String,
  errs: Vec<TestError>,
}

pub(crate) enum State {
  Ok(Option<Duration>),
  Failed(Option<Duration>),
  Ignored,
  FilteredOut,
}

impl fmt::Display for FailedFile {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "\n----------- {} -----------\n{}", self.name, DisplayErrs(&self.errs))
  }
}
impl fmt::Display for State {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::Ok(None) => write!(f, "{}", "ok".green()),
      Self::Ok(Some(time)) => write!(f, "{:.2}s {}", time.as_secs_f32(), "ok".green()),
      Self::Failed(Some(time)) => {
        write!(f, "{:.2}s {}", time.as_secs_f32(), "FAILED".red())
      }
      Self::Failed(None) => write!(f, "{}", "FAILED".red()),
      Self::Ignored => write!(f, "{}", "ignored".yellow()),
      Self::FilteredOut => write!(f, "{}", "filtered out".bright_black()),
    }
  }
}

/// Counters of one run. Examples are counted, except `count_filtered`
/// which counts files.
#[derive(Default)]
pub(crate) struct TestResult {
  count_ok: usize,
  count_failed: usize,
  count_ignored: usize,
  count_filtered: usize,
  faileds: Vec<FailedFile>,
}

#[derive(Default)]
struct FileResult {
  count_ok: usize,
  count_ignored: usize,
  errs: Vec<TestError>,
  lines: Vec<String>,
}

impl FileResult {
  fn failed(err: TestError) -> Self {
    Self { errs: vec![err], ..Default::default() }
  }
  fn state(&self, time: Duration) -> State {
    if !self.errs.is_empty() {
      State::Failed(Some(time))
    } else if self.count_ok == 0 {
      State::Ignored
    } else {
      State::Ok(Some(time))
    }
  }
}

/// Which files of the project take part in a run.
struct Selection {
  targets: Vec<String>,
  blacklist: Vec<(String, glob::Pattern)>,
}

fn normalize_target(target: &str) -> String {
  let target = target.replace('\\', "/");
  target.strip_prefix("./").unwrap_or(&target).to_owned()
}

impl Selection {
  fn new(project: &Project, options: &Options) -> Result<Self, Vec<BuildError>> {
    let targets = options.targets.iter().map(|t| normalize_target(t)).collect();
    let (blacklist, errs): (Vec<_>, Vec<_>) = project
      .config
      .blacklist
      .iter()
      .chain(&options.blacklist)
      .map(|entry| {
        let entry = normalize_target(entry).trim_end_matches('/').to_owned();
        match glob::Pattern::new(&entry) {
          Ok(pattern) => Ok((entry, pattern)),
          Err(e) => Err(BuildError::Blacklist(entry, e)),
        }
      })
      .partition_result();
    if errs.is_empty() { Ok(Self { targets, blacklist }) } else { Err(errs) }
  }
  fn targeted(&self, name: &str) -> bool {
    self.targets.is_empty() || self.targets.iter().any(|t| name.contains(t.as_str()))
  }
  fn blacklisted(&self, name: &str) -> bool {
    self.blacklist.iter().any(|(entry, pattern)| {
      pattern.matches_with(name, MATCH_OPTIONS)
        || name.strip_prefix(entry.as_str()).is_some_and(|rest| rest.starts_with('/'))
    })
  }
  fn selected(&self, name: &str) -> bool {
    self.targeted(name) && !self.blacklisted(name)
  }
  /// Targets that are not part of any file name.
  fn unmatched<'a>(&'a self, names: &'a [String]) -> impl Iterator<Item = &'a str> {
    self
      .targets
      .iter()
      .filter(|t| !names.iter().any(|name| name.contains(t.as_str())))
      .map(String::as_str)
  }
}

/// Path of `file` relative to `rootdir`, `/` separated, with `.` and `..`
/// resolved.
fn rel_name(rootdir: &Path, file: &Path) -> String {
  let mut parts = Vec::new();
  for component in file.strip_prefix(rootdir).unwrap_or(file).components() {
    match component {
      Component::Normal(s) => parts.push(s.to_string_lossy()),
      Component::ParentDir => {
        parts.pop();
      }
      Component::CurDir | Component::RootDir | Component::Prefix(_) => {}
    }
  }
  parts.join("/")
}

fn skipped(path: &Path) -> bool {
  path
    .file_name()
    .and_then(|s| s.to_str())
    .is_some_and(|s| s.starts_with('.') || s == "target")
}

fn report(result: Result<TestResult, Vec<BuildError>>, now: Instant) -> bool {
  let time = now.elapsed().as_secs_f32();
  match result {
    Ok(TestResult { count_ok, count_failed, count_ignored, count_filtered, faileds }) => {
      println!();
      if faileds.is_empty() {
        println!(
          "test result: {}. {count_ok} passed; {count_failed} failed; {count_ignored} ignored; {count_filtered} filtered out; finished in {time:.2}s",
          State::Ok(None)
        );
        true
      } else {
        eprint!("failures:");
        for failed in &faileds {
          eprint!("{failed}");
        }
        eprintln!(
          "\n\ntest result: {}. {count_ok} passed; {count_failed} failed; {count_ignored} ignored; {count_filtered} filtered out; finished in {time:.2}s",
          State::Failed(None)
        );
        false
      }
    }
    Err(build_errs) => {
      eprintln!("Fail to build test:");
      for err in &build_errs {
        eprintln!("{err}");
      }
      false
    }
  }
}

impl Project {
  /// Run every selected example of the project.
  ///
  /// Prints one line per tested file and a summary. Returns `true` iff no
  /// example failed and the run could be set up.
  pub async fn run_tests(&self, options: Options) -> bool {
    let now = Instant::now();
    report(self.test(&options).await, now)
  }
  async fn test(&self, options: &Options) -> Result<TestResult, Vec<BuildError>> {
    let selection = Selection::new(self, options)?;
    let files = self.discover().await?;
    let names: Vec<String> = files.iter().map(|(name, _)| name.clone()).collect();
    for target in selection.unmatched(&names) {
      eprintln!("{}: target \"{target}\" does not match any file", "warning".yellow());
    }
    let prelude = options.normal.then(|| self.config.prelude.join("\n"));
    let mut result = TestResult::default();
    for (name, path) in files {
      if !selection.selected(&name) {
        result.count_filtered += 1;
        if options.verbose {
          println!("test {name} ... {}", State::FilteredOut);
        }
        continue;
      }
      let now = Instant::now();
      let Some(file) = self.test_file(&name, &path, prelude.as_deref(), options.verbose).await
      else {
        continue;
      };
      println!("test {name} ... {}", file.state(now.elapsed()));
      for line in &file.lines {
        println!("{line}");
      }
      result.count_ok += file.count_ok;
      result.count_ignored += file.count_ignored;
      if !file.errs.is_empty() {
        result.count_failed += file.errs.len();
        result.faileds.push(FailedFile { name, errs: file.errs });
      }
    }
    Ok(result)
  }
  /// Files with examples, `None` when the file has none.
  async fn test_file(
    &self,
    name: &str,
    path: &Path,
    prelude: Option<&str>,
    verbose: bool,
  ) -> Option<FileResult> {
    let text = match tokio::fs::read_to_string(path).await {
      Ok(text) => text,
      Err(e) => return Some(FileResult::failed(TestError::UnableToRead(path.to_path_buf(), e))),
    };
    let examples = match parse::parse(&text, self.config.default_directives()) {
      Ok(examples) if examples.is_empty() => return None,
      Ok(examples) => examples,
      Err(e) => return Some(FileResult::failed(e.into())),
    };
    let mut file = FileResult::default();
    for example in &examples {
      let state = if example.directives.skip {
        file.count_ignored += 1;
        State::Ignored
      } else {
        let now = Instant::now();
        match self.run_example(name, example, prelude).await {
          Ok(()) => {
            file.count_ok += 1;
            State::Ok(Some(now.elapsed()))
          }
          Err(err) => {
            file.errs.push(TestError::Example {
              line: example.line,
              code: example.source.clone(),
              err,
            });
            State::Failed(Some(now.elapsed()))
          }
        }
      };
      if verbose {
        file.lines.push(format!("    line {}: {} ... {state}", example.line, example.summary()));
      }
    }
    Some(file)
  }
  async fn run_example(
    &self,
    name: &str,
    example: &Example,
    prelude: Option<&str>,
  ) -> Result<(), CheckError> {
    let output =
      self.config.eval(&self.rootdir, name, example, prelude).exe(&self.rootdir).await?;
    let mut got = String::from_utf8_lossy(&output.stdout).into_owned();
    got.push_str(&String::from_utf8_lossy(&output.stderr));
    check::check_output(&example.want, &got, example.directives)?;
    check::check_status(output.status, example.directives)
  }
  /// Candidate files as `(name, path)`, sorted by name.
  async fn discover(&self) -> Result<Vec<(String, PathBuf)>, Vec<BuildError>> {
    let mut files = Vec::new();
    let mut errs = Vec::new();
    for path in &self.config.paths {
      let search = self.rootdir.join(path);
      if search.is_file() {
        if self.config.match_extension(&search) {
          files.push(search);
        }
      } else if search.is_dir() {
        match walk(search, self).await {
          Ok(found) => files.extend(found),
          Err(e) => errs.extend(e),
        }
      } else {
        errs.push(BuildError::MissingPath(search));
      }
    }
    if !errs.is_empty() {
      return Err(errs);
    }
    Ok(
      files
        .into_iter()
        .map(|path| (rel_name(&self.rootdir, &path), path))
        .sorted_by(|a, b| a.0.cmp(&b.0))
        .dedup_by(|a, b| a.0 == b.0)
        .collect(),
    )
  }
}

#[async_recursion::async_recursion]
async fn walk(current_path: PathBuf, project: &Project) -> Result<Vec<PathBuf>, Vec<BuildError>> {
  let mut read_dir = match tokio::fs::read_dir(&current_path).await {
    Ok(read_dir) => read_dir,
    Err(e) => return Err(vec![BuildError::ReadDir(current_path, e)]),
  };
  let mut entries = Vec::new();
  loop {
    match read_dir.next_entry().await {
      Ok(Some(entry)) => entries.push(entry.path()),
      Ok(None) => break,
      Err(e) => return Err(vec![BuildError::ReadDir(current_path, e)]),
    }
  }
  let (sub_dirs, mut files): (Vec<_>, Vec<_>) =
    entries.into_iter().filter(|path| !skipped(path)).partition_map(|path| {
      if path.is_dir() { Either::Left(path) } else { Either::Right(path) }
    });
  files.retain(|file| project.config.match_extension(file));
  let mut errs = Vec::new();
  for sub_dir in sub_dirs {
    match walk(sub_dir, project).await {
      Ok(found) => files.extend(found),
      Err(e) => errs.extend(e),
    }
  }
  if errs.is_empty() { Ok(files) } else { Err(errs) }
}
