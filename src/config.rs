use indexmap::IndexMap;
use serde::Deserialize;
use std::{
  collections::HashSet,
  ffi::OsStr,
  fs::read_to_string,
  io,
  path::{Path, PathBuf},
  process::{Output, Stdio},
};

use crate::{
  check::CheckError,
  parse::{Directive, Directives, Example},
};

pub const CONFIG_FILE: &str = "doctest.toml";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
  #[error("could not find `doctest.toml` in \"{0}\" or any parent directory")]
  NotFound(PathBuf),
  #[error("dir \"{0}\": {1}")]
  UnableToReadDir(PathBuf, io::Error),
  #[error("file \"{0}\": {1}")]
  UnableToRead(PathBuf, io::Error),
  #[error("file \"{0}\": {1}")]
  Toml(PathBuf, toml::de::Error),
  #[error("file \"{0}\": need to specify '{1}'")]
  MissConfig(PathBuf, &'static str),
  #[error("file \"{0}\": extensions can not contain 'toml'")]
  InputExtToml(PathBuf),
}

/// Content of `doctest.toml`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct Config {
  /// Program that runs every example.
  pub exe_path: String,
  /// Arguments of `exe-path`, `{{source}}` expands to the example source.
  pub args: Vec<String>,
  pub envs: IndexMap<String, String>,
  /// Extensions of the files searched for examples.
  pub extensions: HashSet<String>,
  /// Directories (or files) searched, relative to the project root.
  pub paths: Vec<String>,
  /// Paths relative to the project root that are never tested.
  pub blacklist: Vec<String>,
  /// Lines prepended to every example in normal mode.
  pub prelude: Vec<String>,
  /// Directives every example starts with.
  pub directives: Vec<Directive>,
}

impl Default for Config {
  fn default() -> Self {
    Self {
      exe_path: "sh".into(),
      args: vec!["-c".into(), "{{source}}".into()],
      envs: IndexMap::new(),
      extensions: ["md", "txt"].into_iter().map(Into::into).collect(),
      paths: vec![".".into()],
      blacklist: Vec::new(),
      prelude: Vec::new(),
      directives: Vec::new(),
    }
  }
}

impl Config {
  pub fn from_toml(config_path: &Path, toml_str: &str) -> Result<Self, ConfigError> {
    let config = toml::from_str::<Self>(toml_str)
      .map_err(|e| ConfigError::Toml(config_path.to_path_buf(), e))?;
    config.check(config_path)?;
    Ok(config)
  }
  fn check(&self, config_path: &Path) -> Result<(), ConfigError> {
    if self.exe_path.is_empty() {
      return Err(ConfigError::MissConfig(config_path.to_path_buf(), "exe-path"));
    }
    if self.extensions.is_empty() {
      return Err(ConfigError::MissConfig(config_path.to_path_buf(), "extensions"));
    }
    if self.extensions.contains("toml") {
      return Err(ConfigError::InputExtToml(config_path.to_path_buf()));
    }
    Ok(())
  }
  pub(crate) fn match_extension(&self, file: &Path) -> bool {
    file.extension().and_then(OsStr::to_str).is_some_and(|s| self.extensions.contains(s))
  }
  pub(crate) fn default_directives(&self) -> Directives {
    self.directives.iter().copied().collect()
  }
  /// Expand the templates of `args` and `envs` for one example.
  ///
  /// `prelude` is prepended to the example source when present.
  pub(crate) fn eval(
    &self,
    rootdir: &Path,
    name: &str,
    example: &Example,
    prelude: Option<&str>,
  ) -> Invocation {
    let source = match prelude {
      Some(prelude) if !prelude.is_empty() => format!("{prelude}\n{}", example.source),
      _ => example.source.clone(),
    };
    let rootdir = rootdir.display().to_string();
    let line = example.line.to_string();
    let eval_str = |s: &str| -> String {
      s.replace("{{file}}", name)
        .replace("{{line}}", &line)
        .replace("{{rootdir}}", &rootdir)
        .replace("{{source}}", &source)
    };
    let args = self.args.iter().map(|s| eval_str(s)).collect();
    let mut envs: IndexMap<String, String> =
      self.envs.iter().map(|(k, v)| (k.clone(), eval_str(v))).collect();
    envs.insert("DOCTEST_ROOT".to_owned(), rootdir.clone());
    envs.insert("DOCTEST_FILE".to_owned(), name.to_owned());
    envs.insert("DOCTEST_LINE".to_owned(), line.clone());
    Invocation { exe_path: self.exe_path.clone(), args, envs }
  }
}

/// One fully expanded example command.
#[derive(Debug, Clone)]
pub(crate) struct Invocation {
  pub(crate) exe_path: String,
  pub(crate) args: Vec<String>,
  pub(crate) envs: IndexMap<String, String>,
}

impl Invocation {
  pub(crate) async fn exe(&self, workdir: &Path) -> Result<Output, CheckError> {
    tokio::process::Command::new(&self.exe_path)
      .current_dir(workdir)
      .args(&self.args)
      .envs(&self.envs)
      .stdin(Stdio::null())
      .output()
      .await
      .map_err(|e| {
        CheckError::Executes(
          {
            let mut v = vec![self.exe_path.clone()];
            v.extend(self.args.iter().cloned());
            v
          },
          e,
        )
      })
  }
}

/// A directory holding `doctest.toml` and the files it describes.
#[derive(Debug, Clone)]
pub struct Project {
  pub(crate) rootdir: PathBuf,
  pub(crate) config: Config,
}

impl Project {
  pub fn new(rootdir: impl AsRef<Path>, config: Config) -> Self {
    Self { rootdir: rootdir.as_ref().to_path_buf(), config }
  }
  /// Locate the project containing the current working directory.
  pub fn locate() -> Result<Self, ConfigError> {
    let cwd = std::env::current_dir()
      .map_err(|e| ConfigError::UnableToReadDir(PathBuf::from("."), e))?;
    Self::locate_from(cwd)
  }
  /// Walk up from `dir` to the first directory containing `doctest.toml`.
  pub fn locate_from(dir: impl AsRef<Path>) -> Result<Self, ConfigError> {
    let dir = dir.as_ref();
    let start = std::fs::canonicalize(dir)
      .map_err(|e| ConfigError::UnableToReadDir(dir.to_path_buf(), e))?;
    match start.ancestors().find(|d| d.join(CONFIG_FILE).is_file()) {
      Some(rootdir) => Self::load(rootdir),
      None => Err(ConfigError::NotFound(start)),
    }
  }
  /// Load `<rootdir>/doctest.toml`.
  pub fn load(rootdir: impl AsRef<Path>) -> Result<Self, ConfigError> {
    let config_path = rootdir.as_ref().join(CONFIG_FILE);
    let toml_str = read_to_string(&config_path)
      .map_err(|e| ConfigError::UnableToRead(config_path.clone(), e))?;
    let config = Config::from_toml(&config_path, &toml_str)?;
    Ok(Self::new(rootdir, config))
  }
  pub fn rootdir(&self) -> &Path {
    &self.rootdir
  }
  pub fn config(&self) -> &Config {
    &self.config
  }
}
