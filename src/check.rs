use core::fmt;
use std::{io, process::ExitStatus};

use colored::Colorize;
use itertools::Itertools;

use crate::parse::Directives;

const ELLIPSIS: &str = "...";

#[derive(Debug, thiserror::Error)]
pub enum CheckError {
  #[error("execute {0:?}: {1}")]
  Executes(Vec<String>, io::Error),
  #[error("exit code, want: {want}, got: {got}")]
  ExitCode { want: &'static str, got: i32 },
  #[error("terminated by a signal")]
  Terminated,
  #[error("output not equal\n{0}")]
  Eq(TextDiffs),
}

pub(crate) struct DisplayErrs<'a, E: fmt::Display>(pub(crate) &'a [E]);
impl<E: fmt::Display> fmt::Display for DisplayErrs<'_, E> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    for err in self.0 {
      writeln!(f, "ERROR {err}")?;
    }
    Ok(())
  }
}

/// Drop trailing whitespace of every line and trailing blank lines.
fn trim_lines(s: &str) -> String {
  s.lines().map(str::trim_end).join("\n").trim_end_matches('\n').to_owned()
}

fn normalize_whitespace(s: &str) -> String {
  s.split_whitespace().join(" ")
}

fn ellipsis_match(want: &str, got: &str) -> bool {
  let pattern = want.split(ELLIPSIS).map(regex::escape).join("(?s:.*?)");
  regex::Regex::new(&format!(r"\A{pattern}\z")).is_ok_and(|re| re.is_match(got))
}

/// Whether `got` is an acceptable output for `want` under `directives`.
pub fn output_matches(want: &str, got: &str, directives: Directives) -> bool {
  let (mut want, mut got) = (trim_lines(want), trim_lines(got));
  if directives.normalize_whitespace {
    want = normalize_whitespace(&want);
    got = normalize_whitespace(&got);
  }
  if want == got {
    return true;
  }
  directives.ellipsis && ellipsis_match(&want, &got)
}

pub fn check_output(want: &str, got: &str, directives: Directives) -> Result<(), CheckError> {
  if output_matches(want, got, directives) {
    Ok(())
  } else {
    Err(CheckError::Eq(TextDiffs(want.to_owned(), got.to_owned())))
  }
}

/// Exit status must be zero, or non-zero when the example expects an error.
pub fn check_status(status: ExitStatus, directives: Directives) -> Result<(), CheckError> {
  match (status.code(), directives.error) {
    (None, _) => Err(CheckError::Terminated),
    (Some(0), false) => Ok(()),
    (Some(got), false) => Err(CheckError::ExitCode { want: "0", got }),
    (Some(0), true) => Err(CheckError::ExitCode { want: "non-zero", got: 0 }),
    (Some(_), true) => Ok(()),
  }
}

#[derive(Debug)]
pub struct TextDiffs(String, String);
// https://github.com/mitsuhiko/similar/blob/main/examples/terminal-inline.rs
impl fmt::Display for TextDiffs {
  #[inline]
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    use similar::ChangeTag;
    struct Line(Option<usize>);
    impl fmt::Display for Line {
      fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
          None => write!(f, "    "),
          Some(idx) => write!(f, "{:<4}", idx + 1),
        }
      }
    }
    let diff = similar::TextDiff::from_lines(&self.0, &self.1);
    for (idx, group) in diff.grouped_ops(3).iter().enumerate() {
      if idx > 0 {
        writeln!(f, "{:-^1$}", "-", 80)?;
      }
      writeln!(f, "want got")?;
      for op in group {
        for change in diff.iter_inline_changes(op) {
          let sign = match change.tag() {
            ChangeTag::Delete => "-",
            ChangeTag::Insert => "+",
            ChangeTag::Equal => " ",
          };
          write!(f, "{}{} |{}", Line(change.old_index()), Line(change.new_index()), sign)?;
          for (emphasized, value) in change.iter_strings_lossy() {
            if emphasized {
              write!(f, "{}", (&*value).underline())?;
            } else {
              write!(f, "{value}")?;
            }
          }
          if change.missing_newline() {
            writeln!(f)?;
          }
        }
      }
    }
    Ok(())
  }
}
