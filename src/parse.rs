use core::{fmt, str::FromStr};
use serde::Deserialize;
use std::sync::LazyLock;

use regex::Regex;

const PROMPT: &str = ">>>";
const CONTINUATION: &str = "...";
const BLANKLINE: &str = "<BLANKLINE>";

static DIRECTIVE: LazyLock<Regex> = LazyLock::new(|| {
  Regex::new(r#"#\s*doctest:\s*(?P<flags>[^#'"]*)$"#).expect("valid directive regex")
});

/// Option flags that change how a single example is run and checked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Directive {
  /// Do not run the example.
  Skip,
  /// `...` in the expected output matches any text.
  Ellipsis,
  /// Every run of whitespace compares equal to a single space.
  NormalizeWhitespace,
  /// The example is expected to exit with a non-zero status.
  Error,
}

impl Directive {
  const fn name(self) -> &'static str {
    match self {
      Self::Skip => "SKIP",
      Self::Ellipsis => "ELLIPSIS",
      Self::NormalizeWhitespace => "NORMALIZE_WHITESPACE",
      Self::Error => "ERROR",
    }
  }
}

impl fmt::Display for Directive {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.name())
  }
}

impl FromStr for Directive {
  type Err = ();
  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s {
      "SKIP" => Ok(Self::Skip),
      "ELLIPSIS" => Ok(Self::Ellipsis),
      "NORMALIZE_WHITESPACE" => Ok(Self::NormalizeWhitespace),
      "ERROR" => Ok(Self::Error),
      _ => Err(()),
    }
  }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Directives {
  pub skip: bool,
  pub ellipsis: bool,
  pub normalize_whitespace: bool,
  pub error: bool,
}

impl Directives {
  pub fn set(&mut self, directive: Directive, on: bool) {
    match directive {
      Directive::Skip => self.skip = on,
      Directive::Ellipsis => self.ellipsis = on,
      Directive::NormalizeWhitespace => self.normalize_whitespace = on,
      Directive::Error => self.error = on,
    }
  }
}

impl FromIterator<Directive> for Directives {
  fn from_iter<I: IntoIterator<Item = Directive>>(iter: I) -> Self {
    let mut directives = Self::default();
    for directive in iter {
      directives.set(directive, true);
    }
    directives
  }
}

/// One `>>>` example and the output it should produce.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Example {
  /// Source lines without prompts, joined by `\n`.
  pub source: String,
  /// Expected output, every line terminated by `\n`.
  pub want: String,
  /// 1-based line of the `>>>` prompt.
  pub line: usize,
  pub directives: Directives,
}

impl Example {
  /// First source line, used to name the example in reports.
  pub fn summary(&self) -> &str {
    self.source.lines().next().unwrap_or_default()
  }
}

#[derive(Debug, thiserror::Error)]
pub enum ParseError {
  #[error("line {line}: unknown doctest directive '{name}'")]
  UnknownDirective { line: usize, name: String },
  #[error("line {line}: doctest directive '{text}' must start with '+' or '-'")]
  MalformedDirective { line: usize, text: String },
}

/// Split `line` into its indentation and the text after `prompt`.
///
/// The prompt must be followed by a space or end the line.
fn split_prompt<'a>(line: &'a str, prompt: &str) -> Option<(&'a str, &'a str)> {
  let body = line.trim_start();
  let indent = &line[..line.len() - body.len()];
  let rest = body.strip_prefix(prompt)?;
  if rest.is_empty() {
    Some((indent, rest))
  } else {
    rest.strip_prefix(' ').map(|rest| (indent, rest))
  }
}

fn is_fence(line: &str) -> bool {
  let line = line.trim_start();
  line.starts_with("```") || line.starts_with("~~~")
}

fn directives(
  first: &mut String,
  line: usize,
  mut directives: Directives,
) -> Result<Directives, ParseError> {
  let Some(caps) = DIRECTIVE.captures(first) else {
    return Ok(directives);
  };
  let start = caps.get(0).map_or(first.len(), |m| m.start());
  for text in caps["flags"].split([',', ' ', '\t']).filter(|s| !s.is_empty()) {
    let (on, name) = if let Some(name) = text.strip_prefix('+') {
      (true, name)
    } else if let Some(name) = text.strip_prefix('-') {
      (false, name)
    } else {
      return Err(ParseError::MalformedDirective { line, text: text.to_owned() });
    };
    let directive = name
      .parse::<Directive>()
      .map_err(|_| ParseError::UnknownDirective { line, name: name.to_owned() })?;
    directives.set(directive, on);
  }
  first.truncate(start);
  first.truncate(first.trim_end().len());
  Ok(directives)
}

/// Collect every example in `text`.
///
/// `defaults` are the directives every example starts with before its own
/// `# doctest:` comment is applied.
pub fn parse(text: &str, defaults: Directives) -> Result<Vec<Example>, ParseError> {
  let lines: Vec<&str> = text.lines().collect();
  let mut examples = Vec::new();
  let mut i = 0;
  while i < lines.len() {
    let Some((indent, first)) = split_prompt(lines[i], PROMPT) else {
      i += 1;
      continue;
    };
    let line = i + 1;
    let mut first = first.to_owned();
    let directives = directives(&mut first, line, defaults)?;
    let mut source = vec![first];
    i += 1;
    while let Some((_, rest)) = lines
      .get(i)
      .and_then(|l| split_prompt(l, CONTINUATION))
      .filter(|(ind, _)| *ind == indent)
    {
      source.push(rest.to_owned());
      i += 1;
    }
    let mut want = String::new();
    while let Some(l) = lines.get(i) {
      if l.trim().is_empty() || is_fence(l) || split_prompt(l, PROMPT).is_some() {
        break;
      }
      // a misindented continuation ends the example
      if split_prompt(l, CONTINUATION).is_some_and(|(ind, _)| ind != indent) {
        break;
      }
      let Some(rest) = l.strip_prefix(indent) else {
        break;
      };
      if rest != BLANKLINE {
        want.push_str(rest);
      }
      want.push('\n');
      i += 1;
    }
    examples.push(Example { source: source.join("\n"), want, line, directives });
  }
  Ok(examples)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn prompt_and_output() {
    let text = "Some prose.\n\n>>> echo hi\nhi\n\nMore prose.\n>>> true\n";
    let examples = parse(text, Directives::default()).unwrap();
    assert_eq!(examples.len(), 2);
    assert_eq!(examples[0].source, "echo hi");
    assert_eq!(examples[0].want, "hi\n");
    assert_eq!(examples[0].line, 3);
    assert_eq!(examples[1].source, "true");
    assert_eq!(examples[1].want, "");
    assert_eq!(examples[1].line, 7);
  }

  #[test]
  fn continuation_and_indentation() {
    let text = "\
Example:
    >>> for i in 1 2; do
    ...   echo $i
    ... done
    1
    2
    >>> echo next
      indented
";
    let examples = parse(text, Directives::default()).unwrap();
    assert_eq!(examples.len(), 2);
    assert_eq!(examples[0].source, "for i in 1 2; do\n  echo $i\ndone");
    assert_eq!(examples[0].want, "1\n2\n");
    assert_eq!(examples[1].source, "echo next");
    assert_eq!(examples[1].want, "  indented\n");
  }

  #[test]
  fn misindented_continuation_ends_example() {
    let examples = parse(">>> echo a\n  ... echo b\na\n", Directives::default()).unwrap();
    assert_eq!(examples.len(), 1);
    assert_eq!(examples[0].source, "echo a");
    assert_eq!(examples[0].want, "");
    let text = "    >>> echo a\n  ... echo b\n    a\n";
    let examples = parse(text, Directives::default()).unwrap();
    assert_eq!(examples[0].source, "echo a");
    assert_eq!(examples[0].want, "");
  }

  #[test]
  fn output_ends_at_tilde_fence() {
    let text = "~~~\n>>> echo c\nc\n~~~\n  ~~~ indented\n";
    let examples = parse(text, Directives::default()).unwrap();
    assert_eq!(examples.len(), 1);
    assert_eq!(examples[0].want, "c\n");
  }

  #[test]
  fn output_ends_at_dedent_and_fence() {
    let text = "  >>> echo a\n  a\nb\n```\n>>> echo c\nc\n```\n";
    let examples = parse(text, Directives::default()).unwrap();
    assert_eq!(examples[0].want, "a\n");
    assert_eq!(examples[1].want, "c\n");
  }

  #[test]
  fn not_a_prompt() {
    let text = ">>>echo no\n>>\n  ... >>> nope\n";
    assert!(parse(text, Directives::default()).unwrap().is_empty());
  }

  #[test]
  fn blankline() {
    let text = ">>> printf 'a\\n\\nb\\n'\na\n<BLANKLINE>\nb\n";
    let examples = parse(text, Directives::default()).unwrap();
    assert_eq!(examples[0].want, "a\n\nb\n");
  }

  #[test]
  fn directive_comment() {
    let text = ">>> date  # doctest: +ELLIPSIS, +NORMALIZE_WHITESPACE\nMon ...\n\
                >>> exit 1 #doctest:+ERROR -SKIP\n";
    let defaults = Directives { skip: true, ..Default::default() };
    let examples = parse(text, defaults).unwrap();
    assert_eq!(examples[0].source, "date");
    assert_eq!(
      examples[0].directives,
      Directives { skip: true, ellipsis: true, normalize_whitespace: true, error: false }
    );
    assert_eq!(examples[1].source, "exit 1");
    assert_eq!(
      examples[1].directives,
      Directives { error: true, ..Default::default() }
    );
  }

  #[test]
  fn directive_inside_quotes_is_source() {
    let text = ">>> echo 'see # doctest: +SKIP'\nsee # doctest: +SKIP\n";
    let examples = parse(text, Directives::default()).unwrap();
    assert_eq!(examples[0].source, "echo 'see # doctest: +SKIP'");
    assert_eq!(examples[0].want, "see # doctest: +SKIP\n");
    assert_eq!(examples[0].directives, Directives::default());
    let text = ">>> grep \"# doctest:\" notes.md  # doctest: +SKIP\n";
    let examples = parse(text, Directives::default()).unwrap();
    assert_eq!(examples[0].source, "grep \"# doctest:\" notes.md");
    assert!(examples[0].directives.skip);
  }

  #[test]
  fn bad_directives() {
    let err = parse(">>> x # doctest: +FOO\n", Directives::default()).unwrap_err();
    assert!(matches!(err, ParseError::UnknownDirective { line: 1, ref name } if name == "FOO"));
    let err = parse("\n>>> x # doctest: SKIP\n", Directives::default()).unwrap_err();
    assert!(matches!(err, ParseError::MalformedDirective { line: 2, .. }));
  }

  #[test]
  fn summary_is_first_line() {
    let examples = parse(">>> if true; then\n... echo y\n... fi\ny\n", Directives::default())
      .unwrap();
    assert_eq!(examples[0].summary(), "if true; then");
  }
}
