use std::path::{Path, PathBuf};

use assert_cmd::Command;
use predicates::{prelude::PredicateBooleanExt, str::contains};

fn fixture(name: &str) -> PathBuf {
  Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures").join(name)
}

fn doctest(dir: impl AsRef<Path>) -> Command {
  let mut cmd = Command::cargo_bin("doctest").unwrap();
  cmd.current_dir(dir).env("NO_COLOR", "1").env("CLICOLOR", "0").env_remove("CLICOLOR_FORCE");
  cmd
}

#[test]
fn help_exits_successfully() {
  doctest(fixture("fail"))
    .arg("-h")
    .assert()
    .success()
    .stdout(contains("Usage").and(contains("--verbose")).and(contains("--normal")))
    .stdout(contains("test result").not());
}

#[test]
fn unknown_flag_is_a_usage_error() {
  doctest(fixture("pass")).arg("--no-such-flag").assert().code(2).stderr(contains("Usage"));
}

#[test]
fn passing_project_exits_zero() {
  doctest(fixture("pass")).assert().success().stdout(
    contains("test docs/intro.md ...")
      .and(contains("test docs/sub/more.txt ..."))
      .and(contains("legacy").not())
      .and(contains("test result: ok. 8 passed; 0 failed; 1 ignored; 1 filtered out")),
  );
}

#[test]
fn project_is_found_from_a_subdirectory() {
  doctest(fixture("pass").join("docs/sub")).assert().success();
}

#[test]
fn failing_project_exits_one() {
  doctest(fixture("fail"))
    .assert()
    .code(1)
    .stderr(
      contains("failures:")
        .and(contains("----------- docs/broken.md -----------"))
        .and(contains("ERROR line 4: echo wrong"))
        .and(contains("test result: FAILED. 1 passed; 1 failed; 0 ignored; 0 filtered out")),
    );
}

#[test]
fn targets_select_files() {
  doctest(fixture("pass")).arg("sub").assert().success().stdout(
    contains("test docs/sub/more.txt ...")
      .and(contains("test docs/intro.md").not())
      .and(contains("2 passed; 0 failed; 0 ignored; 2 filtered out")),
  );
  doctest(fixture("fail")).arg("no-such-doc").assert().success().stderr(
    contains("target \"no-such-doc\" does not match any file"),
  );
}

#[test]
fn verbose_lists_examples() {
  doctest(fixture("pass")).arg("-v").assert().success().stdout(
    contains("    line 5: echo hello ...")
      .and(contains("    line 39: this-command-does-not-exist ... ignored"))
      .and(contains("test legacy/broken.md ... filtered out")),
  );
}

#[test]
fn normal_mode_uses_the_prelude() {
  doctest(fixture("prelude")).assert().code(1).stderr(contains("ERROR line 3: greet world"));
  doctest(fixture("prelude")).arg("-n").assert().success();
  doctest(fixture("prelude")).arg("--normal").arg("-v").assert().success();
}

#[test]
fn missing_project_exits_two() {
  let dir = std::env::temp_dir().join(format!("doctest-runner-noconfig-{}", std::process::id()));
  std::fs::create_dir_all(&dir).unwrap();
  doctest(&dir).assert().code(2).stderr(contains("doctest.toml"));
  let _ = std::fs::remove_dir(&dir);
}
