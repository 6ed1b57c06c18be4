// Avoid musl's default allocator due to lackluster performance
// https://nickb.dev/blog/default-musl-allocator-considered-harmful-to-performance
#[cfg(target_env = "musl")]
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

use std::process::ExitCode;

use colored::Colorize;
use doctest_runner::{Options, Project};

/// Paths never tested by this driver.
const BLACKLIST: [&str; 0] = [];

/// Exit status when the project can not be located.
const SETUP_FAILURE: u8 = 2;

#[tokio::main]
async fn main() -> ExitCode {
  let options = Options::parse_from(std::env::args_os()).blacklist(BLACKLIST);
  let project = match Project::locate() {
    Ok(project) => project,
    Err(e) => {
      eprintln!("{}: {e}", "error".red());
      return ExitCode::from(SETUP_FAILURE);
    }
  };
  if project.run_tests(options).await { ExitCode::SUCCESS } else { ExitCode::FAILURE }
}
