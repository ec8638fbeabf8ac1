mod cmd;
mod output;

use std::ffi::OsString;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::Result;
use clap::{Args, CommandFactory, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use formulary_lib::options::OptionError;

use cmd::{GlobalArgs, Request};
use output::{OutputFormat, print_error};

/// Declarative source package builder
#[derive(Parser)]
#[command(name = "formulary")]
#[command(author, version, about, long_about = None)]
struct Cli {
  /// Directory of formula files; repeat to search several, earlier wins
  #[arg(long = "formulae", global = true, value_name = "DIR")]
  formulae: Vec<PathBuf>,

  /// Install prefix
  #[arg(long, global = true, env = "FORMULARY_PREFIX", value_name = "DIR")]
  prefix: Option<PathBuf>,

  /// Enable verbose output
  #[arg(short, long, global = true)]
  verbose: bool,

  /// Output format
  #[arg(long, global = true, value_enum, default_value_t)]
  format: OutputFormat,

  #[command(subcommand)]
  command: Commands,
}

#[derive(Subcommand)]
enum Commands {
  /// List all known formulas
  List,

  /// Show a formula's metadata, options, dependencies and caveats
  Info {
    /// Formula name
    formula: String,
  },

  /// Show the options a formula accepts
  Options {
    /// Formula name
    formula: String,
  },

  /// Show the resolved dependency edges of a formula
  Deps {
    #[command(flatten)]
    target: FormulaArgs,
  },

  /// Show the build order for one or more formulas
  Plan {
    #[command(flatten)]
    target: FormulaArgs,
  },

  /// Build and install one or more formulas with their dependencies
  Install {
    #[command(flatten)]
    target: FormulaArgs,

    /// Show the steps that would run without running them
    #[arg(long)]
    dry_run: bool,

    /// Kill any step running longer than this, in seconds or as "30m", "2h"
    #[arg(long, value_name = "DURATION", value_parser = parse_timeout)]
    timeout: Option<Duration>,
  },

  /// Show the detected host platform
  Platform,
}

/// Formulas to act on and the build flags applied to them.
#[derive(Args)]
struct FormulaArgs {
  /// Formula names
  #[arg(required = true, value_name = "FORMULA")]
  formulas: Vec<String>,

  /// Build flags: --with-X, --without-X, --HEAD
  #[arg(last = true, value_name = "FLAG")]
  flags: Vec<String>,
}

impl FormulaArgs {
  fn request(self) -> Result<Request> {
    Request::new(self.formulas, &self.flags)
  }
}

fn main() -> ExitCode {
  let cli = Cli::parse_from(split_formula_flags(std::env::args_os()));

  let default_level = if cli.verbose { "info" } else { "warn" };
  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
  tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_writer(std::io::stderr)
    .without_time()
    .init();

  match run(cli) {
    Ok(code) => ExitCode::from(code),
    Err(e) => {
      print_error(&format!("{:#}", e));
      ExitCode::from(error_exit_code(&e))
    }
  }
}

fn run(cli: Cli) -> Result<u8> {
  let global = GlobalArgs::new(cli.formulae, cli.prefix, cli.format);

  match cli.command {
    Commands::List => cmd::cmd_list(&global)?,
    Commands::Info { formula } => cmd::cmd_info(&global, &formula)?,
    Commands::Options { formula } => cmd::cmd_options(&global, &formula)?,
    Commands::Deps { target } => cmd::cmd_deps(&global, &target.request()?)?,
    Commands::Plan { target } => cmd::cmd_plan(&global, &target.request()?)?,
    Commands::Install {
      target,
      dry_run,
      timeout,
    } => return cmd::cmd_install(&global, &target.request()?, dry_run, timeout),
    Commands::Platform => cmd::cmd_platform(&global)?,
  }

  Ok(0)
}

/// Move build flags (`--with-X`, `--without-X`, `--HEAD`) behind a `--`
/// separator.
///
/// Build flags are open-ended, so clap cannot declare them. After the
/// subcommand, anything that looks like an option but is not one of clap's is
/// taken as a build flag; clap's own options keep working in any position.
fn split_formula_flags<I, T>(args: I) -> Vec<OsString>
where
  I: IntoIterator<Item = T>,
  T: Into<OsString>,
{
  let mut command = Cli::command();
  command.build();

  let mut args = args.into_iter().map(Into::into);
  let mut out: Vec<OsString> = args.next().into_iter().collect();

  let mut subcommand = None;
  while let Some(arg) = args.next() {
    let text = arg.to_string_lossy().into_owned();
    out.push(arg);
    if let Some(found) = command.find_subcommand(&text) {
      subcommand = Some(found);
      break;
    }
    if takes_separate_value(command.get_arguments(), &text) {
      out.extend(args.next());
    }
  }

  let Some(subcommand) = subcommand else {
    out.extend(args);
    return out;
  };
  let known = || subcommand.get_arguments().chain(command.get_arguments().filter(|a| a.is_global_set()));

  let mut flags = Vec::new();
  while let Some(arg) = args.next() {
    let text = arg.to_string_lossy().into_owned();
    if text == "--" {
      flags.extend(args.by_ref());
      break;
    }
    if !text.starts_with('-') || text == "-" || text == "-h" || text == "--help" {
      out.push(arg);
      continue;
    }
    if find_option(known(), &text).is_none() {
      flags.push(arg);
      continue;
    }
    let separate = takes_separate_value(known(), &text);
    out.push(arg);
    if separate {
      out.extend(args.next());
    }
  }

  if !flags.is_empty() {
    out.push("--".into());
    out.extend(flags);
  }
  out
}

fn find_option<'c>(mut options: impl Iterator<Item = &'c clap::Arg>, text: &str) -> Option<&'c clap::Arg> {
  let name = text.split_once('=').map_or(text, |(name, _)| name);
  match name.strip_prefix("--") {
    Some(long) => options.find(|a| a.get_long() == Some(long)),
    None => {
      let short = name.strip_prefix('-')?.chars().next()?;
      options.find(|a| a.get_short() == Some(short))
    }
  }
}

fn takes_separate_value<'c>(options: impl Iterator<Item = &'c clap::Arg>, text: &str) -> bool {
  !text.contains('=')
    && find_option(options, text).is_some_and(|a| a.get_action().takes_values() && !a.is_positional())
}

fn parse_timeout(value: &str) -> Result<Duration, humantime::DurationError> {
  match value.parse::<u64>() {
    Ok(secs) => Ok(Duration::from_secs(secs)),
    Err(_) => humantime::parse_duration(value),
  }
}

/// Usage errors in formula flags exit 2, like clap's own usage errors.
fn error_exit_code(err: &anyhow::Error) -> u8 {
  if err.chain().any(|cause| cause.downcast_ref::<OptionError>().is_some()) {
    2
  } else {
    1
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use clap::CommandFactory;

  #[test]
  fn cli_definition_is_valid() {
    Cli::command().debug_assert();
  }

  #[test]
  fn timeout_accepts_seconds_and_durations() {
    assert_eq!(parse_timeout("90").unwrap(), Duration::from_secs(90));
    assert_eq!(parse_timeout("2m").unwrap(), Duration::from_secs(120));
    assert!(parse_timeout("soon").is_err());
  }

  fn parse(args: &[&str]) -> Cli {
    Cli::try_parse_from(split_formula_flags(std::iter::once("formulary").chain(args.iter().copied()))).unwrap()
  }

  fn target(cli: Cli) -> FormulaArgs {
    match cli.command {
      Commands::Deps { target } | Commands::Plan { target } | Commands::Install { target, .. } => target,
      _ => panic!("expected a command taking formulas"),
    }
  }

  #[test]
  fn trailing_formula_flags_are_kept() {
    let cli = parse(&["install", "freecad", "--with-debug", "--dry-run", "--HEAD"]);
    match cli.command {
      Commands::Install { target, dry_run, .. } => {
        assert!(dry_run);
        assert_eq!(target.formulas, vec!["freecad"]);
        assert_eq!(target.flags, vec!["--with-debug", "--HEAD"]);
      }
      _ => panic!("expected install"),
    }
  }

  #[test]
  fn clap_options_win_after_formula_names() {
    let cli = parse(&["install", "freecad", "--timeout", "90", "--without-freetype", "--dry-run"]);
    match cli.command {
      Commands::Install {
        target,
        dry_run,
        timeout,
      } => {
        assert!(dry_run);
        assert_eq!(timeout, Some(Duration::from_secs(90)));
        assert_eq!(target.flags, vec!["--without-freetype"]);
      }
      _ => panic!("expected install"),
    }

    let cli = parse(&["plan", "freecad", "--format", "json", "-v", "--with-debug"]);
    assert!(cli.format.is_json());
    assert!(cli.verbose);
    assert_eq!(target(cli).flags, vec!["--with-debug"]);

    let cli = parse(&["deps", "freecad", "--format=json", "--debug"]);
    assert!(cli.format.is_json());
    assert_eq!(target(cli).flags, vec!["--debug"]);
  }

  #[test]
  fn explicit_separator_and_global_values() {
    let cli = parse(&["--formulae", "install", "plan", "pivy", "--", "--HEAD", "--dry-run"]);
    assert_eq!(cli.formulae, vec![PathBuf::from("install")]);
    let target = target(cli);
    assert_eq!(target.formulas, vec!["pivy"]);
    assert_eq!(target.flags, vec!["--HEAD", "--dry-run"]);
  }

  #[test]
  fn formula_is_still_required() {
    let args = split_formula_flags(["formulary", "install", "--with-debug"]);
    assert!(Cli::try_parse_from(args).is_err());
  }

  #[test]
  fn option_errors_are_usage_errors() {
    let err = anyhow::Error::new(OptionError::InvalidFlag("--debug".into())).context("Failed to resolve");
    assert_eq!(error_exit_code(&err), 2);
    assert_eq!(error_exit_code(&anyhow::anyhow!("boom")), 1);
  }
}
