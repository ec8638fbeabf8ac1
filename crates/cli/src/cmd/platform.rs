use anyhow::Result;
use serde::Serialize;

use formulary_lib::platform::Platform;

use crate::output::{print_json, print_stat};

use super::{GlobalArgs, current_platform};

#[derive(Serialize)]
struct PlatformView {
  triple: String,
  #[serde(flatten)]
  platform: Platform,
}

/// Show the host platform conditions are evaluated against.
pub fn cmd_platform(global: &GlobalArgs) -> Result<()> {
  let platform = current_platform()?;

  if global.format.is_json() {
    return print_json(&PlatformView {
      triple: platform.triple(),
      platform,
    });
  }

  println!("{}", platform);
  print_stat("Arch", platform.arch.as_str());
  print_stat("OS", platform.os.as_str());
  print_stat(
    "Version",
    &platform
      .os_version
      .map(|v| v.to_string())
      .unwrap_or_else(|| "unknown".to_string()),
  );
  match global.prefix() {
    Ok(prefix) => print_stat("Prefix", &prefix.display().to_string()),
    Err(e) => print_stat("Prefix", &format!("unresolved ({:#})", e)),
  }

  Ok(())
}
