//! Install command integration tests.

use predicates::prelude::*;

use super::common::TestEnv;

fn toolchain() -> TestEnv {
  TestEnv::with_fixture("toolchain")
}

#[test]
#[cfg(unix)]
fn install_builds_dependencies_first() {
  let env = toolchain();

  env
    .cmd()
    .args(["install", "app"])
    .assert()
    .success()
    .stdout(predicate::str::contains("libfoo 1.2.0"))
    .stdout(predicate::str::contains("app 0.3.1"))
    .stdout(predicate::str::contains("Install complete"))
    .stdout(predicate::str::contains("app caveats"));

  let keg = env.prefix_path().join("Cellar/app/0.3.1");
  let installed = std::fs::read_to_string(keg.join("bin/app.txt")).unwrap();
  assert_eq!(installed, "foo\n--quiet\n");
  assert!(keg.join("INSTALL_RECEIPT.json").exists());
  assert!(env.prefix_path().join("opt/libfoo/lib/libfoo.txt").exists());
}

#[test]
#[cfg(unix)]
fn install_passes_option_flags() {
  let env = toolchain();

  env.cmd().args(["install", "app", "--with-shout"]).assert().success();

  let installed = std::fs::read_to_string(env.prefix_path().join("Cellar/app/0.3.1/bin/app.txt")).unwrap();
  assert_eq!(installed, "foo\n--shout\n");
}

#[test]
#[cfg(unix)]
fn second_install_reuses_verified_kegs() {
  let env = toolchain();

  env.cmd().args(["install", "app"]).assert().success();
  env
    .cmd()
    .args(["install", "app"])
    .assert()
    .success()
    .stdout(predicate::str::contains("libfoo 1.2.0 already installed"))
    .stdout(predicate::str::contains("app 0.3.1 already installed"));
}

#[test]
#[cfg(unix)]
fn failing_step_stops_the_run() {
  let env = toolchain();

  env
    .cmd()
    .args(["install", "suite"])
    .assert()
    .code(3)
    .stderr(predicate::str::contains("broken: `sh` failed (exit code 3)"))
    .stderr(predicate::str::contains("error: missing header"))
    .stderr(predicate::str::contains("Not built: app, suite"));

  assert!(env.prefix_path().join("Cellar/libfoo/1.2.0").exists());
  assert!(!env.prefix_path().join("Cellar/app").exists());
  assert!(!env.prefix_path().join("Cellar/suite").exists());
}

#[test]
#[cfg(unix)]
fn failing_install_json_report() {
  let env = toolchain();

  let output = env
    .cmd()
    .args(["--format", "json", "install", "suite"])
    .output()
    .unwrap();
  assert_eq!(output.status.code(), Some(3));

  let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
  assert_eq!(report["completed"][0]["name"], "libfoo");
  assert_eq!(report["failed"]["formula"], "broken");
  assert_eq!(report["failed"]["exit_code"], 3);
  assert_eq!(report["not_run"], serde_json::json!(["app", "suite"]));
}

#[test]
fn dry_run_creates_nothing() {
  let env = toolchain();

  env
    .cmd()
    .args(["install", "app", "--dry-run"])
    .assert()
    .success()
    .stdout(predicate::str::contains("Dry run complete"))
    .stdout(predicate::str::contains("mkdir -p"));

  assert!(!env.prefix_path().join("Cellar").exists());
  assert!(!env.prefix_path().join("opt").exists());
}

#[test]
fn dry_run_materializes_freecad() {
  let env = TestEnv::with_fixture("formulae");
  let prefix = env.prefix_path();

  let assert = env
    .cmd()
    .args(["install", "freecad", "--dry-run", "--without-external-pivy"])
    .assert()
    .success();
  let out = String::from_utf8(assert.get_output().stdout.clone()).unwrap();

  assert!(out.contains("-DFREECAD_USE_EXTERNAL_PIVY=OFF"));
  assert!(out.contains(&format!("-DCMAKE_INSTALL_PREFIX={}", prefix.join("Cellar/freecad/0.15.4671").display())));
  assert!(out.contains(&format!(
    "-DOCE_DIR={}/OCE.framework/Versions/0.17/Resources",
    prefix.join("opt/oce").display()
  )));
  assert!(out.contains("make install/strip"));
  assert!(!out.contains("pivy 0.5.0"));
}

#[test]
fn dry_run_with_debug_uses_plain_install() {
  let env = TestEnv::with_fixture("formulae");

  let assert = env
    .cmd()
    .args(["install", "freecad", "--dry-run", "--with-debug"])
    .assert()
    .success();
  let out = String::from_utf8(assert.get_output().stdout.clone()).unwrap();

  assert!(out.contains("-DCMAKE_BUILD_TYPE=Debug"));
  assert!(out.contains("-DFREECAD_USE_EXTERNAL_PIVY=ON"));
  assert!(out.contains("make install\n"));
  assert!(!out.contains("install/strip"));
}

#[test]
fn dry_run_without_recommended_freetype() {
  let env = TestEnv::with_fixture("formulae");

  let assert = env
    .cmd()
    .args(["install", "freecad", "--without-freetype", "--dry-run"])
    .assert()
    .success()
    .stdout(predicate::str::contains("Dry run complete"));
  let out = String::from_utf8(assert.get_output().stdout.clone()).unwrap();

  assert!(!out.contains("freetype 2"));
  assert!(!out.contains("FREETYPE_INCLUDE_DIRS"));
  assert!(out.contains("make install/strip"));
}

#[test]
fn dry_run_passes_freetype_include_by_default() {
  let env = TestEnv::with_fixture("formulae");

  env
    .cmd()
    .args(["install", "--dry-run", "freecad"])
    .assert()
    .success()
    .stdout(predicate::str::contains(format!(
      "-DFREETYPE_INCLUDE_DIRS={}/include/freetype2/",
      env.prefix_path().join("opt/freetype").display()
    )));
}

#[test]
fn missing_dependency_formula_fails_before_building() {
  let env = TestEnv::empty();
  env.write_formula(
    "lonely",
    r#"
name = "lonely"
version = "1.0"
url = "https://example.com/lonely-1.0.tar.gz"
sha256 = "0000000000000000000000000000000000000000000000000000000000000000"

[[dependencies]]
name = "ghost"

[[procedure.steps]]
program = "mkdir"
args = ["-p", "$${prefix}/bin"]
"#,
  );

  env
    .cmd()
    .args(["install", "lonely"])
    .assert()
    .code(1)
    .stderr(predicate::str::contains("ghost"));

  assert!(!env.prefix_path().join("Cellar").exists());
}
