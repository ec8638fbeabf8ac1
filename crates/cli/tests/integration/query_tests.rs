//! Integration tests for the read-only commands.

use predicates::prelude::*;

use super::common::TestEnv;

fn freecad() -> TestEnv {
  TestEnv::with_fixture("formulae")
}

#[test]
fn list_shows_every_formula() {
  freecad()
    .cmd()
    .arg("list")
    .assert()
    .success()
    .stdout(predicate::str::contains("freecad"))
    .stdout(predicate::str::contains("0.15.4671"))
    .stdout(predicate::str::contains("orocos-kdl"));
}

#[test]
fn list_json_is_sorted_by_name() {
  let output = freecad().cmd().args(["--format", "json", "list"]).output().unwrap();
  assert!(output.status.success());

  let entries: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
  let names: Vec<&str> = entries
    .as_array()
    .unwrap()
    .iter()
    .map(|e| e["name"].as_str().unwrap())
    .collect();
  let mut sorted = names.clone();
  sorted.sort();
  assert_eq!(names, sorted);
  assert!(names.contains(&"pivy"));
}

#[test]
fn list_empty_directory() {
  TestEnv::empty()
    .cmd()
    .arg("list")
    .assert()
    .success()
    .stdout(predicate::str::contains("No formulas found"));
}

#[test]
fn info_shows_metadata_and_caveats() {
  freecad()
    .cmd()
    .args(["info", "freecad"])
    .assert()
    .success()
    .stdout(predicate::str::contains("http://sourceforge.net/projects/free-cad/"))
    .stdout(predicate::str::contains("git://git.code.sf.net/p/free-cad/code"))
    .stdout(predicate::str::contains("coin (runtime) --without-framework --without-soqt"))
    .stdout(predicate::str::contains("pivy (recommended) --HEAD when with external-pivy"))
    .stdout(predicate::str::contains("PYTHONPATH"));
}

#[test]
fn info_unknown_formula_fails() {
  freecad()
    .cmd()
    .args(["info", "blender"])
    .assert()
    .code(1)
    .stderr(predicate::str::contains("blender"));
}

#[test]
fn options_include_implicit_and_head() {
  freecad()
    .cmd()
    .args(["options", "freecad"])
    .assert()
    .success()
    .stdout(predicate::str::contains("--with-debug"))
    .stdout(predicate::str::contains("--with-opencascade  [cad-kernel]"))
    .stdout(predicate::str::contains("--without-external-pivy"))
    .stdout(predicate::str::contains("--without-freetype"))
    .stdout(predicate::str::contains("--with-x11"))
    .stdout(predicate::str::contains("--HEAD"));
}

#[test]
fn deps_default_configuration() {
  let assert = freecad().cmd().args(["deps", "freecad"]).assert().success();
  let out = String::from_utf8(assert.get_output().stdout.clone()).unwrap();

  assert!(out.contains("freecad → oce (runtime)"));
  assert!(out.contains("freecad → coin (runtime) --without-framework --without-soqt"));
  assert!(out.contains("freecad → pivy (recommended) --HEAD"));
  assert!(out.contains("freecad → freetype (recommended)"));
  assert!(!out.contains("opencascade"));
  assert!(!out.contains("x11"));
}

#[test]
fn deps_follow_flags() {
  let assert = freecad()
    .cmd()
    .args(["deps", "freecad", "--with-opencascade", "--without-external-pivy", "--with-x11"])
    .assert()
    .success();
  let out = String::from_utf8(assert.get_output().stdout.clone()).unwrap();

  assert!(out.contains("freecad → opencascade (runtime)"));
  assert!(!out.contains("freecad → oce"));
  assert!(!out.contains("pivy"));
  assert!(out.contains("freecad → x11 (optional)"));
}

#[test]
fn deps_json_edges() {
  let output = freecad()
    .cmd()
    .args(["--format", "json", "deps", "freecad"])
    .output()
    .unwrap();
  assert!(output.status.success());

  let edges: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
  let coin = edges
    .as_array()
    .unwrap()
    .iter()
    .find(|e| e["dependency"] == "coin")
    .unwrap();
  assert_eq!(coin["dependent"], "freecad");
  assert_eq!(coin["kind"], "runtime");
  assert_eq!(coin["args"], serde_json::json!(["--without-framework", "--without-soqt"]));
}

#[test]
fn unknown_option_is_usage_error() {
  freecad()
    .cmd()
    .args(["deps", "freecad", "--with-qt5"])
    .assert()
    .code(2)
    .stderr(predicate::str::contains("unknown option 'qt5'"));
}

#[test]
fn malformed_flag_is_usage_error() {
  freecad()
    .cmd()
    .args(["plan", "freecad", "--debug"])
    .assert()
    .code(2)
    .stderr(predicate::str::contains("invalid flag '--debug'"));
}

#[test]
fn conflicting_group_members_are_rejected() {
  freecad()
    .cmd()
    .args(["plan", "freecad", "--with-oce", "--with-opencascade"])
    .assert()
    .code(2)
    .stderr(predicate::str::contains("conflict"));
}

#[test]
fn plan_puts_dependencies_first() {
  let output = freecad()
    .cmd()
    .args(["--format", "json", "plan", "freecad"])
    .output()
    .unwrap();
  assert!(output.status.success());

  let plan: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
  let order: Vec<&str> = plan["order"]
    .as_array()
    .unwrap()
    .iter()
    .map(|e| e["name"].as_str().unwrap())
    .collect();

  assert_eq!(order.last(), Some(&"freecad"));
  assert_eq!(order.iter().filter(|n| **n == "coin").count(), 1);
  assert!(order.contains(&"cmake"));

  let coin = plan["order"]
    .as_array()
    .unwrap()
    .iter()
    .find(|e| e["name"] == "coin")
    .unwrap();
  assert_eq!(coin["options"]["framework"], "off");
  assert_eq!(coin["options"]["soqt"], "off");

  let pivy = plan["order"]
    .as_array()
    .unwrap()
    .iter()
    .find(|e| e["name"] == "pivy")
    .unwrap();
  assert_eq!(pivy["source"], "head");

  let waves = plan["waves"].as_array().unwrap();
  assert_eq!(waves.last().unwrap(), &serde_json::json!(["freecad"]));
}

#[test]
fn global_options_after_formula_name() {
  let output = freecad()
    .cmd()
    .args(["plan", "freecad", "--with-debug", "--format", "json"])
    .output()
    .unwrap();
  assert!(output.status.success());

  let plan: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
  let freecad = plan["order"].as_array().unwrap().last().unwrap().clone();
  assert_eq!(freecad["name"], "freecad");
  assert_eq!(freecad["options"]["debug"], "on");
}

#[test]
fn plan_text_numbers_entries() {
  freecad()
    .cmd()
    .args(["plan", "freecad", "--with-debug"])
    .assert()
    .success()
    .stdout(predicate::str::contains("Build plan"))
    .stdout(predicate::str::contains("pivy 0.5.0 (HEAD)"))
    .stdout(predicate::str::contains("freecad 0.15.4671 [debug=on]"));
}

#[test]
fn platform_reports_triple() {
  let output = freecad()
    .cmd()
    .args(["--format", "json", "platform"])
    .output()
    .unwrap();
  assert!(output.status.success());

  let platform: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
  let triple = platform["triple"].as_str().unwrap();
  assert!(triple.contains('-'));
}
