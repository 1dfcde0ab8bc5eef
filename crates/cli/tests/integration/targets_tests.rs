//! Targets command integration tests.

use predicates::prelude::*;

use super::common::TestEnv;

#[test]
fn builtins_are_listed_without_a_manifest() {
  let env = TestEnv::demo();

  let output = env
    .packwright_cmd()
    .arg("targets")
    .arg(&env.project)
    .args(["--format", "json"])
    .output()
    .unwrap();

  assert!(output.status.success());
  let entries: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
  let names: Vec<&str> = entries
    .as_array()
    .unwrap()
    .iter()
    .map(|e| e["target"].as_str().unwrap())
    .collect();
  assert_eq!(names, vec!["binary", "docker", "wheel"]);
  assert!(entries.as_array().unwrap().iter().all(|e| e["default"] == true));
}

#[test]
fn manifest_builders_replace_the_builtins() {
  let env = TestEnv::demo();
  env.write_file(
    ".packwright/builders.toml",
    "[[builder]]\ntarget = \"sdist\"\ncommand = \"true\"\n\n[[builder]]\ntarget = \"wheel\"\nbuiltin = \"wheel\"\n",
  );

  env
    .packwright_cmd()
    .arg("targets")
    .arg(&env.project)
    .assert()
    .success()
    .stdout(predicate::str::contains("2 builder(s) available"))
    .stdout(predicate::str::contains("sdist"))
    .stdout(predicate::str::contains("manifest:"))
    .stdout(predicate::str::contains("docker").not());
}

#[test]
fn malformed_manifest_falls_back_to_builtins() {
  let env = TestEnv::demo();
  env.write_file(".packwright/builders.toml", "[[builder]\nthis is not toml");

  env
    .packwright_cmd()
    .arg("targets")
    .arg(&env.project)
    .assert()
    .success()
    .stdout(predicate::str::contains("3 builder(s) available"))
    .stderr(predicate::str::contains("builder discovery failed"));
}
