//! Lock command integration tests.

use predicates::prelude::*;

use super::common::TestEnv;

const WITH_DEPS: &str = r#"
[project]
name = "demo"
version = "1.0.0"
dependencies = ["a", "b>=1"]
"#;

#[test]
fn lock_writes_one_entry_per_dependency() {
  let env = TestEnv::with_descriptor(WITH_DEPS);

  env
    .packwright_cmd()
    .arg("lock")
    .arg(&env.project)
    .assert()
    .success()
    .stdout(predicate::str::contains("Wrote"))
    .stdout(predicate::str::contains("b>=1"));

  let content = std::fs::read_to_string(env.lockfile()).unwrap();
  assert!(content.contains("\"demo\""));
  assert!(content.contains("\"1.0.0\""));
  let lock: serde_json::Value = serde_json::from_str(&content).unwrap();
  assert_eq!(lock["resolver"], "passthrough");
  assert_eq!(lock["dependencies"].as_array().unwrap().len(), 2);
  assert_eq!(env.leftover_sandboxes(), 0);
}

#[test]
fn relocking_overwrites_the_lockfile() {
  let env = TestEnv::with_descriptor(WITH_DEPS);

  env.packwright_cmd().arg("lock").arg(&env.project).assert().success();
  env.packwright_cmd().arg("lock").arg(&env.project).assert().success();

  let lock: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(env.lockfile()).unwrap()).unwrap();
  assert_eq!(lock["dependencies"].as_array().unwrap().len(), 2);
}

#[test]
fn index_resolver_pins_versions() {
  let env = TestEnv::with_descriptor(WITH_DEPS);
  env.write_file(
    "index.toml",
    r#"
[[package]]
name = "a"
version = "2.0.0"

[[package]]
name = "b"
version = "0.9.0"

[[package]]
name = "b"
version = "1.4.0"
"#,
  );
  env.write_file(
    "packwright.toml",
    "[packwright.resolver]\nstrategy = \"index\"\nindex = \"index.toml\"\n",
  );

  let output = env
    .packwright_cmd()
    .arg("lock")
    .arg(&env.project)
    .args(["--format", "json"])
    .output()
    .unwrap();

  assert!(output.status.success());
  let resolved: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
  assert_eq!(resolved["resolver"], "index");
  assert_eq!(resolved["dependencies"][0]["version"], "2.0.0");
  assert_eq!(resolved["dependencies"][1]["version"], "1.4.0");
}

#[test]
fn unsatisfiable_constraints_fail_during_resolve() {
  let env = TestEnv::with_descriptor(
    "[project]\nname = \"demo\"\nversion = \"1.0.0\"\ndependencies = [\"a>=3\"]\n",
  );
  env.write_file("index.toml", "[[package]]\nname = \"a\"\nversion = \"2.0.0\"\n");
  env.write_file(
    "packwright.toml",
    "[packwright.resolver]\nstrategy = \"index\"\nindex = \"index.toml\"\n",
  );

  env
    .packwright_cmd()
    .arg("lock")
    .arg(&env.project)
    .assert()
    .code(1)
    .stderr(predicate::str::contains("during resolve"))
    .stderr(predicate::str::contains("a>=3"));

  assert!(!env.lockfile().exists());
}
