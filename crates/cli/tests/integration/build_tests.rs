//! Build command integration tests.

use predicates::prelude::*;

use super::common::{TestEnv, files_in};

const FAILING_MANIFEST: &str = r#"
[[builder]]
target = "broken"
command = "echo boom >&2; exit 3"

[[builder]]
target = "wheel"
builtin = "wheel"
"#;

#[test]
fn wheel_only_build_succeeds() {
  let env = TestEnv::demo();

  env
    .packwright_cmd()
    .arg("build")
    .arg(&env.project)
    .args(["--only", "wheel"])
    .assert()
    .success()
    .stdout(predicate::str::contains("wheel (1 artifact(s))"))
    .stdout(predicate::str::contains("Built 1 of 1 target(s)"));

  assert_eq!(files_in(&env.dist().join("wheel")), vec!["demo-0.1.0-WHEEL.txt"]);
  assert_eq!(env.leftover_sandboxes(), 0);

  let lock: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(env.lockfile()).unwrap()).unwrap();
  assert_eq!(lock["project"]["name"], "demo");
  assert_eq!(lock["dependencies"].as_array().unwrap().len(), 0);
}

#[test]
fn build_is_the_default_command() {
  let env = TestEnv::demo();

  env
    .packwright_cmd()
    .arg(&env.project)
    .args(["--only", "wheel"])
    .assert()
    .success();

  assert!(env.dist().join("wheel").is_dir());
}

#[test]
fn default_targets_build_all_builtins() {
  let env = TestEnv::demo();

  env
    .packwright_cmd()
    .arg("build")
    .arg(&env.project)
    .args(["--jobs", "3"])
    .assert()
    .success()
    .stdout(predicate::str::contains("Built 3 of 3 target(s)"));

  assert_eq!(files_in(&env.dist()), vec!["binary", "docker", "wheel"]);
  for target in ["binary", "docker", "wheel"] {
    assert!(!files_in(&env.dist().join(target)).is_empty(), "{} produced nothing", target);
  }
  assert_eq!(env.leftover_sandboxes(), 0);
}

#[test]
fn json_report_lists_every_target() {
  let env = TestEnv::demo();

  let output = env
    .packwright_cmd()
    .arg("build")
    .arg(&env.project)
    .args(["--only", "wheel", "--format", "json"])
    .output()
    .unwrap();

  assert!(output.status.success());
  let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
  assert_eq!(report["project"], "demo");
  assert_eq!(report["policy"], "fail-fast");
  assert_eq!(report["sandboxes"], 1);
  assert_eq!(report["targets"][0]["target"], "wheel");
  assert_eq!(report["targets"][0]["status"], "built");
  assert_eq!(report["targets"][0]["artifacts"][0]["path"], "demo-0.1.0-WHEEL.txt");
}

#[test]
fn output_override_is_used() {
  let env = TestEnv::demo();
  let out = env.temp.path().join("artifacts");

  env
    .packwright_cmd()
    .arg("build")
    .arg(&env.project)
    .args(["--only", "wheel", "--output"])
    .arg(&out)
    .assert()
    .success();

  assert!(out.join("wheel").join("demo-0.1.0-WHEEL.txt").is_file());
  assert!(!env.dist().exists());
}

#[test]
fn unknown_target_fails_before_any_sandbox() {
  let env = TestEnv::demo();

  env
    .packwright_cmd()
    .arg("build")
    .arg(&env.project)
    .args(["--only", "rpm"])
    .assert()
    .code(1)
    .stderr(predicate::str::contains("no builders selected"))
    .stderr(predicate::str::contains("during select"));

  assert_eq!(env.leftover_sandboxes(), 0);
  assert!(!env.dist().exists());
}

#[test]
fn unknown_target_json_error() {
  let env = TestEnv::demo();

  let output = env
    .packwright_cmd()
    .arg("build")
    .arg(&env.project)
    .args(["--only", "rpm", "--format", "json"])
    .output()
    .unwrap();

  assert_eq!(output.status.code(), Some(1));
  let error: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
  assert_eq!(error["stage"], "select");
  assert_eq!(error["class"], "configuration");
}

#[test]
fn settings_from_config_reach_the_docker_builder() {
  let env = TestEnv::demo();
  env.write_file(
    "packwright.toml",
    r#"
[packwright]
targets = ["docker"]

[packwright.target.docker]
base_image = "python:3.11-alpine"
entrypoint = ["demo", "--serve"]
"#,
  );

  env.packwright_cmd().arg("build").arg(&env.project).assert().success();

  let dockerfile = files_in(&env.dist().join("docker"));
  assert_eq!(dockerfile.len(), 1);
  let content = std::fs::read_to_string(env.dist().join("docker").join(&dockerfile[0])).unwrap();
  assert!(content.contains("FROM python:3.11-alpine"));
  assert!(content.contains(r#"ENTRYPOINT ["demo","--serve"]"#));
}

#[test]
fn failing_target_skips_the_rest_by_default() {
  let env = TestEnv::demo();
  env.write_file(".packwright/builders.toml", FAILING_MANIFEST);

  env
    .packwright_cmd()
    .arg("build")
    .arg(&env.project)
    .args(["--only", "broken", "--only", "wheel"])
    .assert()
    .code(1)
    .stderr(predicate::str::contains("broken failed during build"))
    .stderr(predicate::str::contains("wheel skipped"));

  assert!(!env.dist().join("wheel").exists());
  assert_eq!(env.leftover_sandboxes(), 0);
}

#[test]
fn keep_going_builds_the_remaining_targets() {
  let env = TestEnv::demo();
  env.write_file(".packwright/builders.toml", FAILING_MANIFEST);

  env
    .packwright_cmd()
    .arg("build")
    .arg(&env.project)
    .args(["--only", "broken", "--only", "wheel", "--keep-going"])
    .assert()
    .code(1)
    .stderr(predicate::str::contains("broken failed during build"))
    .stderr(predicate::str::contains("1 failed, 0 skipped"));

  assert!(env.dist().join("wheel").join("demo-0.1.0-WHEEL.txt").is_file());
  assert_eq!(env.leftover_sandboxes(), 0);
}

#[test]
fn missing_interpreter_fails_the_target_at_provision() {
  let env = TestEnv::demo();

  env
    .packwright_cmd()
    .arg("build")
    .arg(&env.project)
    .args(["--only", "wheel", "--python"])
    .arg(env.temp.path().join("no-such-python"))
    .assert()
    .code(1)
    .stderr(predicate::str::contains("wheel failed during provision"));

  assert_eq!(env.leftover_sandboxes(), 0);
}
