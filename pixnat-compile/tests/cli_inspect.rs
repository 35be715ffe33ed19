use std::path::PathBuf;

use assert_cmd::Command;
use predicates::prelude::*;

fn fixture(path: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("..")
        .join(path)
}

#[test]
fn inspect_reports_firewall_and_counts() {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("pixnat-compile"));
    cmd.arg("inspect")
        .arg(fixture("fixtures/lab-policy.json"))
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "firewall: lab-fw (platform pix, version 6.3)",
        ))
        .stdout(predicate::str::contains("ethernet1 (inside) level 100"))
        .stdout(predicate::str::contains("objects: 7  services: 1  rules: 3"));
}

#[test]
fn inspect_rules_lists_every_element() {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("pixnat-compile"));
    cmd.arg("inspect")
        .arg(fixture("fixtures/lab-policy.json"))
        .arg("--rules")
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "rule 0: osrc=lan-net odst=any osrv=any tsrc=pool tdst=any tsrv=any",
        ))
        .stdout(predicate::str::contains("rule 2: osrc=lan-net odst=partner-net"));
}

#[test]
fn inspect_fails_cleanly_on_missing_file() {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("pixnat-compile"));
    cmd.arg("inspect")
        .arg("no-such-policy.json")
        .assert()
        .failure()
        .stderr(predicate::str::contains("failed to load"));
}
