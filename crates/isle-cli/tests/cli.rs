//! Integration tests for the `isle` binary.

use std::fs;
use std::path::Path;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn isle() -> Command {
    let mut cmd = Command::cargo_bin("isle").expect("isle binary");
    cmd.env("NO_COLOR", "1").env_remove("RUST_LOG");
    cmd
}

fn write(root: &Path, rel: &str, contents: &str) {
    let path = root.join(rel);
    fs::create_dir_all(path.parent().expect("parent")).expect("create dirs");
    fs::write(path, contents).expect("write file");
}

fn site() -> TempDir {
    let dir = TempDir::new().expect("temp dir");
    write(
        dir.path(),
        "src/components/Counter.svelte",
        "<script>\n  export let start = 0;\n</script>\n\n<button>{start}</button>\n\n<style>\nbutton { padding: 1rem; }\n</style>\n",
    );
    write(
        dir.path(),
        "src/routes/Home.svelte",
        "<script>\n  import Counter from \"../components/Counter.svelte\";\n</script>\n\n<h1>home</h1>\n",
    );
    dir
}

#[test]
fn help_lists_commands() {
    isle()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("build"))
        .stdout(predicate::str::contains("dev"));
}

#[test]
fn build_writes_both_trees() {
    let site = site();

    isle()
        .args(["build", "--backend", "scan", "--root"])
        .arg(site.path())
        .assert()
        .success();

    let root = site.path();
    assert!(root.join(".isle/compiled/components/Counter.js").is_file());
    assert!(root.join(".isle/compiled/routes/Home.js").is_file());
    assert!(root.join(".isle/compiled/assets/style.css").is_file());
    assert!(root.join("public/_isle/assets/style.css").is_file());
    assert!(root.join("public/_isle/islands").is_dir());
}

#[test]
fn config_file_moves_output_dirs() {
    let site = site();
    write(
        site.path(),
        "isle.toml",
        "ssr_dir = \"build/server\"\nclient_dir = \"build/client\"\nbackend = \"scan\"\n",
    );

    isle()
        .arg("build")
        .arg("--root")
        .arg(site.path())
        .assert()
        .success();

    assert!(site.path().join("build/server/components/Counter.js").is_file());
    assert!(site.path().join("build/client/islands").is_dir());
}

#[test]
fn missing_source_dir_is_reported() {
    let dir = TempDir::new().expect("temp dir");

    isle()
        .args(["build", "--backend", "scan", "--root"])
        .arg(dir.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("source directory not found"));
}

#[test]
fn explicit_config_must_exist() {
    let site = site();

    isle()
        .args(["build", "--config", "nope.toml", "--root"])
        .arg(site.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("nope.toml"));
}

#[test]
fn broken_component_fails_the_build() {
    let site = site();
    write(
        site.path(),
        "src/components/Broken.svelte",
        "<script>\n  let x = 1;\n",
    );

    isle()
        .args(["build", "--backend", "scan", "--root"])
        .arg(site.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("Build failed"));
}

#[test]
fn verbose_and_quiet_conflict() {
    isle()
        .args(["--verbose", "--quiet", "build"])
        .assert()
        .failure();
}
