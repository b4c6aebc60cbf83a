use std::path::{Path, PathBuf};

use assert_cmd::Command;
use predicates::prelude::*;
use walkdir::WalkDir;

fn siteforge(dir: &Path) -> Command {
    let mut cmd = Command::cargo_bin("siteforge").unwrap();
    cmd.current_dir(dir).arg("--no-color");
    cmd
}

fn write(root: &Path, rel: &str, contents: &str) {
    let path = root.join(rel);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, contents).unwrap();
}

/// One page, one stylesheet, one script, one font, one image
fn scenario() -> tempfile::TempDir {
    let temp = tempfile::tempdir().unwrap();
    let root = temp.path();

    write(
        root,
        "src/pages/index.hbs",
        "<!DOCTYPE html>\n<html><head><link rel=\"stylesheet\" href=\"css/style.css\"></head><body><h1>{{page}}</h1><script src=\"js/script.js\"></script></body></html>\n",
    );
    write(
        root,
        "src/scss/style.scss",
        "$accent: #c0392b;\nh1 { color: $accent; user-select: none; }\n",
    );
    write(
        root,
        "src/js/script.js",
        "const greet = (name) => `hi ${name}`;\ndocument.title = greet('there');\n",
    );
    write(root, "src/fonts/body.woff2", "not really a font");

    let logo = root.join("src/img/logo.png");
    std::fs::create_dir_all(logo.parent().unwrap()).unwrap();
    image::RgbImage::from_fn(16, 16, |x, y| image::Rgb([x as u8 * 16, y as u8 * 16, 128]))
        .save(&logo)
        .unwrap();

    temp
}

fn output_files(root: &Path) -> Vec<PathBuf> {
    let build = root.join("build");
    let mut files: Vec<PathBuf> = WalkDir::new(&build)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.path().strip_prefix(&build).unwrap().to_path_buf())
        .collect();
    files.sort();
    files
}

#[test]
fn list_shows_every_target() {
    let temp = tempfile::tempdir().unwrap();

    siteforge(temp.path())
        .args(["list", "--format", "plain"])
        .assert()
        .success()
        .stdout(predicate::str::contains("clean"))
        .stdout(predicate::str::contains("buildJs"))
        .stdout(predicate::str::contains("build"))
        .stdout(predicate::str::contains("default"));
}

#[test]
fn unknown_target_fails() {
    let temp = tempfile::tempdir().unwrap();

    siteforge(temp.path())
        .arg("minify")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Target 'minify' not found"));
}

#[test]
fn build_writes_exactly_the_expected_files() {
    let temp = scenario();

    siteforge(temp.path()).args(["--quiet", "build"]).assert().success();

    let expected: Vec<PathBuf> = [
        "css/style.css",
        "css/style.min.css",
        "fonts/body.woff2",
        "img/logo.png",
        "index.html",
        "js/script.js",
        "js/script.min.js",
    ]
    .iter()
    .map(PathBuf::from)
    .collect();
    assert_eq!(output_files(temp.path()), expected);

    let html = std::fs::read_to_string(temp.path().join("build/index.html")).unwrap();
    assert!(html.contains("<h1>index</h1>"));
    assert!(!html.contains("__livereload"));
}

#[test]
fn rebuilding_unchanged_sources_is_deterministic() {
    let temp = scenario();

    siteforge(temp.path()).args(["--quiet", "build"]).assert().success();
    let first = siteforge::fingerprint(&temp.path().join("build")).unwrap();

    siteforge(temp.path()).args(["--quiet", "build"]).assert().success();
    let second = siteforge::fingerprint(&temp.path().join("build")).unwrap();

    assert_eq!(first, second);
    assert_eq!(first.files, 7);
}

#[test]
fn clean_removes_output() {
    let temp = tempfile::tempdir().unwrap();
    write(temp.path(), "build/index.html", "<p>old</p>");
    write(temp.path(), "build/css/style.css", "a{}");

    siteforge(temp.path()).arg("clean").assert().success();
    assert!(!temp.path().join("build").exists());

    // Already gone is fine
    siteforge(temp.path()).arg("clean").assert().success();
}

#[test]
fn dry_run_prints_stages_without_building() {
    let temp = scenario();

    siteforge(temp.path())
        .args(["run", "build", "--dry-run"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Stage 1:"))
        .stdout(predicate::str::contains("copy, images"));

    assert!(!temp.path().join("build").exists());
}

#[test]
fn graph_as_dot() {
    let temp = tempfile::tempdir().unwrap();

    siteforge(temp.path())
        .args(["graph", "build", "--format", "dot"])
        .assert()
        .success()
        .stdout(predicate::str::contains("digraph siteforge"))
        .stdout(predicate::str::contains("\"clean\" -> \"copy\";"))
        .stdout(predicate::str::contains("\"images\" -> \"buildJs\";"));
}

#[test]
fn init_then_check() {
    let temp = tempfile::tempdir().unwrap();

    siteforge(temp.path()).arg("check").assert().success().stdout(
        predicate::str::contains("using the default layout"),
    );

    siteforge(temp.path()).arg("init").assert().success();
    assert!(temp.path().join("siteforge.toml").exists());

    siteforge(temp.path()).arg("init").assert().failure();
    siteforge(temp.path())
        .arg("check")
        .assert()
        .success()
        .stdout(predicate::str::contains("siteforge.toml is valid"));
}

#[test]
fn invalid_config_is_reported() {
    let temp = tempfile::tempdir().unwrap();
    write(temp.path(), "siteforge.toml", "[images]\npng_level = 9\n");

    siteforge(temp.path())
        .arg("check")
        .assert()
        .failure()
        .stderr(predicate::str::contains("images.png_level"));
}
