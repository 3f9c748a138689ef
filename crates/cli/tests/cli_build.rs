use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::Value;
use std::fs;
use std::path::Path;
use tempfile::tempdir;

fn write(root: &Path, relative: &str, body: &str) {
    let path = root.join(relative);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, body).unwrap();
}

fn setup_project() -> tempfile::TempDir {
    let temp = tempdir().unwrap();
    let root = temp.path();
    write(
        root,
        ".storybook/main.toml",
        r#"
stories = ["../src/**/*.mdx", "../src/**/*.stories.@(js|tsx)"]

[docs]
autodocs = "tag"
"#,
    );
    write(root, ".storybook/preview.toml", "tags = [\"project\"]\n");
    write(
        root,
        "src/Button.stories.js",
        r#"import { Button } from './Button';

export default {
  title: 'Example/Button',
  component: Button,
  tags: ['autodocs'],
};

export const Primary = { args: { primary: true } };
export const Secondary = {};
"#,
    );
    write(
        root,
        "src/Intro.mdx",
        "import { Meta } from '@storybook/blocks';\n\n<Meta title=\"Introduction\" />\n\n# Welcome\n",
    );
    temp
}

#[allow(deprecated)]
fn story_index(root: &Path) -> Command {
    let mut cmd = Command::cargo_bin("story-index").expect("binary");
    cmd.current_dir(root);
    cmd
}

#[test]
fn build_writes_index_json() {
    let temp = setup_project();
    let root = temp.path();

    story_index(root)
        .arg("build")
        .assert()
        .success()
        .stdout(predicate::str::contains("Wrote 4 entries"));

    let bytes = fs::read(root.join("storybook-static/index.json")).unwrap();
    let index: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(index["v"], 5);

    let ids: Vec<&str> = index["entries"]
        .as_object()
        .unwrap()
        .keys()
        .map(String::as_str)
        .collect();
    assert_eq!(
        ids,
        vec![
            "introduction--docs",
            "example-button--docs",
            "example-button--primary",
            "example-button--secondary",
        ]
    );
    let primary = &index["entries"]["example-button--primary"];
    assert_eq!(primary["componentPath"], "./src/Button");
    assert_eq!(
        primary["tags"],
        serde_json::json!(["project", "autodocs"])
    );
}

#[test]
fn inspect_json_reports_summary() {
    let temp = setup_project();
    let output = story_index(temp.path())
        .args(["inspect", "--json"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let body: Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(body["summary"]["stories"], 2);
    assert_eq!(body["summary"]["docs"], 2);
    assert_eq!(body["generation"], 1);
}

#[test]
fn duplicate_ids_fail_the_build() {
    let temp = setup_project();
    write(
        temp.path(),
        "src/Copy.stories.js",
        "export default { title: 'Example/Button' };\nexport const Primary = {};\n",
    );

    story_index(temp.path())
        .arg("build")
        .assert()
        .failure()
        .stderr(predicate::str::contains("example-button--primary"));
    assert!(!temp.path().join("storybook-static/index.json").exists());
}

#[test]
fn missing_stories_directory_aborts_startup() {
    let temp = tempdir().unwrap();
    write(
        temp.path(),
        ".storybook/main.toml",
        "stories = [\"../missing/**/*.stories.js\"]\n",
    );

    story_index(temp.path())
        .arg("build")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Stories directory does not exist"));
}

#[test]
fn inspect_reads_a_built_index_without_config() {
    let temp = setup_project();
    story_index(temp.path()).arg("build").assert().success();

    // The built artifact is enough; the project config is no longer needed.
    fs::remove_dir_all(temp.path().join(".storybook")).unwrap();
    let output = story_index(temp.path())
        .args(["inspect", "--json", "--from", "storybook-static"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let body: Value = serde_json::from_slice(&output.stdout).unwrap();
    assert!(body.get("generation").is_none());
    let ids: Vec<&str> = body["entries"]
        .as_array()
        .unwrap()
        .iter()
        .map(|entry| entry["id"].as_str().unwrap())
        .collect();
    assert_eq!(ids[0], "introduction--docs");
    assert_eq!(ids.len(), 4);

    story_index(temp.path())
        .args(["inspect", "--from", "missing-dir"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("run `story-index build` first"));
}
