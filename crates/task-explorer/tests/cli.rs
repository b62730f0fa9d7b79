use std::fs;
use std::path::Path;

use assert_cmd::Command;
use predicates::prelude::*;

fn write_project(root: &Path, relative: &str, targets: &[&str]) {
    let path = root.join(relative);
    fs::create_dir_all(path.parent().expect("parent")).expect("create project dir");
    let body: String = targets
        .iter()
        .map(|name| format!("  <Target Name=\"{name}\" />\n"))
        .collect();
    fs::write(path, format!("<Project>\n{body}</Project>\n")).expect("write project");
}

fn explorer(root: &Path) -> Command {
    let mut cmd = Command::cargo_bin("task-explorer").expect("binary exists");
    cmd.current_dir(root)
        .env_remove("TASK_EXPLORER_CONFIGURATION")
        .env_remove("TASK_EXPLORER_PLATFORM")
        .env_remove("TASK_EXPLORER_ENGINE")
        .env_remove("MSBuildSDKsPath")
        .env_remove("RUST_LOG")
        .arg("--solution")
        .arg(root);
    cmd
}

#[test]
fn help_displays_usage() {
    Command::cargo_bin("task-explorer")
        .expect("binary exists")
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Usage"));
}

#[test]
fn tree_lists_targets_without_nuget_imports() {
    let temp = tempfile::tempdir().expect("tempdir");
    write_project(
        temp.path(),
        "App/App.csproj",
        &["Build", "Compile", "EnsureNuGetPackageBuildImports"],
    );
    write_project(temp.path(), "Restore/Restore.proj", &["EnsureNuGetPackageBuildImports"]);

    explorer(temp.path())
        .args(["tree", "--all"])
        .assert()
        .success()
        .stdout(predicate::str::contains("▾ App/App.csproj"))
        .stdout(predicate::str::contains("    Compile"))
        .stdout(predicate::str::contains("EnsureNuGetPackageBuildImports").not())
        .stdout(predicate::str::contains("Restore.proj").not());
}

#[test]
fn filter_is_remembered_between_runs() {
    let temp = tempfile::tempdir().expect("tempdir");
    write_project(temp.path(), "App/App.csproj", &["Build", "Compile", "Clean"]);

    explorer(temp.path())
        .args(["tree", "--filter", "^compile$"])
        .assert()
        .success()
        .stdout(predicate::str::contains("⌕ ^compile$"))
        .stdout(predicate::str::contains("    Compile"))
        .stdout(predicate::str::contains("Clean").not());

    explorer(temp.path())
        .arg("tree")
        .assert()
        .success()
        .stdout(predicate::str::contains("⌕ ^compile$"));
    assert!(temp.path().join(".task-explorer/settings.json").exists());
}

#[test]
fn props_dumps_sorted_properties() {
    let temp = tempfile::tempdir().expect("tempdir");
    write_project(temp.path(), "App/App.csproj", &["Build"]);

    explorer(temp.path())
        .args(["props", "App/App.csproj"])
        .assert()
        .success()
        .stdout(predicate::str::contains("------ Task Explorer ------"))
        .stdout(predicate::str::contains("Configuration = Debug"))
        .stdout(predicate::str::contains("MSBuildProjectName = App"));
}

#[test]
fn expanding_unknown_project_fails() {
    let temp = tempfile::tempdir().expect("tempdir");
    write_project(temp.path(), "App/App.csproj", &["Build"]);
    fs::write(temp.path().join("notes.txt"), "not a project").expect("write notes");

    explorer(temp.path())
        .args(["expand", "notes.txt"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("is not in the task tree"));
}

#[cfg(unix)]
#[test]
fn run_uses_declared_target_name() {
    let temp = tempfile::tempdir().expect("tempdir");
    write_project(temp.path(), "App/App.csproj", &["Build", "Compile"]);
    let script = temp.path().join("fake-msbuild.sh");
    fs::write(&script, "#!/bin/sh\necho \"running $2\"\n").expect("write script");
    fs::create_dir_all(temp.path().join(".task-explorer")).expect("create config dir");
    fs::write(
        temp.path().join(".task-explorer/config.toml"),
        format!(
            "[engine]\nprogram = \"sh\"\nargs = [\"{}\"]\nverbosity = \"\"\n",
            script.display()
        ),
    )
    .expect("write config");

    explorer(temp.path())
        .args(["run", "App/App.csproj", "compile"])
        .assert()
        .success()
        .stdout(predicate::str::contains("running -t:Compile"))
        .stdout(predicate::str::contains("Build succeeded"));

    explorer(temp.path())
        .args(["run", "App/App.csproj", "Publish"])
        .assert()
        .success()
        .stdout(predicate::str::contains("running -t:Publish"))
        .stderr(predicate::str::contains("not listed in the task tree"));
}
