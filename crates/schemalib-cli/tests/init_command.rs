use assert_cmd::Command;
use predicates::str::contains;
use tempfile::TempDir;

#[test]
fn init_writes_workspace_config() -> Result<(), Box<dyn std::error::Error>> {
    let temp = TempDir::new()?;
    let target = temp.path().join("workspace");

    let mut cmd = cli();
    cmd.args([
        "init",
        target.to_str().unwrap(),
        "--user",
        "ana",
        "--repository",
        "local=repo",
    ]);

    cmd.assert()
        .success()
        .stdout(contains("Initialized workspace at"));

    let config = std::fs::read_to_string(target.join(".schemalib/config.yaml"))?;
    assert!(config.contains("user: ana"));
    assert!(config.contains("local: repo"));
    Ok(())
}

#[test]
fn init_dry_run_does_not_write() -> Result<(), Box<dyn std::error::Error>> {
    let temp = TempDir::new()?;
    let target = temp.path().join("workspace-dry-run");

    let mut cmd = cli();
    cmd.args(["init", target.to_str().unwrap(), "--dry-run"]);

    cmd.assert()
        .success()
        .stdout(contains("Dry run: would initialize workspace"));

    assert!(!target.join(".schemalib").exists());
    Ok(())
}

#[test]
fn init_rejects_nested_workspace() -> Result<(), Box<dyn std::error::Error>> {
    let temp = TempDir::new()?;
    let parent = temp.path().join("parent");
    let child = parent.join("child");
    std::fs::create_dir_all(parent.join(".schemalib"))?;

    let mut cmd = cli();
    cmd.args(["init", child.to_str().unwrap()]);

    cmd.assert()
        .failure()
        .code(64)
        .stderr(contains("ancestor workspace already exists"));
    Ok(())
}

#[test]
fn init_rejects_malformed_repository() -> Result<(), Box<dyn std::error::Error>> {
    let temp = TempDir::new()?;

    let mut cmd = cli();
    cmd.args([
        "init",
        temp.path().to_str().unwrap(),
        "--repository",
        "local",
    ]);

    cmd.assert()
        .failure()
        .code(64)
        .stderr(contains("ID=LOCATION"));
    assert!(!temp.path().join(".schemalib").exists());
    Ok(())
}

fn cli() -> Command {
    Command::new(env!("CARGO_BIN_EXE_schemalib"))
}
