use std::fs;

use assert_cmd::Command;
use predicates::prelude::*;

fn write_csv(dir: &std::path::Path, content: &str) -> std::path::PathBuf {
    let path = dir.join("pubs.csv");
    fs::write(&path, content).expect("write csv");
    path
}

#[test]
fn missing_input_table_is_fatal() -> Result<(), Box<dyn std::error::Error>> {
    let mut cmd = Command::cargo_bin("pubfetch")?;
    cmd.env("NO_COLOR", "1");
    cmd.args(["--input", "no/such/table.csv", "--no-auth", "--no-catalog"]);
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("could not read input table"));
    Ok(())
}

#[test]
fn missing_required_columns_are_fatal() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    let csv = write_csv(dir.path(), "Title,Year\nA Study,2023\n");

    let mut cmd = Command::cargo_bin("pubfetch")?;
    cmd.env("NO_COLOR", "1");
    cmd.arg("--input").arg(&csv);
    cmd.args(["--no-auth", "--no-catalog"]);
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("missing required columns"));
    Ok(())
}

#[test]
fn rows_without_title_or_identifier_fail_without_aborting_the_run()
-> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    let csv = write_csv(
        dir.path(),
        "Title,First Author,Publication Year,DOI\n\
         ,Smith,2023,10.1000/182\n\
         A Study,Jones,2024,\n",
    );
    let output = dir.path().join("publications");

    let mut cmd = Command::cargo_bin("pubfetch")?;
    cmd.env("NO_COLOR", "1");
    cmd.arg("--input").arg(&csv);
    cmd.arg("--output").arg(&output);
    cmd.args(["--no-auth", "--no-catalog"]);

    let assert = cmd.assert().success();
    let stderr = String::from_utf8(strip_ansi_escapes::strip(
        &assert.get_output().stderr,
    ))?;
    assert!(
        stderr.contains("✓ 0") && stderr.contains("✗ 2"),
        "summary mismatch. stderr=\n{stderr}"
    );

    let report = fs::read_to_string(output.join("download_report.txt"))?;
    assert!(report.contains("Failed Downloads (2):"));
    assert!(report.contains("Missing Title | Smith | 10.1000/182"));
    assert!(report.contains("A Study | Jones | Missing Identifier"));
    Ok(())
}

#[test]
fn help_documents_the_batch_flags() -> Result<(), Box<dyn std::error::Error>> {
    let mut cmd = Command::cargo_bin("pubfetch")?;
    cmd.arg("--help");
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("--update-catalog"))
        .stdout(predicate::str::contains("--max-attempts"));
    Ok(())
}
