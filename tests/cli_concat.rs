use assert_cmd::prelude::*;
use predicates::prelude::*;
use std::process::Command;
use tempfile::TempDir;

#[test]
fn command_concat_help() -> anyhow::Result<()> {
    let mut cmd = Command::cargo_bin("msacat")?;
    let output = cmd.arg("concat").arg("--help").output()?;
    let stdout = String::from_utf8(output.stdout)?;

    assert!(stdout.contains("Concatenates trimmed per-gene MSAs"));

    Ok(())
}

#[test]
fn command_concat_two_genes() -> anyhow::Result<()> {
    let mut cmd = Command::cargo_bin("msacat")?;
    let output = cmd
        .arg("concat")
        .arg("tests/concat/its.fasta")
        .arg("tests/concat/lsu.fasta")
        .output()?;
    assert!(output.status.success());

    let stdout = String::from_utf8(output.stdout)?;
    // y and z are shared; x and w are dropped
    assert_eq!(
        stdout,
        ">y\nACGTACGASSSSSSSSSSTTGACA\n>z\nACGAACGTSSSSSSSSSSTTGACC\n"
    );

    let stderr = String::from_utf8(output.stderr)?;
    assert!(stderr.contains("its\tw"));
    assert!(stderr.contains("lsu\tx"));
    assert!(stderr.contains("==> MSA shape: 24x2"));

    Ok(())
}

#[test]
fn command_concat_custom_sep() -> anyhow::Result<()> {
    let mut cmd = Command::cargo_bin("msacat")?;
    let output = cmd
        .arg("concat")
        .arg("tests/concat/its.fasta")
        .arg("tests/concat/lsu.fasta")
        .arg("--sep")
        .arg("NN")
        .output()?;
    assert!(output.status.success());

    let stdout = String::from_utf8(output.stdout)?;
    assert_eq!(stdout, ">y\nACGTACGANNTTGACA\n>z\nACGAACGTNNTTGACC\n");

    Ok(())
}

#[test]
fn command_concat_missing_report() -> anyhow::Result<()> {
    let tempdir = TempDir::new()?;
    let report = tempdir.path().join("missing.tsv");
    let outfile = tempdir.path().join("msa.fasta");

    let mut cmd = Command::cargo_bin("msacat")?;
    let output = cmd
        .arg("concat")
        .arg("tests/concat/its.fasta")
        .arg("tests/concat/lsu.fasta")
        .arg("--missing")
        .arg(report.to_str().unwrap())
        .arg("-o")
        .arg(outfile.to_str().unwrap())
        .output()?;
    assert!(output.status.success());

    let missing = std::fs::read_to_string(&report)?;
    assert_eq!(missing, "gene\tmissing samples\nits\tw\nlsu\tx\n");
    assert!(outfile.is_file());

    tempdir.close()?;

    Ok(())
}

#[test]
fn command_concat_no_shared_samples() -> anyhow::Result<()> {
    let tempdir = TempDir::new()?;
    let other = tempdir.path().join("rpb2.fasta");
    std::fs::write(&other, ">a\nTTTT\n>b\nGGGG\n")?;
    let report = tempdir.path().join("missing.tsv");

    let mut cmd = Command::cargo_bin("msacat")?;
    cmd.arg("concat")
        .arg("tests/concat/its.fasta")
        .arg(other.to_str().unwrap())
        .arg("--missing")
        .arg(report.to_str().unwrap());
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("no samples shared"));

    // the report is written even for a fatal join
    assert!(report.is_file());

    tempdir.close()?;

    Ok(())
}
