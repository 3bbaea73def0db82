use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;

/// Same effective config => same hash, whatever the key order or layering.
#[test]
fn config_hash_is_stable_across_layering() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let flat = tmp.path().join("flat.yaml");
    let base = tmp.path().join("base.yaml");
    let over = tmp.path().join("override.yaml");

    fs::write(
        &flat,
        "sizing:\n  portfolio_size: 5\n  policy: equal\nbacktest:\n  initial_capital: 1000\n",
    )?;
    fs::write(
        &base,
        "backtest:\n  initial_capital: 1000\nsizing:\n  policy: equal\n  portfolio_size: 20\n",
    )?;
    fs::write(&over, "sizing:\n  portfolio_size: 5\n")?;

    let hash_of = |args: &[&std::path::Path]| -> anyhow::Result<String> {
        let out = Command::cargo_bin("sbt")?
            .arg("config-hash")
            .args(args)
            .output()?;
        assert!(out.status.success());
        let stdout = String::from_utf8(out.stdout)?;
        let line = stdout
            .lines()
            .find(|l| l.starts_with("config_hash="))
            .expect("config_hash line");
        Ok(line.trim_start_matches("config_hash=").to_string())
    };

    let a = hash_of(&[flat.as_path()])?;
    let b = hash_of(&[base.as_path(), over.as_path()])?;
    assert_eq!(a, b);
    assert_eq!(a.len(), 64);
    Ok(())
}

#[test]
fn config_hash_rejects_literal_secret() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let p = tmp.path().join("bad.yaml");
    fs::write(&p, "data:\n  api_key: sk-live-abcdef\n")?;

    Command::cargo_bin("sbt")?
        .arg("config-hash")
        .arg(&p)
        .assert()
        .failure()
        .stderr(predicate::str::contains("CONFIG_SECRET_DETECTED"));
    Ok(())
}
