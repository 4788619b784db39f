use assert_cmd::Command;

#[test]
fn test_help_lists_subcommands() {
    let output = Command::cargo_bin("tractcrop")
        .unwrap()
        .arg("--help")
        .output()
        .unwrap();
    assert!(output.status.success());
    let text = String::from_utf8_lossy(&output.stdout);
    for command in ["preprocess", "select-config", "show-config"] {
        assert!(text.contains(command), "missing {command} in help");
    }
}

#[test]
fn test_select_config_prints_identifier() {
    Command::cargo_bin("tractcrop")
        .unwrap()
        .args(["select-config", "--input-type", "peaks", "--output-type", "tract_segmentation"])
        .assert()
        .success()
        .stdout("TractSeg_12g90g270g_125mm_DS_DAugAll\n");
}

#[test]
fn test_select_config_reports_unsupported_combination() {
    Command::cargo_bin("tractcrop")
        .unwrap()
        .args(["select-config", "--input-type", "T1", "--output-type", "dm_regression"])
        .assert()
        .failure()
        .stderr("ERROR: no pretrained model available for T1\n");
}

#[test]
fn test_preprocess_reports_failed_subject() {
    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("raw");
    std::fs::create_dir_all(source.join("100307")).unwrap();

    Command::cargo_bin("tractcrop")
        .unwrap()
        .env("HOME", dir.path())
        .env("RUST_LOG", "off")
        .arg("preprocess")
        .arg("--source")
        .arg(&source)
        .arg("--target")
        .arg(dir.path().join("out"))
        .assert()
        .failure();
    assert!(!dir.path().join("out/100307").exists());
}
