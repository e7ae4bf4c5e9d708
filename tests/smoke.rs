use assert_cmd::Command;

#[test]
fn cli_help_runs() {
    let mut cmd = Command::cargo_bin("medner").expect("binary exists");
    cmd.arg("--help").assert().success();
}

#[test]
fn extract_help_lists_modes() {
    let mut cmd = Command::cargo_bin("medner").expect("binary exists");
    let output = cmd.args(["extract", "--help"]).output().unwrap();
    assert!(output.status.success());
    let help = String::from_utf8_lossy(&output.stdout);
    assert!(help.contains("lightweight"));
    assert!(help.contains("auto"));
}
