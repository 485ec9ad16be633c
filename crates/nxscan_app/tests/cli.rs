use nxscan_core::testing::single_volume_image;
use std::io::Write;
use std::process::{Command, Output};
use tempfile::NamedTempFile;

fn image_file(bytes: &[u8]) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(bytes).unwrap();
    file.flush().unwrap();
    file
}

fn nxscan(args: &[&str], image: &NamedTempFile) -> Output {
    Command::new(env!("CARGO_BIN_EXE_nxscan"))
        .args(args)
        .arg(image.path())
        .output()
        .unwrap()
}

#[test]
fn test_json_report() {
    let image = image_file(&single_volume_image(7, "TestVol", &["a", "b"]));
    let output = nxscan(&["--json", "--quiet", "--label", "fixture"], &image);
    assert!(output.status.success());

    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(report["label"], "fixture");
    assert_eq!(report["block_size"], 4096);
    assert_eq!(report["stop"]["reason"], "current_only");

    let names: Vec<_> = report["entries"]["7"]["TestVol"]
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, ["a", "b"]);
}

#[test]
fn test_text_report_without_mmap() {
    let image = image_file(&single_volume_image(3, "Macintosh HD", &["Users"]));
    let output = nxscan(&["--no-mmap", "--no-history"], &image);
    assert!(output.status.success());

    let stdout = String::from_utf8(output.stdout).unwrap();
    assert!(stdout.contains("xid 3"));
    assert!(stdout.contains("Macintosh HD (1 records)"));
    assert!(stdout.contains("Users"));
}

#[test]
fn test_logs_go_to_stderr() {
    let image = image_file(&single_volume_image(3, "Data", &["x"]));
    let output = nxscan(&["--json"], &image);
    assert!(output.status.success());

    let stderr = String::from_utf8(output.stderr).unwrap();
    assert!(stderr.contains("merged checkpoint"));
    assert!(serde_json::from_slice::<serde_json::Value>(&output.stdout).is_ok());
}

#[test]
fn test_not_a_container_fails() {
    let image = image_file(&[0u8; 8192]);
    let output = nxscan(&["--quiet"], &image);
    assert!(!output.status.success());

    let stderr = String::from_utf8(output.stderr).unwrap();
    assert!(stderr.contains("Failed to read container"));
}
