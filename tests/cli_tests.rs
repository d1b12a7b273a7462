use std::fs;
use std::path::Path;
use std::process::{Command, Output};

use tempfile::TempDir;

const NOTE_XSD: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema">
  <xs:element name="note">
    <xs:complexType>
      <xs:sequence>
        <xs:element name="to" type="xs:string"/>
        <xs:element name="body" type="xs:string"/>
      </xs:sequence>
    </xs:complexType>
  </xs:element>
</xs:schema>"#;

fn fixtures() -> TempDir {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("note.xsd"), NOTE_XSD).unwrap();
    fs::write(
        dir.path().join("valid.xml"),
        "<note><to>Ann</to><body>Hello</body></note>",
    )
    .unwrap();
    fs::write(dir.path().join("invalid.xml"), "<note><body>Hello</body></note>").unwrap();
    fs::write(dir.path().join("malformed.xml"), "<note><to>Ann</note>").unwrap();
    dir
}

fn check(dir: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_xml-validator"))
        .current_dir(dir)
        .env_remove("RUST_LOG")
        .env("XML_VALIDATOR_LOG", "error")
        .arg("check")
        .args(args)
        .output()
        .expect("Failed to run xml-validator")
}

#[test]
fn test_check_valid_document_exits_zero() {
    let dir = fixtures();
    let output = check(dir.path(), &["--schema", "note.xsd", "valid.xml"]);

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert_eq!(output.status.code(), Some(0), "stdout: {}", stdout);
    assert!(stdout.contains("VALID"));
    assert!(stdout.contains("Valid: 1"));
}

#[test]
fn test_check_invalid_document_exits_one() {
    let dir = fixtures();
    let output = check(
        dir.path(),
        &["--schema", "note.xsd", "valid.xml", "invalid.xml", "malformed.xml"],
    );

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert_eq!(output.status.code(), Some(1), "stdout: {}", stdout);
    assert!(stdout.contains("INVALID"));
    assert!(stdout.contains("MALFORMED"));
    assert!(stdout.contains("The element 'note' has invalid child element 'body'."));
}

#[test]
fn test_check_missing_schema_exits_two() {
    let dir = fixtures();
    let output = check(dir.path(), &["--schema", "absent.xsd", "valid.xml"]);

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert_eq!(output.status.code(), Some(2), "stdout: {}", stdout);
    assert!(stdout.contains("ERROR"));
}

#[test]
fn test_check_json_output() {
    let dir = fixtures();
    let output = check(
        dir.path(),
        &["--schema", "note.xsd", "--format", "json", "invalid.xml"],
    );

    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(report["documents"][0]["document"], "invalid.xml");
    assert_eq!(report["documents"][0]["classification"], "INVALID");
    assert_eq!(output.status.code(), Some(1));
}

#[test]
fn test_help_lists_subcommands() {
    let output = Command::new(env!("CARGO_BIN_EXE_xml-validator"))
        .arg("--help")
        .output()
        .expect("Failed to run xml-validator");

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("serve"));
    assert!(stdout.contains("check"));
}
