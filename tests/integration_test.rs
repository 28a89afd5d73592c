// Integration tests for the seer binary

use std::process::Command;

fn seer() -> Command {
    Command::new(env!("CARGO_BIN_EXE_seer"))
}

#[test]
fn test_version_display() {
    let output = seer()
        .arg("--version")
        .output()
        .expect("Failed to run seer --version");

    assert!(output.status.success(), "Version command failed");

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("seer"), "Expected 'seer' in version output");
}

#[test]
fn test_help_display() {
    let output = seer()
        .arg("--help")
        .output()
        .expect("Failed to run seer --help");

    assert!(output.status.success(), "Help command failed");

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(
        stdout.contains("ask") && stdout.contains("models") && stdout.contains("repl"),
        "Expected ask, models and repl in help output"
    );
}

#[test]
fn test_help_subcommand() {
    let output = seer()
        .args(["help", "ask"])
        .output()
        .expect("Failed to run seer help ask");

    assert!(output.status.success(), "Help subcommand failed");

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("--repo"), "Expected --repo in ask help");
}

#[test]
fn test_models_lists_catalog() {
    let output = seer()
        .arg("models")
        .output()
        .expect("Failed to run seer models");

    assert!(output.status.success(), "Models command failed");

    let stdout = String::from_utf8_lossy(&output.stdout);
    for name in ["MS Florence 2 Base", "Moondream 2", "BLIP Base", "ViLT Base", "Pix Textcaps"] {
        assert!(stdout.contains(name), "Expected {} in models output", name);
    }
    assert!(stdout.contains("vikhyatk/moondream2@2024-08-26"));
}

#[test]
fn test_tasks_lists_tokens() {
    let output = seer()
        .arg("tasks")
        .output()
        .expect("Failed to run seer tasks");

    assert!(output.status.success(), "Tasks command failed");

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("<MORE_DETAILED_CAPTION>"));
    assert!(stdout.contains("<OCR_WITH_REGION>"));
}

#[test]
fn test_ask_unknown_model_answers_with_diagnostic() {
    let dir = tempfile::tempdir().unwrap();
    let image_path = dir.path().join("pixel.png");
    image::RgbImage::new(4, 4).save(&image_path).unwrap();

    let output = seer()
        .args(["ask", "what is this?", "-m", "No Such Model", "-i"])
        .arg(&image_path)
        .output()
        .expect("Failed to run seer ask");

    assert!(output.status.success(), "Ask command failed");

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("unknown: model=No Such Model"), "Got: {}", stdout);
}

#[test]
fn test_ask_without_family_keyword_fails() {
    let output = seer()
        .args(["ask", "what?", "--repo", "someone/mystery-model"])
        .output()
        .expect("Failed to run seer ask");

    assert!(!output.status.success(), "Expected undetectable repo to fail");
}

#[test]
fn test_repl_rejects_unknown_model() {
    let output = seer()
        .args(["repl", "-i", "missing.png", "-m", "No Such Model"])
        .output()
        .expect("Failed to run seer repl");

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Unknown model"), "Got: {}", stderr);
}
