mod server;

use server::start_standard_site;
use sitepulse::cli::{AuditArgs, Cli, Command};
use sitepulse::run;
use std::fs;
use std::path::Path;
use tempfile::tempdir;

fn audit_with_config(url: &str, config: &Path, save: &Path) -> Cli {
    Cli {
        command: Command::Audit(AuditArgs {
            url: url.to_string(),
            max_pages: None,
            concurrency: None,
            rate_limit: None,
            output: "json".to_string(),
            save: Some(save.to_str().unwrap().to_string()),
            ignore_robots: false,
            data_dir: None,
        }),
        config: Some(config.to_str().unwrap().to_string()),
        verbose: false,
    }
}

fn help_with_config(config: &Path) -> std::process::Output {
    std::process::Command::new(env!("CARGO_BIN_EXE_sitepulse"))
        .args(["audit", "https://example.com", "--config"])
        .arg(config)
        .arg("--help")
        .output()
        .expect("Failed to execute command")
}

#[test]
fn test_cli_accepts_config_in_every_format() {
    let dir = tempdir().unwrap();
    let files = [
        ("config.json", r#"{"max_pages": 50, "concurrency": 8}"#),
        ("config.toml", "max_pages = 50\nconcurrency = 8\n"),
        ("config.yaml", "max_pages: 50\nconcurrency: 8\n"),
    ];

    for (name, contents) in files {
        let path = dir.path().join(name);
        fs::write(&path, contents).unwrap();
        let output = help_with_config(&path);
        assert!(output.status.success(), "{} was rejected", name);
    }
}

#[tokio::test]
async fn test_config_max_pages_limits_audit() {
    let base_url = start_standard_site().await;
    let dir = tempdir().unwrap();
    let config_path = dir.path().join("sitepulse.toml");
    fs::write(&config_path, "max_pages = 1\nrespect_robots_txt = false\n").unwrap();
    let report_path = dir.path().join("report.json");

    run(audit_with_config(&base_url, &config_path, &report_path))
        .await
        .expect("Audit failed");

    let saved: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(&report_path).unwrap()).unwrap();
    assert_eq!(saved["report"]["pagesCrawled"], 1);
}

#[tokio::test]
async fn test_invalid_config_file_fails() {
    let dir = tempdir().unwrap();
    let config_path = dir.path().join("broken.yaml");
    fs::write(&config_path, "max_pages: [not, a, number]\n").unwrap();
    let report_path = dir.path().join("report.json");

    let err = run(audit_with_config("https://example.com", &config_path, &report_path))
        .await
        .unwrap_err();
    assert!(format!("{:#}", err).contains("Failed to parse YAML config"));
    assert!(!report_path.exists());
}

#[tokio::test]
async fn test_missing_config_file_fails() {
    let dir = tempdir().unwrap();
    let missing = dir.path().join("nope.json");
    let report_path = dir.path().join("report.json");

    let err = run(audit_with_config("https://example.com", &missing, &report_path))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("Failed to read config file"));
}
