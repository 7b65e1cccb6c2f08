//! CLI smoke tests for the factory-admin binary
//!
//! Every test gets its own home directory, SQLite file and env prefix, so
//! nothing leaks between runs or from the surrounding environment.

use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};
use tempfile::TempDir;

const ENV_PREFIX: &str = "FACTORY_SMOKE_MODULE_";

fn write_config(dir: &TempDir, project: Option<&str>) -> PathBuf {
    let home = dir.path().display().to_string();
    let project_line = project
        .map(|p| format!("  project_id: \"{p}\"\n"))
        .unwrap_or_default();
    let yaml = format!(
        r#"home_dir: "{home}"
database:
  url: "sqlite://state/modules.db"
  max_conns: 2
logging:
  default:
    console_level: "off"
    file: ""
features:
  env_prefix: "{ENV_PREFIX}"
{project_line}installer:
  migrations_dir: "migrations"
  core_migrations: ["003_projects_modules_setup.sql"]
"#
    );
    let path = dir.path().join("config.yaml");
    std::fs::write(&path, yaml).expect("write config");
    path
}

fn write_sql(dir: &TempDir, rel: &str, sql: &str) {
    let path = dir.path().join("migrations").join(rel);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, sql).unwrap();
}

fn run(config: &Path, args: &[&str], env: &[(&str, &str)]) -> Output {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_factory-admin"));
    cmd.arg("--config")
        .arg(config)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    for (k, v) in env {
        cmd.env(k, v);
    }
    cmd.output().expect("Failed to execute factory-admin")
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).to_string()
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).to_string()
}

fn module_row<'a>(rows: &'a serde_json::Value, key: &str) -> &'a serde_json::Value {
    rows.as_array()
        .unwrap()
        .iter()
        .find(|r| r["key"] == key)
        .unwrap_or_else(|| panic!("no row for {key}"))
}

#[test]
fn test_cli_help_command() {
    let output = Command::new(env!("CARGO_BIN_EXE_factory-admin"))
        .arg("--help")
        .output()
        .expect("Failed to execute factory-admin");

    assert!(output.status.success(), "Help command should succeed");
    let out = stdout(&output);
    assert!(out.contains("factory-admin"), "Should contain binary name");
    assert!(out.contains("Usage:"), "Should contain usage information");
    for sub in ["check", "modules", "snapshot", "presets"] {
        assert!(out.contains(sub), "Should list '{sub}' subcommand");
    }
    assert!(out.contains("--config"), "Should mention config option");
}

#[test]
fn test_cli_version_command() {
    let output = Command::new(env!("CARGO_BIN_EXE_factory-admin"))
        .arg("--version")
        .output()
        .expect("Failed to execute factory-admin");

    assert!(output.status.success());
    let out = stdout(&output);
    assert!(out.contains("factory-admin"));
    assert!(out.chars().any(|c| c.is_ascii_digit()));
}

#[test]
fn test_cli_invalid_command() {
    let output = Command::new(env!("CARGO_BIN_EXE_factory-admin"))
        .arg("invalid-command")
        .output()
        .expect("Failed to execute factory-admin");

    assert!(!output.status.success(), "Invalid command should fail");
    let err = stderr(&output);
    assert!(err.contains("error:") || err.contains("unrecognized"));
}

#[test]
fn test_check_reports_dependency_order() {
    let dir = TempDir::new().unwrap();
    let config = write_config(&dir, None);

    let output = run(&config, &["check"], &[]);
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    let out = stdout(&output);
    assert!(out.contains("Configuration check passed"));
    assert!(out.contains("Modules (dependency order): auth, teams"));
}

#[test]
fn test_print_config_applies_project_override() {
    let dir = TempDir::new().unwrap();
    let config = write_config(&dir, None);

    let output = run(&config, &["--print-config", "--project", "acme"], &[]);
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    assert!(stdout(&output).contains("project_id: acme"));
}

#[test]
fn test_enable_persists_with_dependencies() {
    let dir = TempDir::new().unwrap();
    let config = write_config(&dir, Some("proj-1"));

    let output = run(
        &config,
        &["modules", "enable", "billing", "--config", r#"{"trialDays":30}"#, "--yes"],
        &[],
    );
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    let out = stdout(&output);
    assert!(out.contains("Enabled billing"));
    assert!(out.contains("teams"));

    let output = run(&config, &["modules", "list", "--json"], &[]);
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    let rows: serde_json::Value = serde_json::from_str(&stdout(&output)).unwrap();

    let billing = module_row(&rows, "billing");
    assert_eq!(billing["enabled"], true);
    assert_eq!(billing["source"], "database");
    assert_eq!(billing["config"]["trialDays"], 30);
    assert_eq!(module_row(&rows, "teams")["enabled"], true);
    assert_eq!(module_row(&rows, "emails")["enabled"], false);
}

#[test]
fn test_disable_cascades_to_dependents() {
    let dir = TempDir::new().unwrap();
    let config = write_config(&dir, Some("proj-1"));

    let output = run(&config, &["modules", "enable", "billing", "--yes"], &[]);
    assert!(output.status.success(), "stderr: {}", stderr(&output));

    let output = run(&config, &["modules", "disable", "teams", "--yes"], &[]);
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    let out = stdout(&output);
    assert!(out.contains("Will also disable: billing"));
    assert!(out.contains("Disabled: teams, billing"));

    let output = run(&config, &["snapshot"], &[]);
    let snap: serde_json::Value = serde_json::from_str(&stdout(&output)).unwrap();
    assert_eq!(snap["flags"]["billing"], false);
    assert_eq!(snap["flags"]["teams"], false);
    assert_eq!(snap["flags"]["auth"], true);
}

#[test]
fn test_disable_root_module_fails() {
    let dir = TempDir::new().unwrap();
    let config = write_config(&dir, Some("proj-1"));

    let output = run(&config, &["modules", "disable", "auth", "--yes"], &[]);
    assert!(!output.status.success());
    assert!(stderr(&output).contains("root module"));
}

#[test]
fn test_enable_without_project_is_not_applied() {
    let dir = TempDir::new().unwrap();
    let config = write_config(&dir, None);

    let output = run(&config, &["modules", "enable", "teams", "--yes"], &[]);
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    assert!(stdout(&output).contains("Not applied: no project context"));
}

#[test]
fn test_unknown_module_fails() {
    let dir = TempDir::new().unwrap();
    let config = write_config(&dir, Some("proj-1"));

    let output = run(&config, &["modules", "enable", "payments", "--yes"], &[]);
    assert!(!output.status.success());
    assert!(stderr(&output).contains("unknown module key 'payments'"));
}

#[test]
fn test_snapshot_reads_env_switches() {
    let dir = TempDir::new().unwrap();
    let config = write_config(&dir, None);
    let var = format!("{ENV_PREFIX}AI_FEATURES");

    let output = run(&config, &["snapshot"], &[(var.as_str(), "true")]);
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    let snap: serde_json::Value = serde_json::from_str(&stdout(&output)).unwrap();
    assert_eq!(snap["flags"]["ai-features"], true);
    assert_eq!(snap["flags"]["auth"], true);
    assert_eq!(snap["flags"]["landing"], true);
    assert_ne!(snap["flags"]["teams"], true);
    assert_eq!(snap["config"]["ai-features"]["provider"], "anthropic");
}

#[test]
fn test_presets_list_and_apply() {
    let dir = TempDir::new().unwrap();
    let config = write_config(&dir, Some("proj-1"));

    let output = run(&config, &["presets", "list"], &[]);
    assert!(output.status.success());
    let out = stdout(&output);
    for key in ["saas-starter", "ai-app", "internal-tool"] {
        assert!(out.contains(key), "missing preset {key}");
    }

    let output = run(&config, &["presets", "apply", "ai-app", "--yes"], &[]);
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    assert!(stdout(&output).contains("Applied preset ai-app"));

    let output = run(&config, &["modules", "list", "--json"], &[]);
    let rows: serde_json::Value = serde_json::from_str(&stdout(&output)).unwrap();
    assert_eq!(module_row(&rows, "ai-features")["enabled"], true);
}

#[test]
fn test_apply_migrations_once_then_skips() {
    let dir = TempDir::new().unwrap();
    let config = write_config(&dir, Some("proj-1"));
    write_sql(&dir, "core/003_projects_modules_setup.sql", "CREATE TABLE projects (id TEXT PRIMARY KEY);");
    write_sql(&dir, "auth/001_auth_setup.sql", "CREATE TABLE users (id TEXT PRIMARY KEY);");
    write_sql(&dir, "teams/002_teams_setup.sql", "CREATE TABLE teams (id TEXT PRIMARY KEY);");
    write_sql(&dir, "teams/seed.sql", "INSERT INTO teams (id) VALUES ('default');");

    let output = run(&config, &["modules", "apply", "teams", "--seed", "--yes"], &[]);
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    let out = stdout(&output);
    assert!(out.contains("applied  core/003_projects_modules_setup.sql"));
    assert!(out.contains("applied  auth/001_auth_setup.sql"));
    assert!(out.contains("applied  teams/002_teams_setup.sql"));
    assert!(out.contains("seeded   teams"));

    let output = run(&config, &["modules", "apply", "teams", "--yes"], &[]);
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    let out = stdout(&output);
    assert!(out.contains("skipped  teams/002_teams_setup.sql"));
    assert!(!out.contains("applied "));
}

#[test]
fn test_apply_stops_on_broken_migration() {
    let dir = TempDir::new().unwrap();
    let config = write_config(&dir, Some("proj-1"));
    write_sql(&dir, "core/003_projects_modules_setup.sql", "CREATE TABLE projects (id TEXT PRIMARY KEY);");
    write_sql(&dir, "auth/001_auth_setup.sql", "CREATE TABLE users (id TEXT PRIMARY KEY;");

    let output = run(&config, &["modules", "apply", "teams", "--yes"], &[]);
    assert!(!output.status.success());
    assert!(stdout(&output).contains("applied  core/003_projects_modules_setup.sql"));
    assert!(stderr(&output).contains("auth/001_auth_setup.sql"));
}
