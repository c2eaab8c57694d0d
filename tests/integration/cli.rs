use std::path::PathBuf;

use assert_cmd::Command;
use namedmaps::constants::CONFIG_PATH_ENV;
use namedmaps::template::{Template, fingerprint};
use namedmaps::test_utils::fixtures;
use predicates::prelude::*;
use tempfile::TempDir;

/// Scratch directory with no config file, so runs never read the real home.
struct CliEnv {
    temp: TempDir,
}

impl CliEnv {
    fn new() -> Self {
        Self {
            temp: TempDir::new().unwrap(),
        }
    }

    fn command(&self) -> Command {
        let mut cmd = Command::cargo_bin("namedmaps").unwrap();
        cmd.env(CONFIG_PATH_ENV, self.temp.path().join("absent.toml"))
            .env_remove("RUST_LOG")
            .current_dir(self.temp.path());
        cmd
    }

    fn write_template(&self, file: &str, template: &Template) -> PathBuf {
        let path = self.temp.path().join(file);
        std::fs::write(&path, serde_json::to_string_pretty(template).unwrap()).unwrap();
        path
    }

    fn write_raw(&self, file: &str, content: &str) -> PathBuf {
        let path = self.temp.path().join(file);
        std::fs::write(&path, content).unwrap();
        path
    }
}

#[test]
fn test_sanitize_argument() {
    let env = CliEnv::new();
    env.command()
        .args(["sanitize", "SELECT * FROM roads WHERE ST_Intersects(geom, !bbox!)"])
        .assert()
        .success()
        .stdout("SELECT * FROM roads WHERE ST_Intersects(geom, ST_MakeEnvelope(0,0,0,0))\n");
}

#[test]
fn test_sanitize_stdin() {
    let env = CliEnv::new();
    env.command()
        .arg("sanitize")
        .write_stdin("SELECT !pixel_width! * !scale_denominator!\n")
        .assert()
        .success()
        .stdout(predicate::str::contains("SELECT 1 * 0"))
        .stdout(predicate::str::contains("!").not());
}

#[test]
fn test_validate_valid_template() {
    let env = CliEnv::new();
    let path = env.write_template("parcels.json", &fixtures::parameterized_template("parcels"));

    env.command()
        .arg("validate")
        .arg(&path)
        .assert()
        .success()
        .stdout(predicate::str::contains("Template 'parcels' is valid"))
        .stdout(predicate::str::contains("placeholders: 2"));
}

#[test]
fn test_validate_rejects_bad_version() {
    let env = CliEnv::new();
    let path = env.write_raw(
        "old.json",
        r#"{"version":"0.0.0","name":"old","auth":{"method":"open"},"layergroup":{}}"#,
    );

    env.command()
        .arg("validate")
        .arg(&path)
        .assert()
        .failure()
        .stderr(predicate::str::contains("Unsupported template version '0.0.0'"));
}

#[test]
fn test_validate_json_output() {
    let env = CliEnv::new();
    let path = env.write_raw(
        "locked.json",
        r#"{"version":"0.0.1","name":"locked","auth":{"method":"token","valid_tokens":[]},"layergroup":{}}"#,
    );

    env.command()
        .args(["validate", "--json"])
        .arg(&path)
        .assert()
        .failure()
        .stdout(predicate::str::contains("\"valid\": false"))
        .stdout(predicate::str::contains("declares no valid tokens"));
}

#[test]
fn test_fingerprint_matches_library() {
    let env = CliEnv::new();
    let template = fixtures::open_template("t1");
    let path = env.write_template("t1.json", &template);
    let digest = fingerprint(&template).unwrap();

    env.command()
        .arg("fingerprint")
        .arg(&path)
        .assert()
        .success()
        .stdout(predicate::str::contains(format!("fingerprint: {digest}")))
        .stdout(predicate::str::contains(format!("prefix: {}", &digest[..8])));
}

#[test]
fn test_instantiate_prints_layergroup() {
    let env = CliEnv::new();
    let path = env.write_template("parcels.json", &fixtures::parameterized_template("parcels"));

    env.command()
        .arg("instantiate")
        .arg(&path)
        .args(["--owner", "alice", "--params", r#"{"min_area": 5}"#])
        .assert()
        .success()
        .stdout(predicate::str::contains("SELECT * FROM parcels WHERE area > 5"))
        .stdout(predicate::str::contains("polygon-fill: red"))
        .stdout(predicate::str::contains("\"publicIdPrefix\": \"alice@"));
}

#[test]
fn test_instantiate_missing_parameter() {
    let env = CliEnv::new();
    let path = env.write_template("parcels.json", &fixtures::parameterized_template("parcels"));

    env.command()
        .arg("instantiate")
        .arg(&path)
        .assert()
        .failure()
        .stderr(predicate::str::contains("Missing parameter 'min_area'"));
}

#[test]
fn test_instantiate_wrong_token() {
    let env = CliEnv::new();
    let path = env.write_template("secret.json", &fixtures::token_template("secret", "S"));

    env.command()
        .arg("instantiate")
        .arg(&path)
        .args(["--token", "nope"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Unauthorized template instantiation"));

    env.command().arg("instantiate").arg(&path).args(["--token", "S"]).assert().success();
}

#[test]
fn test_templates_dir_from_config() {
    let env = CliEnv::new();
    let templates = env.temp.path().join("templates");
    std::fs::create_dir(&templates).unwrap();
    std::fs::write(
        templates.join("t1.json"),
        serde_json::to_string(&fixtures::open_template("t1")).unwrap(),
    )
    .unwrap();
    let config = env.write_raw(
        "config.toml",
        &format!("[instantiation]\ntemplates_dir = {:?}\n", templates.display().to_string()),
    );

    env.command()
        .arg("--config")
        .arg(&config)
        .args(["validate", "t1.json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Template 't1' is valid"));
}

#[test]
fn test_missing_template_file() {
    let env = CliEnv::new();
    env.command()
        .args(["validate", "nope.json"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Check that the file exists"));
}

#[cfg(not(feature = "database"))]
#[test]
fn test_affected_tables_needs_database_feature() {
    let env = CliEnv::new();
    env.command()
        .args(["affected-tables", "--user", "alice", "--sql", "SELECT 1"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("`database` feature"));
}

#[cfg(feature = "database")]
#[test]
fn test_affected_tables_needs_url_template() {
    let env = CliEnv::new();
    env.command()
        .args(["affected-tables", "--user", "alice", "--sql", "SELECT 1"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("url_template"));
}
