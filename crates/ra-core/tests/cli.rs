//! CLI tests for the `recency` binary.
//!
//! These tests verify subcommand output and the exit codes for argument,
//! configuration and missing-config failures.

use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::Value;
use tempfile::TempDir;

const SIMULATE: &str = r#"
n_sims = 2
n = 200
prevalence = 0.29
enrollment_times = [0.0, 1.0]
seed = 5

[incidence]
family = "constant"
baseline_incidence = 0.032

[recency]
mechanism = "phi"
phi = { kind = "gamma_survival", shape = 1.0, rate = 2.0 }
"#;

const ESTIMATE: &str = r#"
n_replicates = 1
n_subjects = 2000
prevalence = 0.5
grid_step = 0.1
seed = 1

[phi]
kind = "gamma_survival"
shape = 1.0
rate = 2.0

[incidence]
family = "constant"
baseline_incidence = 0.08
"#;

/// `recency` with config lookup isolated from the host environment.
fn recency(home: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("recency").expect("recency binary should exist");
    cmd.env_remove("RA_SIMULATION_CONFIG")
        .env_remove("RA_ASSAY_CONFIG")
        .env_remove("RA_CONFIG_DIR")
        .env_remove("RUST_LOG")
        .env("XDG_CONFIG_HOME", home.path());
    cmd
}

fn write(dir: &TempDir, name: &str, content: &str) -> std::path::PathBuf {
    let path = dir.path().join(name);
    std::fs::write(&path, content).unwrap();
    path
}

mod simulate {
    use super::*;

    #[test]
    fn prints_summary_rows() {
        let dir = TempDir::new().unwrap();
        let config = write(&dir, "simulate.toml", SIMULATE);
        let output = recency(&dir)
            .args(["simulate", "--config"])
            .arg(&config)
            .assert()
            .success()
            .get_output()
            .stdout
            .clone();

        let json: Value = serde_json::from_slice(&output).unwrap();
        assert_eq!(json["n_replicates"], 2);
        let rows = json["rows"].as_array().unwrap();
        assert_eq!(rows.len(), 4);
        assert_eq!(rows[0]["n"], 200);
        assert!(rows[0]["n_positive"].as_u64().is_some());
    }

    #[test]
    fn unit_records_flag() {
        let dir = TempDir::new().unwrap();
        let config = write(&dir, "simulate.toml", SIMULATE);
        let output = recency(&dir)
            .args(["simulate", "--unit-records", "--n-sims", "1", "--config"])
            .arg(&config)
            .assert()
            .success()
            .get_output()
            .stdout
            .clone();

        let json: Value = serde_json::from_slice(&output).unwrap();
        assert_eq!(json["records"].as_array().unwrap().len(), 400);
    }

    #[test]
    fn seed_override_changes_output() {
        let dir = TempDir::new().unwrap();
        let config = write(&dir, "simulate.toml", SIMULATE);
        let run = |seed: &str| {
            recency(&dir)
                .args(["simulate", "--seed", seed, "--config"])
                .arg(&config)
                .assert()
                .success()
                .get_output()
                .stdout
                .clone()
        };
        assert_eq!(run("9"), run("9"));
        assert_ne!(run("9"), run("10"));
    }

    #[test]
    fn finds_config_in_xdg_dir() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("recency-assay")).unwrap();
        std::fs::write(dir.path().join("recency-assay/simulate.toml"), SIMULATE).unwrap();
        recency(&dir)
            .arg("simulate")
            .assert()
            .success()
            .stdout(predicate::str::contains("\"rows\""));
    }
}

mod estimate {
    use super::*;

    #[test]
    fn prints_estimates() {
        let dir = TempDir::new().unwrap();
        let config = write(&dir, "estimate.toml", ESTIMATE);
        recency(&dir)
            .args(["estimate", "--config"])
            .arg(&config)
            .assert()
            .success()
            .stdout(predicate::str::contains("\"mu_est\""))
            .stdout(predicate::str::contains("\"omega_var\""));
    }

    #[test]
    fn grid_step_must_divide_windows() {
        let dir = TempDir::new().unwrap();
        let config = write(&dir, "estimate.toml", &ESTIMATE.replace("grid_step = 0.1", "grid_step = 0.7"));
        recency(&dir)
            .args(["estimate", "--config"])
            .arg(&config)
            .assert()
            .code(11)
            .stderr(predicate::str::contains("grid_step"));
    }
}

mod errors {
    use super::*;

    #[test]
    fn unknown_subcommand_fails() {
        let dir = TempDir::new().unwrap();
        recency(&dir)
            .arg("nonexistent")
            .assert()
            .failure()
            .stderr(predicate::str::contains("error"));
    }

    #[test]
    fn missing_config_is_args_error() {
        let dir = TempDir::new().unwrap();
        recency(&dir)
            .arg("simulate")
            .assert()
            .code(10)
            .stderr(predicate::str::contains("RA_SIMULATION_CONFIG"));
    }

    #[test]
    fn unreadable_config_is_config_error() {
        let dir = TempDir::new().unwrap();
        recency(&dir)
            .args(["simulate", "--config", "/nonexistent/simulate.toml"])
            .assert()
            .code(11);
    }

    #[test]
    fn invalid_value_names_the_field() {
        let dir = TempDir::new().unwrap();
        let config = write(&dir, "simulate.toml", &SIMULATE.replace("prevalence = 0.29", "prevalence = 1.5"));
        recency(&dir)
            .args(["simulate", "--config"])
            .arg(&config)
            .assert()
            .code(11)
            .stderr(predicate::str::contains("prevalence"));
    }

    #[test]
    fn help_lists_subcommands() {
        let dir = TempDir::new().unwrap();
        recency(&dir)
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("simulate"))
            .stdout(predicate::str::contains("estimate"));
    }
}
