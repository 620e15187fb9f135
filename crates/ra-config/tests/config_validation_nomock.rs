//! No-mock configuration validation + resolution tests.
//!
//! Covers:
//! - Simulation and assay validation against the shipped TOML configs
//! - Rejection of semantically invalid settings
//! - Resolution order (CLI > env > config dir > XDG)

use ra_config::resolve::{resolve_config, ConfigKind, ConfigSource};
use ra_config::validate::{validate_assay, validate_simulation, ValidationError};
use ra_config::{AssaySettings, RecencySpec, SimulationSettings};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, OnceLock};
use tempfile::TempDir;

static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

const ENV_KEYS: &[&str] = &[
    "RA_SIMULATION_CONFIG",
    "RA_ASSAY_CONFIG",
    "RA_CONFIG_DIR",
    "XDG_CONFIG_HOME",
];

fn configs_dir() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("..")
        .join("..")
        .join("configs")
}

fn load_simulation(name: &str) -> SimulationSettings {
    SimulationSettings::from_file(&configs_dir().join(name)).expect("read simulation config")
}

fn load_assay(name: &str) -> AssaySettings {
    AssaySettings::from_file(&configs_dir().join(name)).expect("read assay config")
}

struct EnvGuard {
    keys: Vec<String>,
    saved: Vec<Option<String>>,
}

impl EnvGuard {
    fn new(keys: &[&str]) -> Self {
        let saved = keys.iter().map(|key| env::var(key).ok()).collect();
        for key in keys {
            env::remove_var(key);
        }
        Self {
            keys: keys.iter().map(|k| k.to_string()).collect(),
            saved,
        }
    }
}

impl Drop for EnvGuard {
    fn drop(&mut self) {
        for (idx, key) in self.keys.iter().enumerate() {
            match self.saved.get(idx).and_then(|v| v.as_ref()) {
                Some(val) => env::set_var(key, val),
                None => env::remove_var(key),
            }
        }
    }
}

fn with_env_lock<T>(f: impl FnOnce() -> T) -> T {
    let _guard = ENV_LOCK
        .get_or_init(|| Mutex::new(()))
        .lock()
        .expect("env lock poisoned");
    f()
}

fn write_config_dir(dir: &Path) {
    fs::create_dir_all(dir).expect("create config dir");
    fs::copy(configs_dir().join("simulate.toml"), dir.join("simulate.toml"))
        .expect("copy simulate.toml");
    fs::copy(configs_dir().join("estimate.toml"), dir.join("estimate.toml"))
        .expect("copy estimate.toml");
}

#[test]
fn test_shipped_simulation_config_ok() {
    let settings = load_simulation("simulate.toml");
    validate_simulation(&settings).expect("shipped simulation config should validate");
    assert!(matches!(settings.recency, RecencySpec::Phi { .. }));
    assert!(settings.prior_test.is_some());
}

#[test]
fn test_shipped_assay_config_ok() {
    let settings = load_assay("estimate.toml");
    validate_assay(&settings).expect("shipped assay config should validate");
    assert_eq!(settings.degree, 3);
}

#[test]
fn test_json_config_from_file() {
    let temp = TempDir::new().expect("temp dir");
    let path = temp.path().join("run.json");
    let settings = load_simulation("simulate.toml");
    fs::write(&path, serde_json::to_string_pretty(&settings).expect("serialize"))
        .expect("write json");

    let reloaded = SimulationSettings::from_file(&path).expect("reload json");
    assert_eq!(reloaded, settings);
}

#[test]
fn test_missing_file_is_io_error() {
    let err = SimulationSettings::from_file(Path::new("/nonexistent/simulate.toml"))
        .expect_err("missing file should fail");
    assert!(matches!(err, ValidationError::IoError(_)));
    assert_eq!(err.code(), 60);
}

#[test]
fn test_validate_rejects_prevalence_out_of_range() {
    let mut settings = load_simulation("simulate.toml");
    settings.prevalence = 1.0;
    let err = validate_simulation(&settings).expect_err("prevalence 1 should fail");
    assert!(matches!(err, ValidationError::InvalidValue { ref field, .. } if field == "prevalence"));
}

#[test]
fn test_validate_rejects_tau_below_big_t() {
    let mut settings = load_assay("estimate.toml");
    settings.tau = 1.0;
    let err = validate_assay(&settings).expect_err("tau < big_t should fail");
    assert!(matches!(err, ValidationError::SemanticError(_)));
}

#[test]
fn test_validate_rejects_bad_misreport_probability() {
    let mut settings = load_simulation("simulate.toml");
    if let Some(ref mut prior) = settings.prior_test {
        prior.q_misrep = 1.5;
    }
    let err = validate_simulation(&settings).expect_err("q_misrep > 1 should fail");
    assert!(
        matches!(err, ValidationError::InvalidValue { ref field, .. } if field == "prior_test.q_misrep")
    );
}

#[test]
fn test_validate_rejects_zero_degree() {
    let mut settings = load_assay("estimate.toml");
    settings.degree = 0;
    assert!(validate_assay(&settings).is_err());
}

#[test]
fn test_resolve_config_cli_over_env() {
    with_env_lock(|| {
        let _guard = EnvGuard::new(ENV_KEYS);

        let temp = TempDir::new().expect("temp dir");
        let cli_dir = temp.path().join("cli");
        let env_dir = temp.path().join("env");
        write_config_dir(&cli_dir);
        write_config_dir(&env_dir);

        env::set_var(
            "RA_SIMULATION_CONFIG",
            env_dir.join("simulate.toml").display().to_string(),
        );
        env::set_var("RA_CONFIG_DIR", env_dir.display().to_string());

        let cli_path = cli_dir.join("simulate.toml");
        let resolved = resolve_config(ConfigKind::Simulation, Some(&cli_path));

        assert_eq!(resolved.source, ConfigSource::CliArgument);
        assert_eq!(resolved.path.unwrap(), cli_path);
    });
}

#[test]
fn test_resolve_config_env_over_config_dir() {
    with_env_lock(|| {
        let _guard = EnvGuard::new(ENV_KEYS);

        let temp = TempDir::new().expect("temp dir");
        let env_dir = temp.path().join("env");
        let config_dir = temp.path().join("config_dir");
        write_config_dir(&env_dir);
        write_config_dir(&config_dir);

        env::set_var(
            "RA_ASSAY_CONFIG",
            env_dir.join("estimate.toml").display().to_string(),
        );
        env::set_var("RA_CONFIG_DIR", config_dir.display().to_string());

        let resolved = resolve_config(ConfigKind::Assay, None);
        assert_eq!(resolved.source, ConfigSource::Environment);
        assert_eq!(resolved.path.unwrap(), env_dir.join("estimate.toml"));

        // Simulation has no direct path set, so the config dir wins.
        let resolved = resolve_config(ConfigKind::Simulation, None);
        assert_eq!(resolved.source, ConfigSource::Environment);
        assert_eq!(resolved.path.unwrap(), config_dir.join("simulate.toml"));
    });
}

#[test]
fn test_resolve_config_xdg_fallback() {
    with_env_lock(|| {
        let _guard = EnvGuard::new(ENV_KEYS);

        let temp = TempDir::new().expect("temp dir");
        let xdg_dir = temp.path().join("xdg");
        let app_dir = xdg_dir.join("recency-assay");
        write_config_dir(&app_dir);

        env::set_var("XDG_CONFIG_HOME", xdg_dir.display().to_string());

        let resolved = resolve_config(ConfigKind::Assay, None);
        if cfg!(target_os = "linux") {
            assert_eq!(resolved.source, ConfigSource::XdgConfig);
            assert_eq!(resolved.path.unwrap(), app_dir.join("estimate.toml"));
        }
    });
}

#[test]
fn test_resolve_config_missing_cli_path_falls_through() {
    with_env_lock(|| {
        let _guard = EnvGuard::new(ENV_KEYS);

        let temp = TempDir::new().expect("temp dir");
        env::set_var("XDG_CONFIG_HOME", temp.path().display().to_string());

        let missing = temp.path().join("nope.toml");
        let resolved = resolve_config(ConfigKind::Simulation, Some(&missing));
        assert!(resolved.path.is_none());
        assert_eq!(resolved.source, ConfigSource::BuiltinDefault);
    });
}
