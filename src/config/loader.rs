//! Configuration loading from disk.

use std::fs;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use thiserror::Error;

use crate::config::schema::{ClusterConfTable, ClusterTableConf, GslbConf, ServiceConfig};
use crate::config::validation::{
    validate_cluster_conf, validate_cluster_table, validate_gslb_conf, ValidationError,
};

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {}: {source}", path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to parse {}: {source}", path.display())]
    Toml {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("{} is invalid: {}", path.display(), join_errors(errors))]
    Validation {
        path: PathBuf,
        errors: Vec<ValidationError>,
    },
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

fn read(path: &Path) -> Result<String, ConfigError> {
    fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn load_json<T: DeserializeOwned>(
    path: &Path,
    validate: fn(&T) -> Result<(), Vec<ValidationError>>,
) -> Result<T, ConfigError> {
    let content = read(path)?;
    let conf: T = serde_json::from_str(&content).map_err(|source| ConfigError::Json {
        path: path.to_path_buf(),
        source,
    })?;

    validate(&conf).map_err(|errors| ConfigError::Validation {
        path: path.to_path_buf(),
        errors,
    })?;

    Ok(conf)
}

/// Load and validate the GSLB weight config.
pub fn load_gslb_conf(path: &Path) -> Result<GslbConf, ConfigError> {
    load_json(path, validate_gslb_conf)
}

/// Load and validate the cluster backend table.
pub fn load_cluster_table(path: &Path) -> Result<ClusterTableConf, ConfigError> {
    load_json(path, validate_cluster_table)
}

/// Load and validate the per-cluster policy config.
pub fn load_cluster_conf(path: &Path) -> Result<ClusterConfTable, ConfigError> {
    load_json(path, validate_cluster_conf)
}

/// Load the service config (TOML).
pub fn load_service_config(path: &Path) -> Result<ServiceConfig, ConfigError> {
    let content = read(path)?;
    toml::from_str(&content).map_err(|source| ConfigError::Toml {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn temp_file(name: &str, content: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!(
            "cluster-balance-{}-{}-{}",
            std::process::id(),
            fastrand::u64(..),
            name
        ));
        let mut file = fs::File::create(&path).unwrap();
        file.write_all(content.as_bytes()).unwrap();
        path
    }

    #[test]
    fn test_load_gslb_conf() {
        let path = temp_file(
            "gslb.json",
            r#"{ "clusters": { "web": { "bj": 3, "GSLB_BLACKHOLE": 0 } }, "hostname": "h", "ts": "1" }"#,
        );
        let conf = load_gslb_conf(&path).unwrap();
        assert_eq!(conf.clusters["web"]["bj"], 3);
        fs::remove_file(path).ok();
    }

    #[test]
    fn test_missing_file() {
        let err = load_cluster_table(Path::new("/nonexistent/cluster_table.json")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn test_invalid_json() {
        let path = temp_file("bad.json", "{ not json");
        assert!(matches!(
            load_cluster_conf(&path).unwrap_err(),
            ConfigError::Json { .. }
        ));
        fs::remove_file(path).ok();
    }

    #[test]
    fn test_validation_error_reported() {
        let path = temp_file(
            "table.json",
            r#"{ "version": "1", "config": { "c": { "s": [ { "name": "a", "addr": "x", "port": 0 } ] } } }"#,
        );
        let err = load_cluster_table(&path).unwrap_err();
        assert!(err.to_string().contains("port must be > 0"));
        fs::remove_file(path).ok();
    }

    #[test]
    fn test_service_config_defaults() {
        let path = temp_file(
            "service.toml",
            "gslb_conf_path = \"/etc/cb/gslb.json\"\n\n[observability]\nlog_format = \"json\"\n",
        );
        let conf = load_service_config(&path).unwrap();
        assert_eq!(conf.gslb_conf_path, PathBuf::from("/etc/cb/gslb.json"));
        assert_eq!(conf.cluster_table_path, PathBuf::from("conf/cluster_table.json"));
        assert_eq!(
            conf.observability.log_format,
            crate::config::schema::LogFormat::Json
        );
        fs::remove_file(path).ok();
    }
}
