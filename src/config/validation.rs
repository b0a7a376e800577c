//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Reject malformed backends and policies before anything is applied
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is a pure function: `&Conf → Result<(), Vec<ValidationError>>`
//! - Only whole-file problems live here; per-cluster problems (zero total
//!   weight, no usable backend) are reported by the balancer table so the
//!   remaining clusters still apply

use thiserror::Error;

use crate::config::schema::{
    cookie_key, BackendConf, CheckScheme, ClusterConfTable, ClusterTableConf, GslbConf,
};

/// A single semantic problem in a config file.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{field}: {message}")]
pub struct ValidationError {
    /// Dotted path of the offending field.
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

fn finish(errors: Vec<ValidationError>) -> Result<(), Vec<ValidationError>> {
    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Validate the GSLB weight config.
pub fn validate_gslb_conf(conf: &GslbConf) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if conf.hostname.is_empty() {
        errors.push(ValidationError::new("hostname", "no hostname"));
    }
    if conf.ts.is_empty() {
        errors.push(ValidationError::new("ts", "no ts"));
    }

    for (cluster, subs) in &conf.clusters {
        if cluster.is_empty() {
            errors.push(ValidationError::new("clusters", "empty cluster name"));
        }
        if subs.keys().any(|sub| sub.is_empty()) {
            errors.push(ValidationError::new(
                format!("clusters.{}", cluster),
                "empty sub cluster name",
            ));
        }
    }

    finish(errors)
}

/// Validate the cluster backend table.
pub fn validate_cluster_table(conf: &ClusterTableConf) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if conf.version.is_empty() {
        errors.push(ValidationError::new("version", "no version"));
    }

    for (cluster, subs) in &conf.config {
        for (sub, backends) in subs {
            for (i, backend) in backends.iter().enumerate() {
                let field = format!("config.{}.{}[{}]", cluster, sub, i);
                validate_backend(&field, backend, &mut errors);
            }
        }
    }

    finish(errors)
}

fn validate_backend(field: &str, backend: &BackendConf, errors: &mut Vec<ValidationError>) {
    if backend.name.is_empty() {
        errors.push(ValidationError::new(field, "no name"));
    }
    if backend.addr.is_empty() {
        errors.push(ValidationError::new(field, "no addr"));
    }
    if backend.port == 0 {
        errors.push(ValidationError::new(field, "port must be > 0"));
    }
    if backend.weight < 0 {
        errors.push(ValidationError::new(field, "weight must be >= 0"));
    }
}

/// Validate the per-cluster policy config.
pub fn validate_cluster_conf(conf: &ClusterConfTable) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if conf.version.is_empty() {
        errors.push(ValidationError::new("version", "no version"));
    }

    for (cluster, cluster_conf) in &conf.config {
        let check = &cluster_conf.check_conf;
        let field = format!("config.{}.check_conf", cluster);

        if check.scheme == CheckScheme::Http && !check.uri.starts_with('/') {
            errors.push(ValidationError::new(&field, "uri should start with '/'"));
        }
        if check.succ_num < 1 {
            errors.push(ValidationError::new(&field, "succ_num should be bigger than 0"));
        }

        let gslb = &cluster_conf.gslb_basic;
        let field = format!("config.{}.gslb_basic", cluster);

        if gslb.retry_max < 0 || gslb.cross_retry < 0 {
            errors.push(ValidationError::new(&field, "retry counts must be >= 0"));
        }

        let hash = &gslb.hash_conf;
        if hash.hash_strategy.uses_client_id() {
            match hash.hash_header.as_deref() {
                None | Some("") => {
                    errors.push(ValidationError::new(&field, "no hash_header"));
                }
                Some(header) if cookie_key(header) == Some("") => {
                    errors.push(ValidationError::new(&field, "invalid hash_header"));
                }
                Some(_) => {}
            }
        }
    }

    finish(errors)
}
