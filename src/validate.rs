use std::net::SocketAddr;
use std::path::Path;

use crate::config::Config;
use crate::error::ValidationError;

impl Config {
    /// Run every field rule and report the complete list of violations in
    /// one pass. Rules never short-circuit: a configuration broken in five
    /// places produces five messages, not one per restart cycle.
    pub fn validate(&self) -> Result<(), ValidationError> {
        let mut violations = Vec::new();

        check_listen_address(&self.prometheus.listen_address, &mut violations);
        check_metrics_path(&self.prometheus.metrics_path, &mut violations);
        check_benches(&self.frappe.benches, &mut violations);
        check_log_files(&self.frappe.log_files, &mut violations);

        if !is_one_of(&self.frappe.log_format, &["json", "text"]) {
            violations.push("frappe.log_format must be 'json' or 'text'".to_string());
        }

        if self.pipeline.channel_buffer_size <= 0 {
            violations
                .push("pipeline.channel_buffer_size must be a positive integer".to_string());
        }
        if self.pipeline.consumer_workers <= 0 {
            violations.push("pipeline.consumer_workers must be a positive integer".to_string());
        }

        if self.parser.min_sql_duration_ms < 0 {
            violations.push("parser.min_sql_duration_ms cannot be negative".to_string());
        }

        check_exclude_list("parser.exclude_sites", &self.parser.exclude_sites, &mut violations);
        check_exclude_list(
            "parser.exclude_methods",
            &self.parser.exclude_methods,
            &mut violations,
        );
        check_exclude_list(
            "parser.exclude_doctypes",
            &self.parser.exclude_doctypes,
            &mut violations,
        );

        if !is_one_of(&self.exporter_logging.level, &["debug", "info", "warn", "error"]) {
            violations.push(
                "exporter_logging.level must be one of 'debug', 'info', 'warn', or 'error'"
                    .to_string(),
            );
        }
        if !is_one_of(&self.exporter_logging.format, &["json", "text"]) {
            violations.push("exporter_logging.format must be 'json' or 'text'".to_string());
        }

        if violations.is_empty() {
            Ok(())
        } else {
            Err(ValidationError { violations })
        }
    }
}

fn is_one_of(value: &str, allowed: &[&str]) -> bool {
    let lowered = value.to_lowercase();
    allowed.contains(&lowered.as_str())
}

fn check_listen_address(addr: &str, violations: &mut Vec<String>) {
    if addr.is_empty() {
        violations.push("prometheus.listen_address is required".to_string());
        return;
    }

    // A bare port number ("9876") is rejected; ":port" and "host:port" are
    // accepted as-is. Addresses with two or more colons must be bracketed
    // IPv6 literals or parse strictly as a socket address.
    match addr.matches(':').count() {
        0 => violations.push(format!(
            "prometheus.listen_address ('{addr}') must be in [host]:port or :port format"
        )),
        1 => {}
        _ if addr.contains('[') => {}
        _ => {
            if let Err(err) = addr.parse::<SocketAddr>() {
                violations.push(format!(
                    "prometheus.listen_address ('{addr}') is not a valid [host]:port format: {err}"
                ));
            }
        }
    }
}

fn check_metrics_path(path: &str, violations: &mut Vec<String>) {
    if path.is_empty() {
        violations.push("prometheus.metrics_path is required".to_string());
    } else if !path.starts_with('/') {
        violations.push("prometheus.metrics_path must start with '/'".to_string());
    }
}

fn check_benches(benches: &[String], violations: &mut Vec<String>) {
    if benches.is_empty() {
        violations.push("frappe.benches must contain at least one path".to_string());
    }
    for (i, bench) in benches.iter().enumerate() {
        if bench.trim().is_empty() {
            violations.push(format!("frappe.benches[{i}]: path cannot be empty"));
            continue;
        }
        match std::fs::metadata(Path::new(bench)) {
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                violations.push(format!("frappe.benches: path '{bench}' does not exist"));
            }
            Err(err) => {
                violations.push(format!(
                    "frappe.benches: error accessing path '{bench}': {err}"
                ));
            }
            Ok(meta) if !meta.is_dir() => {
                violations.push(format!("frappe.benches: path '{bench}' is not a directory"));
            }
            Ok(_) => {}
        }
    }
}

fn check_log_files(log_files: &[String], violations: &mut Vec<String>) {
    if log_files.is_empty() {
        violations.push("frappe.log_files must contain at least one file name".to_string());
    }
    for (i, name) in log_files.iter().enumerate() {
        if name.trim().is_empty() {
            violations.push(format!("frappe.log_files[{i}]: file name cannot be empty"));
        } else if name.contains('/') || name.contains('\\') {
            violations.push(format!(
                "frappe.log_files[{i}]: '{name}' should be a file name, not a path"
            ));
        }
    }
}

fn check_exclude_list(key: &str, entries: &[String], violations: &mut Vec<String>) {
    for (i, entry) in entries.iter().enumerate() {
        if entry.trim().is_empty() {
            violations.push(format!("{key}[{i}] contains an empty value"));
        }
    }
}
