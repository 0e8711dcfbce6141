//! Which namespace (and therefore which record) to operate on.

use std::path::Path;

use tracing::debug;

pub const NAMESPACE_ENV: &str = "SCALER_NAMESPACE";
pub const POD_NAMESPACE_FILE: &str = "/var/run/secrets/kubernetes.io/serviceaccount/namespace";

/// Resolve the namespace: explicit argument, then `SCALER_NAMESPACE`,
/// then the pod's service-account namespace file, then `default`.
pub fn resolve_namespace(argument: Option<&str>) -> String {
    resolve_from(
        argument,
        std::env::var(NAMESPACE_ENV).ok(),
        Path::new(POD_NAMESPACE_FILE),
    )
}

fn resolve_from(argument: Option<&str>, env: Option<String>, pod_file: &Path) -> String {
    if let Some(ns) = argument.filter(|ns| !ns.is_empty()) {
        return ns.to_string();
    }

    if let Some(ns) = env.filter(|ns| !ns.is_empty()) {
        debug!(namespace = %ns, "namespace taken from environment");
        return ns;
    }

    if let Ok(content) = std::fs::read_to_string(pod_file) {
        let ns = content.trim();
        if !ns.is_empty() {
            debug!(namespace = %ns, "namespace taken from pod service account");
            return ns.to_string();
        }
    }

    "default".to_string()
}
