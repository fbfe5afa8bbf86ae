//! Metrics registration and Prometheus export.
//!
//! Counters are emitted where the work happens (`cmdb-core` stores and the
//! API request middleware); this module only describes them and installs
//! the recorder whose handle renders `/metrics`.

use metrics::{describe_counter, Unit};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use crate::ObservabilityError;

/// Assets created, labelled by `asset_type`.
pub const ASSETS_CREATED: &str = "cmdb_assets_created_total";
/// Snapshot records processed, labelled by `entity` and `outcome`.
pub const IMPORT_RECORDS: &str = "cmdb_import_records_total";
/// Secret values decrypted for an admin.
pub const SECRET_REVEALS: &str = "cmdb_secret_reveals_total";
/// HTTP requests, labelled by `method` and `status`.
pub const HTTP_REQUESTS: &str = "cmdb_http_requests_total";

/// Registers metric descriptions.
pub fn register_metrics() {
    describe_counter!(ASSETS_CREATED, Unit::Count, "Total number of assets created");
    describe_counter!(
        IMPORT_RECORDS,
        Unit::Count,
        "Snapshot records processed during import, by entity and outcome"
    );
    describe_counter!(
        SECRET_REVEALS,
        Unit::Count,
        "Number of credential values decrypted for administrators"
    );
    describe_counter!(HTTP_REQUESTS, Unit::Count, "Total number of HTTP requests");
}

/// Installs the global Prometheus recorder and describes all metrics.
///
/// Only one recorder can be installed per process.
pub fn install_prometheus_recorder() -> Result<PrometheusHandle, ObservabilityError> {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| ObservabilityError::Metrics(e.to_string()))?;
    register_metrics();
    Ok(handle)
}
