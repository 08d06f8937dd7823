//! Upload metrics.
//!
//! Counters are emitted through the `metrics` facade.  Without an installed
//! recorder they are no-ops, so the library never forces an exporter on
//! its users; applications install whichever recorder they like and call
//! [`describe_metrics`] once.

use metrics::{counter, describe_counter};

// -- Metric name constants ----------------------------------------------------

/// Finished uploads (counter). Labels: status (`ok` or the error code).
pub const UPLOADS_TOTAL: &str = "gcs_store_uploads_total";

/// Bytes handed to upload pipes (counter).
pub const UPLOAD_BYTES_TOTAL: &str = "gcs_store_upload_bytes_total";

/// Local pipe failures observed by writers (counter). Labels: code.
pub const WRITE_ERRORS_TOTAL: &str = "gcs_store_write_errors_total";

/// Register metric descriptions with the global recorder.
pub fn describe_metrics() {
    describe_counter!(UPLOADS_TOTAL, "Finished uploads by outcome");
    describe_counter!(UPLOAD_BYTES_TOTAL, "Bytes written to upload pipes");
    describe_counter!(WRITE_ERRORS_TOTAL, "Local upload pipe failures");
}

pub(crate) fn record_upload(status: &'static str) {
    counter!(UPLOADS_TOTAL, "status" => status).increment(1);
}

pub(crate) fn record_bytes(n: usize) {
    counter!(UPLOAD_BYTES_TOTAL).increment(n as u64);
}

pub(crate) fn record_write_error(code: &'static str) {
    counter!(WRITE_ERRORS_TOTAL, "code" => code).increment(1);
}
