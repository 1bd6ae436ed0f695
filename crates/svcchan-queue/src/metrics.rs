//! Prometheus counter for job outcomes, registered once at construction and
//! read back by whatever `/metrics` surface the daemon exposes.

use once_cell::sync::OnceCell;
use prometheus::{register_int_counter_vec, IntCounterVec};

static JOBS_TOTAL: OnceCell<IntCounterVec> = OnceCell::new();

/// Registers this crate's metrics with the default Prometheus registry.
/// Safe to call more than once; only the first call takes effect.
pub fn install() {
    let _ = JOBS_TOTAL.set(
        register_int_counter_vec!(
            "svcchan_queue_jobs_total",
            "Jobs processed by type and outcome",
            &["job_type", "outcome"]
        )
        .expect("register_int_counter_vec"),
    );
}

fn jobs_total() -> &'static IntCounterVec {
    JOBS_TOTAL.get().expect("svcchan_queue::metrics::install() must run before processing")
}

pub fn observe(job_type: &str, outcome: &str) {
    jobs_total().with_label_values(&[job_type, outcome]).inc();
}
