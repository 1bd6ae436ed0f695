//! Prometheus counters for the payment receiver, registered once at router construction and read
//! back by the `/metrics` handler.

use once_cell::sync::OnceCell;
use prometheus::{register_histogram, register_int_counter_vec, Histogram, IntCounterVec};

static CHEQUES_TOTAL: OnceCell<IntCounterVec> = OnceCell::new();
static CHEQUE_LATENCY_SECONDS: OnceCell<Histogram> = OnceCell::new();

/// Registers this crate's metrics with the default Prometheus registry.
/// Safe to call more than once; only the first call takes effect.
pub fn install() {
    let _ = CHEQUES_TOTAL.set(
        register_int_counter_vec!(
            "svcchan_payment_cheques_total",
            "Cheques received by outcome",
            &["outcome"]
        )
        .expect("register_int_counter_vec"),
    );
    let _ = CHEQUE_LATENCY_SECONDS.set(
        register_histogram!(
            "svcchan_payment_cheque_duration_seconds",
            "Time spent validating and applying a cheque"
        )
        .expect("register_histogram"),
    );
}

fn cheques_total() -> &'static IntCounterVec {
    CHEQUES_TOTAL.get().expect("svcchan_payment::metrics::install() must run before serving")
}

fn cheque_latency() -> &'static Histogram {
    CHEQUE_LATENCY_SECONDS.get().expect("svcchan_payment::metrics::install() must run before serving")
}

pub fn observe_outcome(outcome: &str, elapsed_secs: f64) {
    cheques_total().with_label_values(&[outcome]).inc();
    cheque_latency().observe(elapsed_secs);
}
