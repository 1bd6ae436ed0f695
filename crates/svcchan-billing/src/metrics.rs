//! Prometheus histogram for cheque dispatch latency, registered once at
//! construction and read back by whatever `/metrics` surface the daemon exposes.

use once_cell::sync::OnceCell;
use prometheus::{register_histogram, Histogram};

static CHEQUE_DISPATCH_SECONDS: OnceCell<Histogram> = OnceCell::new();

/// Registers this crate's metrics with the default Prometheus registry.
/// Safe to call more than once; only the first call takes effect.
pub fn install() {
    let _ = CHEQUE_DISPATCH_SECONDS.set(
        register_histogram!(
            "svcchan_billing_cheque_dispatch_seconds",
            "Time spent signing and POSTing a cheque to the counterparty's payment receiver"
        )
        .expect("register_histogram"),
    );
}

fn cheque_dispatch_seconds() -> &'static Histogram {
    CHEQUE_DISPATCH_SECONDS
        .get()
        .expect("svcchan_billing::metrics::install() must run before dispatching cheques")
}

pub fn observe_dispatch(elapsed_secs: f64) {
    cheque_dispatch_seconds().observe(elapsed_secs);
}
