//! Prometheus gauge tracking the ingestor's progress, registered once at
//! construction and read back by whatever `/metrics` surface the daemon exposes.

use once_cell::sync::OnceCell;
use prometheus::{register_int_gauge, IntGauge};

static LAST_PROCESSED_BLOCK: OnceCell<IntGauge> = OnceCell::new();

/// Registers this crate's metrics with the default Prometheus registry.
/// Safe to call more than once; only the first call takes effect.
pub fn install() {
    let _ = LAST_PROCESSED_BLOCK.set(
        register_int_gauge!(
            "svcchan_ingest_last_processed_block",
            "Highest block number the log ingestor has scanned"
        )
        .expect("register_int_gauge"),
    );
}

fn last_processed_block() -> &'static IntGauge {
    LAST_PROCESSED_BLOCK
        .get()
        .expect("svcchan_ingest::metrics::install() must run before ticking")
}

pub fn set_last_processed_block(block: u64) {
    last_processed_block().set(block as i64);
}
