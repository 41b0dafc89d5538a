//! One-time metric registration so series show up with descriptions on
//! whatever exporter the host wires up.

use metrics::{describe_counter, describe_gauge};
use once_cell::sync::OnceCell;

pub fn ensure_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("monitor_runs_total", "Completed monitoring job runs.");
        describe_counter!("monitor_run_failures_total", "Job runs that ended in failure.");
        describe_counter!("alerts_emitted_total", "Alerts handed to the dispatcher, by kind.");
        describe_counter!(
            "alerts_undelivered_total",
            "Alerts that failed on every configured channel."
        );
        describe_counter!(
            "channel_send_failures_total",
            "Individual channel send failures, by channel."
        );
        describe_gauge!("monitor_last_run_ts", "Unix ts of the last completed run.");
    });
}
