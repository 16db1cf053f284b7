//! # Failure Reporting
//!
//! Two reporting paths sit outside the normal error flow:
//!
//! - Meeting-fatal faults (persistence failures) go to the monitoring
//!   sink before the session is driven to its error presentation.
//! - Uncaught faults take the fail-fast path: report, then exit with a
//!   non-zero status and let external supervision restart the process.
//!   No in-process recovery is attempted from an unknown-shape fault.

use tracing::error;

use crate::error::AppError;

/// Target picked up by the external monitoring pipeline.
const MONITOR_TARGET: &str = "monitor";

/// Report a meeting-fatal fault to the monitoring sink.
pub fn report_meeting_failure(meeting_id: i64, err: &AppError) {
    error!(
        target: MONITOR_TARGET,
        meeting_id,
        code = err.code(),
        "meeting failed fatally: {}",
        err
    );
}

/// Install the process-wide panic hook: report the fault, then exit
/// deliberately. Supervision owns the restart.
pub fn install_panic_hook() {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        error!(target: MONITOR_TARGET, "unhandled fault: {}", info);
        default_hook(info);
        std::process::exit(70);
    }));
}
