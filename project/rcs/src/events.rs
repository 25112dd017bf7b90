use common::{EventRecorder, ObjectMeta};
use log::info;

/// Recorder that writes events to the process log. Suitable as a default
/// when no cluster event sink is wired up.
pub struct LogEventRecorder;

impl EventRecorder for LogEventRecorder {
    fn event(&self, object: &ObjectMeta, reason: &str, message: &str) {
        info!(
            target: "rcs::events",
            "{} {}: {}",
            object.key(),
            reason,
            message,
        );
    }
}
