use std::time::{SystemTime, UNIX_EPOCH};

/// Get current timestamp in milliseconds since epoch
pub fn current_timestamp_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Alert operations team (critical)
pub fn alert_operations_team_critical(message: String) {
    tracing::error!(alert = "critical", "CRITICAL ALERT: {}", message);
    send_pager_alert(&message, "critical");
    send_chat_alert(&message, "critical");
}

/// Alert operations team (warning)
pub fn alert_operations_team_warning(message: String) {
    tracing::warn!(alert = "warning", "WARNING ALERT: {}", message);
    send_chat_alert(&message, "warning");
}

// Delivery hooks. Only the log line is emitted until an on-call integration
// is configured for this service.
fn send_pager_alert(message: &str, severity: &str) {
    tracing::error!("[Pager] {} - {}", severity, message);
}

fn send_chat_alert(message: &str, severity: &str) {
    tracing::info!("[Chat] {} - {}", severity, message);
}

/// Symmetric jitter: `base * (1 ± fraction)` drawn uniformly.
pub fn jittered(base: f64, fraction: f64) -> f64 {
    if fraction <= 0.0 {
        return base;
    }
    let factor = 1.0 + rand::Rng::gen_range(&mut rand::thread_rng(), -fraction..=fraction);
    base * factor
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn jitter_stays_within_bounds() {
        for _ in 0..1_000 {
            let v = jittered(1_000.0, 0.2);
            assert!((800.0..=1_200.0).contains(&v));
        }
        assert_eq!(jittered(1_000.0, 0.0), 1_000.0);
    }
}
