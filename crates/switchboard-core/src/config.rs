//! Tunables for the messaging and workflow core.

use std::time::Duration;

/// Core configuration shared by the services.
///
/// Every field has a production default; tests shrink the delays.
#[derive(Debug, Clone)]
pub struct CoreConfig {
    /// How long a `can_send_message` result stays cached.
    pub permission_cache_ttl: Duration,
    /// How far back a catch-up request may reach.
    pub catch_up_window: Duration,
    /// Hard cap on rows replayed by one catch-up request.
    pub catch_up_limit: usize,
    /// Delay before the next workflow step is executed.
    pub step_advance_delay: Duration,
    /// Timeout applied when a step does not declare `timeoutMs`.
    pub default_step_timeout: Duration,
    /// Maximum serialized payload size of a message, in bytes.
    pub max_payload_bytes: usize,
    pub default_page_size: usize,
    pub max_page_size: usize,
    /// Row ceiling for unpaginated export / stats reads.
    pub export_row_limit: usize,
    /// Window used to count "active threads" in message stats.
    pub stats_lookback: Duration,
    /// Number of recent delivered messages sampled for mean latency.
    pub latency_sample_size: usize,
    pub max_template_steps: usize,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            permission_cache_ttl: Duration::from_secs(60),
            catch_up_window: Duration::from_secs(5 * 60),
            catch_up_limit: 100,
            step_advance_delay: Duration::from_secs(1),
            default_step_timeout: Duration::from_secs(5 * 60),
            max_payload_bytes: 64 * 1024,
            default_page_size: 50,
            max_page_size: 100,
            export_row_limit: 10_000,
            stats_lookback: Duration::from_secs(24 * 60 * 60),
            latency_sample_size: 100,
            max_template_steps: 20,
        }
    }
}

impl CoreConfig {
    /// Clamp a requested page size into `1..=max_page_size`.
    pub fn page_size(&self, requested: Option<usize>) -> usize {
        requested
            .unwrap_or(self.default_page_size)
            .clamp(1, self.max_page_size)
    }
}
