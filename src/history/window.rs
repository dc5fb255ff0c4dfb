//! Rolling latency window and jitter.

/// Maximum number of samples kept per target.
pub const HISTORY_WINDOW: usize = 10;

/// Append a sample and evict the oldest ones until the window fits.
pub fn push_sample(samples: &mut Vec<f64>, latency: f64) {
    samples.push(latency);
    if samples.len() > HISTORY_WINDOW {
        let excess = samples.len() - HISTORY_WINDOW;
        samples.drain(..excess);
    }
}

/// Mean absolute difference between consecutive samples, oldest to newest.
///
/// Returns 0 for fewer than two samples.
pub fn jitter(samples: &[f64]) -> f64 {
    if samples.len() < 2 {
        return 0.0;
    }

    let total: f64 = samples.windows(2).map(|w| (w[1] - w[0]).abs()).sum();
    total / (samples.len() - 1) as f64
}
