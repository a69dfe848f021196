//! Call quality estimation (simplified ITU-T G.107 E-model)

/// Base R-factor for G.711
pub const DEFAULT_BASE_R_FACTOR: f32 = 93.2;

/// RTP clock rate assumed when converting jitter to milliseconds
pub const DEFAULT_CLOCK_RATE: u32 = 8000;

/// Estimate the R-factor from loss and jitter
///
/// `fraction_lost` is a ratio in `[0, 1]`, `jitter_ms` the interarrival jitter.
pub fn r_factor(fraction_lost: f32, jitter_ms: f32) -> f32 {
    // Jitter buffers trade jitter for delay
    let effective_delay_ms = jitter_ms * 2.0 + 10.0;
    let id = delay_impairment(effective_delay_ms);

    let loss_percent = (fraction_lost * 100.0).clamp(0.0, 100.0);
    let ie_eff = 95.0 * loss_percent / (loss_percent + 25.1);

    (DEFAULT_BASE_R_FACTOR - id - ie_eff).clamp(0.0, 100.0)
}

fn delay_impairment(one_way_delay_ms: f32) -> f32 {
    if one_way_delay_ms < 177.3 {
        0.024 * one_way_delay_ms
    } else {
        0.024 * one_way_delay_ms + 0.11 * (one_way_delay_ms - 177.3)
    }
}

/// Convert an R-factor to a Mean Opinion Score
pub fn mos(r_factor: f32) -> f32 {
    if r_factor <= 0.0 {
        1.0
    } else if r_factor >= 100.0 {
        4.5
    } else {
        1.0 + 0.035 * r_factor + r_factor * (r_factor - 60.0) * (100.0 - r_factor) * 7.0e-6
    }
}

/// Convert jitter from timestamp units to milliseconds
pub fn jitter_millis(jitter: f32, clock_rate: u32) -> f32 {
    if clock_rate == 0 {
        0.0
    } else {
        jitter * 1000.0 / clock_rate as f32
    }
}
