use crate::distribution::SampleError;

/// kB -> MB, using the 1024 factor the original measurement files assume.
pub fn kb_to_mb(kilobytes: f64) -> f64 {
    kilobytes / 1024.0
}

pub fn mb_to_kb(megabytes: f64) -> f64 {
    megabytes * 1024.0
}

/// Latency measurements are recorded in milliseconds; the kernel works in
/// seconds throughout.
pub fn ms_to_secs(ms: f64) -> f64 {
    ms / 1000.0
}

/// `delay = size_MB * 8 / throughput_Mbps`, per spec.md §4.5. `throughput`
/// must be strictly positive; a non-positive draw is a `SampleError` that
/// aborts the simulation rather than silently producing an infinite or
/// negative delay.
pub fn throughput_delay_secs(
    size_mb: f64,
    throughput_mbps: f64,
    distribution_name: &str,
) -> Result<f64, SampleError> {
    if throughput_mbps <= 0.0 {
        return Err(SampleError::NonPositiveThroughput {
            name: distribution_name.to_owned(),
            value: throughput_mbps,
        });
    }
    Ok(size_mb * 8.0 / throughput_mbps)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kb_mb_roundtrip() {
        assert!((mb_to_kb(kb_to_mb(2048.0)) - 2048.0).abs() < 1e-9);
    }

    #[test]
    fn throughput_delay_rejects_non_positive() {
        assert!(throughput_delay_secs(1.0, 0.0, "uniform").is_err());
        assert!(throughput_delay_secs(1.0, -5.0, "uniform").is_err());
    }

    #[test]
    fn throughput_delay_formula() {
        let d = throughput_delay_secs(2.0, 8.0, "uniform").unwrap();
        assert!((d - 2.0).abs() < 1e-9);
    }
}
