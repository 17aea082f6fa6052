//! Power-mean scoring
//!
//! `score = floor((Σ t_i^k / N)^(1/k))`. With `k > 1` slow submissions
//! weigh super-linearly, so a policy that starves any submission scores
//! badly even when its average latency is low.

/// Default power-mean exponent
pub const DEFAULT_SCORE_EXPONENT: u32 = 3;

/// Largest exponent `SimulationConfig` accepts
pub const MAX_SCORE_EXPONENT: u32 = 32;

/// Floor of the power mean of `times` with integer exponent `exponent`
///
/// Computed exactly: the result is the largest `r` with
/// `r^k * N <= Σ t^k`. A float estimate seeds the search and integer
/// checks correct it, so exact powers never round down. When `Σ t^k`
/// does not fit in a `u128` the mean is computed in floating point
/// instead. Negative times count as zero; an empty slice scores zero.
pub fn power_mean(times: &[i64], exponent: u32) -> u64 {
    if times.is_empty() || exponent == 0 {
        return 0;
    }

    let largest = times.iter().map(|&time| time.max(0)).max().unwrap_or(0) as u128;
    let count = times.len() as u128;
    let sum = times
        .iter()
        .map(|&time| saturating_pow(time.max(0) as u128, exponent))
        .fold(0u128, u128::saturating_add);
    if sum == u128::MAX {
        return scaled_power_mean(times, exponent);
    }

    let within = |root: u128| saturating_pow(root, exponent).saturating_mul(count) <= sum;

    // the power mean never exceeds the largest time
    let estimate = (sum as f64 / count as f64).powf(1.0 / f64::from(exponent));
    let mut root = if estimate.is_finite() { (estimate as u128).min(largest) } else { 0 };
    while root > 0 && !within(root) {
        root -= 1;
    }
    while root < largest && within(root + 1) {
        root += 1;
    }
    u64::try_from(root).unwrap_or(u64::MAX)
}

/// `max * (Σ (t/max)^k / N)^(1/k)`, which cannot overflow
fn scaled_power_mean(times: &[i64], exponent: u32) -> u64 {
    let largest = times.iter().map(|&time| time.max(0)).max().unwrap_or(0);
    if largest == 0 {
        return 0;
    }
    let scale = largest as f64;
    let power = i32::try_from(exponent).unwrap_or(i32::MAX);
    let mean = times
        .iter()
        .map(|&time| (time.max(0) as f64 / scale).powi(power))
        .sum::<f64>()
        / times.len() as f64;
    ((scale * mean.powf(1.0 / f64::from(exponent))) as u64).min(largest as u64)
}

fn saturating_pow(base: u128, exponent: u32) -> u128 {
    base.checked_pow(exponent).unwrap_or(u128::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_value_is_itself() {
        assert_eq!(power_mean(&[300], 3), 300);
        assert_eq!(power_mean(&[1], 3), 1);
        assert_eq!(power_mean(&[0], 3), 0);
    }

    #[test]
    fn test_equal_values_are_exact() {
        for value in [10, 99, 300, 1_000, 12_345, 1_000_000] {
            assert_eq!(power_mean(&[value; 7], 3), value as u64);
        }
    }

    #[test]
    fn test_slow_submission_dominates() {
        // (0 + 1000^3) / 2 = 5e8, cube root ~ 793.7
        assert_eq!(power_mean(&[0, 1000], 3), 793);
        // the arithmetic mean would be 500
        assert!(power_mean(&[0, 1000], 3) > 500);
    }

    #[test]
    fn test_exponent_one_is_floored_mean() {
        assert_eq!(power_mean(&[10, 20, 31], 1), 20);
    }

    #[test]
    fn test_overflowing_sums_still_score() {
        // 10_000^10 * 2 and (2^63)^3 do not fit in a u128
        assert_eq!(power_mean(&[10_000, 10_000], 10), 10_000);
        assert_eq!(power_mean(&[i64::MAX], 3), i64::MAX as u64);

        // 1e6 * 0.5^(1/10) ~ 933_033
        let score = power_mean(&[0, 1_000_000], 10);
        assert!((933_000..=933_100).contains(&score), "score {score}");
    }

    #[test]
    fn test_large_times_below_overflow_are_exact() {
        let time = 1i64 << 40;
        assert_eq!(power_mean(&[time, time], 3), time as u64);
    }

    #[test]
    fn test_empty_scores_zero() {
        assert_eq!(power_mean(&[], 3), 0);
    }
}
