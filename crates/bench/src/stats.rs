//! Summary statistics over trial times.

/// Median of the samples. For an even count the two middle values are averaged
/// (integer division). Returns 0 for an empty slice.
pub fn median(samples: &[u64]) -> u64 {
    let mut sorted = samples.to_vec();
    sorted.sort_unstable();
    let n = sorted.len();
    match n {
        0 => 0,
        _ if n % 2 == 0 => (sorted[n / 2 - 1] + sorted[n / 2]) / 2,
        _ => sorted[n / 2],
    }
}

pub fn mean(samples: &[u64]) -> f64 {
    if samples.is_empty() {
        return 0.0;
    }
    samples.iter().map(|&s| s as f64).sum::<f64>() / samples.len() as f64
}

/// Population standard deviation. A single sample has zero deviation.
pub fn stddev(samples: &[u64]) -> f64 {
    if samples.len() < 2 {
        return 0.0;
    }
    let m = mean(samples);
    let sum: f64 = samples.iter().map(|&s| (s as f64 - m).powi(2)).sum();
    (sum / samples.len() as f64).sqrt()
}

/// Render with six significant digits and no trailing zeros (`0`, `12.5`, `0.471405`).
pub fn format_float(value: f64) -> String {
    if value == 0.0 || !value.is_finite() {
        return format!("{}", value);
    }
    let magnitude = value.abs().log10().floor() as i32;
    let decimals = (5 - magnitude).max(0) as usize;
    let text = format!("{:.*}", decimals, value);
    if text.contains('.') {
        text.trim_end_matches('0').trim_end_matches('.').to_string()
    } else {
        text
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn median_odd_and_even() {
        assert_eq!(median(&[7]), 7);
        assert_eq!(median(&[9, 1, 5]), 5);
        assert_eq!(median(&[4, 1, 3, 2]), 2);
        assert_eq!(median(&[10, 20]), 15);
        assert_eq!(median(&[]), 0);
    }

    #[test]
    fn stddev_is_population() {
        assert_eq!(stddev(&[5]), 0.0);
        assert_eq!(stddev(&[2, 4, 4, 4, 5, 5, 7, 9]), 2.0);
    }

    #[test]
    fn float_formatting() {
        assert_eq!(format_float(0.0), "0");
        assert_eq!(format_float(2.0), "2");
        assert_eq!(format_float(12.5), "12.5");
        assert_eq!(format_float(0.4714045207910317), "0.471405");
        assert_eq!(format_float(1234.56789), "1234.57");
    }
}
