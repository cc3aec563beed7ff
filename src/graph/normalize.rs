//! Min-max score normalization shared by every scoring stage.

/// Spread below which a score vector is treated as constant.
pub const DEGENERATE_SPREAD: f64 = 1e-10;

/// Min-max normalize `scores` into `[0, 1]`.
///
/// Non-finite inputs are coerced to `0.0` first. When the spread is below
/// [`DEGENERATE_SPREAD`] every entry becomes `1.0`, so a constant round makes
/// every candidate equally best and argmax falls back to array order.
#[must_use]
pub fn normalize(scores: &[f64]) -> Vec<f64> {
    let cleaned: Vec<f64> = scores.iter().map(|&v| finite_or_zero(v)).collect();

    let (min, max) = cleaned
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| {
            (lo.min(v), hi.max(v))
        });

    if cleaned.is_empty() || max - min < DEGENERATE_SPREAD {
        return vec![1.0; cleaned.len()];
    }

    let range = max - min;
    cleaned
        .into_iter()
        .map(|v| finite_or_zero((v - min) / range))
        .collect()
}

/// Replace NaN and infinities with `0.0`.
#[inline]
#[must_use]
pub fn finite_or_zero(v: f64) -> f64 {
    if v.is_finite() { v } else { 0.0 }
}

/// Index of the first maximum. Ties resolve to the lowest index.
#[must_use]
pub fn argmax(values: &[f64]) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;
    for (i, &v) in values.iter().enumerate() {
        let v = finite_or_zero(v);
        match best {
            Some((_, b)) if v <= b => {}
            _ => best = Some((i, v)),
        }
    }
    best.map(|(i, _)| i)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_degenerate_is_all_ones() {
        assert_eq!(normalize(&[5.0, 5.0, 5.0]), vec![1.0, 1.0, 1.0]);
    }

    #[test]
    fn test_normalize_range() {
        let out = normalize(&[2.0, 4.0, 3.0]);
        assert_eq!(out, vec![0.0, 1.0, 0.5]);
    }

    #[test]
    fn test_normalize_empty() {
        assert!(normalize(&[]).is_empty());
    }

    #[test]
    fn test_normalize_coerces_nan() {
        let out = normalize(&[f64::NAN, 2.0, f64::INFINITY]);
        assert_eq!(out, vec![0.0, 1.0, 0.0]);
    }

    #[test]
    fn test_argmax_ties_pick_lowest_index() {
        assert_eq!(argmax(&[0.2, 0.9, 0.9]), Some(1));
        assert_eq!(argmax(&[1.0, 1.0, 1.0]), Some(0));
        assert_eq!(argmax(&[]), None);
    }

    #[test]
    fn test_argmax_ignores_nan() {
        assert_eq!(argmax(&[f64::NAN, 0.5]), Some(1));
    }
}
