use std::cmp::Ordering;

/// Relative tolerance used when comparing accumulated population sums.
pub const EPSILON: f64 = 1e-9;

pub fn percentage(part: f64, whole: f64) -> f64 {
    if whole > 0.0 {
        part / whole * 100.0
    } else {
        0.0
    }
}

pub fn fraction(part: f64, whole: f64) -> f64 {
    if whole > 0.0 {
        part / whole
    } else {
        0.0
    }
}

/// True when `candidate` beats `incumbent` by more than the tolerance.
pub fn improves(candidate: f64, incumbent: f64) -> bool {
    candidate > incumbent + EPSILON * incumbent.abs().max(1.0)
}

pub fn approx_eq(a: f64, b: f64) -> bool {
    (a - b).abs() <= EPSILON * a.abs().max(b.abs()).max(1.0)
}

pub fn is_non_negative(value: f64) -> bool {
    value.is_finite() && value >= 0.0
}

/// Orders by `a` descending, falling back to `tie` when the values are equal.
pub fn cmp_desc_then(a: f64, b: f64, tie: Ordering) -> Ordering {
    b.total_cmp(&a).then(tie)
}
