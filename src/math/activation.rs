/// Numerically stable logistic sigmoid.
///
/// Splits on the sign of `x` so `exp` is only ever taken of a non-positive
/// value and never overflows.
pub fn sigmoid(x: f64) -> f64 {
    if x >= 0.0 {
        1.0 / (1.0 + (-x).exp())
    } else {
        let e = x.exp();
        e / (1.0 + e)
    }
}

/// softplus(x) = ln(1 + e^x), stable for large |x|.
pub fn softplus(x: f64) -> f64 {
    x.max(0.0) + (-x.abs()).exp().ln_1p()
}

/// Binary cross-entropy on a raw logit:
///   max(x, 0) - x·t + ln(1 + e^-|x|)
pub fn bce_with_logits(x: f64, target: f64) -> f64 {
    softplus(x) - x * target
}
