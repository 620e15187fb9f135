//! Property-based tests for ra-math numerical functions.
//!
//! Uses proptest to verify mathematical properties hold across many random inputs.

use proptest::prelude::*;
use ra_math::{
    adaptive_simpson, cloglog, cloglog_inverse, gamma_cdf, gamma_survival, log_gamma, logit,
    sigmoid, QuadratureOptions,
};

/// Tolerance for floating point comparisons.
const TOL: f64 = 1e-10;

/// Extended tolerance for log_gamma where Lanczos approximation has some error.
const LGAMMA_TOL: f64 = 1e-8;

/// Helper to check approximate equality.
fn approx_eq(a: f64, b: f64, tol: f64) -> bool {
    if a.is_nan() || b.is_nan() {
        return false;
    }
    (a - b).abs() <= tol.max(tol * a.abs().max(b.abs()))
}

// ============================================================================
// log_gamma properties
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(500))]

    /// Γ(z+1) = z·Γ(z).
    #[test]
    fn log_gamma_recurrence(z in 1.0..100.0f64) {
        let lhs = log_gamma(z + 1.0);
        let rhs = z.ln() + log_gamma(z);
        prop_assert!(approx_eq(lhs, rhs, LGAMMA_TOL), "lgamma({}) recurrence: {} vs {}", z, lhs, rhs);
    }
}

// ============================================================================
// Link function properties
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(1000))]

    /// sigmoid maps the real line into [0, 1] and is increasing.
    #[test]
    fn sigmoid_bounded_and_monotone(x in -50.0..50.0f64, dx in 0.001..5.0f64) {
        let a = sigmoid(x);
        let b = sigmoid(x + dx);
        prop_assert!((0.0..=1.0).contains(&a));
        prop_assert!(b >= a, "sigmoid not monotone at {}: {} > {}", x, a, b);
    }

    /// logit undoes sigmoid away from saturation.
    #[test]
    fn logit_sigmoid_round_trip(x in -15.0..15.0f64) {
        let back = logit(sigmoid(x));
        prop_assert!(approx_eq(back, x, 1e-8), "logit(sigmoid({})) = {}", x, back);
    }

    /// cloglog undoes its inverse away from saturation.
    #[test]
    fn cloglog_round_trip(eta in -10.0..2.5f64) {
        let back = cloglog(cloglog_inverse(eta));
        prop_assert!(approx_eq(back, eta, 1e-8), "cloglog round trip at {}: {}", eta, back);
    }
}

// ============================================================================
// Gamma recency curve properties
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(500))]

    /// CDF and survival partition probability mass.
    #[test]
    fn cdf_plus_survival_is_one(t in 0.0..40.0f64, alpha in 0.2..10.0f64, beta in 0.1..5.0f64) {
        let total = gamma_cdf(t, alpha, beta) + gamma_survival(t, alpha, beta);
        prop_assert!(approx_eq(total, 1.0, TOL), "F+S = {} at t={}", total, t);
    }

    /// A Gamma survival curve is a valid recency probability.
    #[test]
    fn survival_is_probability(t in 0.0..100.0f64, alpha in 0.2..10.0f64, beta in 0.1..5.0f64) {
        let s = gamma_survival(t, alpha, beta);
        prop_assert!((0.0..=1.0).contains(&s), "S({}) = {}", t, s);
    }
}

// ============================================================================
// Quadrature properties
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    /// Integrating over [a, c] equals [a, b] + [b, c].
    #[test]
    fn quadrature_is_additive(b in 0.1..5.0f64, extra in 0.1..5.0f64) {
        let opts = QuadratureOptions::default();
        let phi = |s: f64| gamma_survival(s, 2.0, 1.5);
        let c = b + extra;
        let whole = adaptive_simpson(phi, 0.0, c, opts);
        let left = adaptive_simpson(phi, 0.0, b, opts);
        let right = adaptive_simpson(phi, b, c, opts);
        prop_assert!(whole.converged && left.converged && right.converged);
        prop_assert!(approx_eq(whole.value, left.value + right.value, 1e-8),
            "{} != {} + {}", whole.value, left.value, right.value);
    }

    /// The integral of a probability curve over [0, d] lies in [0, d].
    #[test]
    fn recency_integral_bounded_by_length(d in 0.0..20.0f64, alpha in 0.5..5.0f64, beta in 0.2..4.0f64) {
        let q = adaptive_simpson(|s| gamma_survival(s, alpha, beta), 0.0, d, QuadratureOptions::default());
        prop_assert!(q.value >= -TOL && q.value <= d + TOL, "∫_0^{} φ = {}", d, q.value);
    }
}

// ============================================================================
// Edge cases
// ============================================================================

#[test]
fn edge_case_nan_propagation() {
    assert!(log_gamma(f64::NAN).is_nan());
    assert!(sigmoid(f64::NAN).is_nan());
    assert!(gamma_survival(f64::NAN, 1.0, 1.0).is_nan());
}

#[test]
fn edge_case_quadrature_nan_bounds() {
    let q = adaptive_simpson(|x| x, f64::NAN, 1.0, QuadratureOptions::default());
    assert!(q.value.is_nan());
    assert!(!q.converged);
}
