//! Gamma distribution functions used as recency decay curves.
//!
//! A common parametric choice for the recency probability curve is the
//! Gamma survival function, `φ(t) = 1 - F(t; α, β)`: every subject tests
//! "recent" at infection and the probability decays with time since
//! infection. The residual-time prior test model also draws from the Gamma
//! family.
//!
//! # Parameterization
//!
//! **Rate parameterization** throughout: `Gamma(α, β)` with shape `α > 0` and
//! rate `β > 0`, density `f(t) = β^α / Γ(α) * t^(α-1) * e^(-βt)`.
//!
//! Invalid parameters produce NaN; callers validate parameters up front.

use super::stable::log_gamma;

// Constants for incomplete gamma computation
const GAMMAINC_MAX_ITERS: usize = 200;
const GAMMAINC_EPS: f64 = 3.0e-12;
const GAMMAINC_FPMIN: f64 = 1.0e-30;

fn invalid_params(alpha: f64, beta: f64) -> bool {
    alpha.is_nan() || beta.is_nan() || alpha <= 0.0 || beta <= 0.0
}

/// Regularized lower incomplete gamma function P(a, x).
///
/// This is the CDF of Gamma(a, 1) evaluated at x.
pub fn gamma_p(a: f64, x: f64) -> f64 {
    if a.is_nan() || x.is_nan() || a <= 0.0 || x < 0.0 {
        return f64::NAN;
    }
    if x == 0.0 {
        return 0.0;
    }
    if x.is_infinite() {
        return 1.0;
    }
    if x < a + 1.0 {
        gammainc_series(a, x)
    } else {
        1.0 - gammainc_cf(a, x)
    }
}

/// Regularized upper incomplete gamma function Q(a, x) = 1 - P(a, x).
pub fn gamma_q(a: f64, x: f64) -> f64 {
    if a.is_nan() || x.is_nan() || a <= 0.0 || x < 0.0 {
        return f64::NAN;
    }
    if x == 0.0 {
        return 1.0;
    }
    if x.is_infinite() {
        return 0.0;
    }
    if x < a + 1.0 {
        1.0 - gammainc_series(a, x)
    } else {
        gammainc_cf(a, x)
    }
}

/// Series expansion for P(a, x) when x < a+1.
///
/// P(a, x) = e^(-x) * x^a * Σ_{n=0}^∞ x^n / Γ(a+n+1)
fn gammainc_series(a: f64, x: f64) -> f64 {
    let log_prefactor = a * x.ln() - x - log_gamma(a);

    let mut term = 1.0 / a;
    let mut sum = term;
    for n in 1..=GAMMAINC_MAX_ITERS {
        term *= x / (a + n as f64);
        sum += term;
        if term.abs() < GAMMAINC_EPS * sum.abs() {
            break;
        }
    }

    (log_prefactor.exp() * sum).clamp(0.0, 1.0)
}

/// Continued fraction for Q(a, x) when x >= a+1 (modified Lentz).
fn gammainc_cf(a: f64, x: f64) -> f64 {
    let log_prefactor = a * x.ln() - x - log_gamma(a);

    let mut b = x - a + 1.0;
    let mut c = 1.0 / GAMMAINC_FPMIN;
    let mut d = 1.0 / b;
    let mut h = d;

    for i in 1..=GAMMAINC_MAX_ITERS {
        let ai = -(i as f64) * (i as f64 - a);
        b += 2.0;
        d = ai * d + b;
        if d.abs() < GAMMAINC_FPMIN {
            d = GAMMAINC_FPMIN;
        }
        c = b + ai / c;
        if c.abs() < GAMMAINC_FPMIN {
            c = GAMMAINC_FPMIN;
        }
        d = 1.0 / d;
        let del = d * c;
        h *= del;
        if (del - 1.0).abs() < GAMMAINC_EPS {
            break;
        }
    }

    (log_prefactor.exp() * h).clamp(0.0, 1.0)
}

/// CDF of the Gamma distribution, `P(T <= t)`.
pub fn gamma_cdf(t: f64, alpha: f64, beta: f64) -> f64 {
    if t.is_nan() || invalid_params(alpha, beta) {
        return f64::NAN;
    }
    if t <= 0.0 {
        return 0.0;
    }
    gamma_p(alpha, beta * t)
}

/// Survival function `P(T > t)`.
///
/// As a recency curve this is the probability of still testing "recent"
/// `t` time units after infection.
pub fn gamma_survival(t: f64, alpha: f64, beta: f64) -> f64 {
    if t.is_nan() || invalid_params(alpha, beta) {
        return f64::NAN;
    }
    if t <= 0.0 {
        return 1.0;
    }
    gamma_q(alpha, beta * t)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx_eq(a: f64, b: f64, tol: f64) -> bool {
        if a.is_nan() || b.is_nan() {
            return false;
        }
        (a - b).abs() <= tol
    }

    // ==================== Exponential special case ====================
    // Gamma(1, β) survival = e^(-βt), the textbook exponential recency curve.

    #[test]
    fn exponential_recency_curve_matches_closed_form() {
        for t in [0.1_f64, 0.5, 1.0, 2.0, 4.0] {
            let expected = (-2.0 * t).exp();
            let got = gamma_survival(t, 1.0, 2.0);
            assert!(
                approx_eq(got, expected, 1e-9),
                "Gamma(1,2) survival at t={}: got {}, expected {}",
                t,
                got,
                expected
            );
        }
    }

    // ==================== Golden values ====================

    #[test]
    fn gamma_cdf_known_values() {
        let cdf = gamma_cdf(1.0, 1.0, 1.0);
        assert!(approx_eq(cdf, 1.0 - (-1.0_f64).exp(), 1e-9));

        // P(2, 2) ≈ 0.593994
        let cdf2 = gamma_cdf(2.0, 2.0, 1.0);
        assert!(approx_eq(cdf2, 0.593_994_150_290_161_9, 1e-9), "got {}", cdf2);
    }

    #[test]
    fn p_and_q_are_complements() {
        for (a, x) in [(0.5, 0.2), (2.5, 1.5), (4.0, 9.0), (10.0, 3.0)] {
            let total = gamma_p(a, x) + gamma_q(a, x);
            assert!(approx_eq(total, 1.0, 1e-10), "P+Q at a={}, x={}: {}", a, x, total);
        }
    }

    // ==================== Recency curve shape ====================

    #[test]
    fn survival_starts_at_one_and_decreases() {
        assert_eq!(gamma_survival(0.0, 2.0, 1.0), 1.0);
        let mut prev = 1.0;
        for t in [0.1, 0.5, 1.0, 2.0, 5.0, 10.0] {
            let s = gamma_survival(t, 2.0, 1.0);
            assert!(s < prev, "survival must decrease: S({}) = {} >= {}", t, s, prev);
            prev = s;
        }
    }

    #[test]
    fn survival_tail_is_tiny_but_not_negative() {
        let s = gamma_survival(100.0, 2.0, 1.0);
        assert!((0.0..1e-30).contains(&s), "got {}", s);
    }

    // ==================== Invalid input ====================

    #[test]
    fn invalid_params_return_nan() {
        assert!(gamma_cdf(1.0, -1.0, 1.0).is_nan());
        assert!(gamma_survival(1.0, 1.0, 0.0).is_nan());
        assert!(gamma_p(-1.0, 1.0).is_nan());
        assert!(gamma_survival(f64::NAN, 1.0, 1.0).is_nan());
    }

    #[test]
    fn negative_time_is_before_infection() {
        assert_eq!(gamma_cdf(-1.0, 2.0, 1.0), 0.0);
        assert_eq!(gamma_survival(-1.0, 2.0, 1.0), 1.0);
    }
}
