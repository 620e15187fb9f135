//! Adaptive Simpson quadrature with a bounded recursion budget.
//!
//! Used to integrate recency curves, e.g. `∫_0^d φ(s) ds` for the time since
//! a subject's prior test. The recursion depth is capped by the caller, so a
//! badly behaved integrand ends in a result flagged `converged = false`
//! instead of an unbounded loop.

use serde::{Deserialize, Serialize};

/// Default absolute tolerance for [`adaptive_simpson`].
pub const DEFAULT_TOLERANCE: f64 = 1e-10;

/// Default maximum recursion depth for [`adaptive_simpson`].
pub const DEFAULT_MAX_DEPTH: u32 = 40;

/// Tolerance and budget for adaptive quadrature.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QuadratureOptions {
    /// Absolute error target over the whole interval.
    pub tolerance: f64,
    /// Maximum bisection depth of any sub-interval.
    pub max_depth: u32,
}

impl Default for QuadratureOptions {
    fn default() -> Self {
        Self {
            tolerance: DEFAULT_TOLERANCE,
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }
}

/// Result of an adaptive quadrature run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Quadrature {
    /// Integral estimate (Richardson-corrected Simpson sum).
    pub value: f64,
    /// Number of integrand evaluations.
    pub evaluations: usize,
    /// False if any sub-interval hit the depth cap before meeting its tolerance.
    pub converged: bool,
}

struct Budget {
    evaluations: usize,
    converged: bool,
}

/// Integrate `f` over `[a, b]` by adaptive Simpson's rule.
///
/// Reversed bounds give the negated integral; an empty interval gives 0.
/// NaN bounds or a NaN integrand value yield a NaN, non-converged result.
pub fn adaptive_simpson<F>(f: F, a: f64, b: f64, options: QuadratureOptions) -> Quadrature
where
    F: Fn(f64) -> f64,
{
    if a.is_nan() || b.is_nan() {
        return Quadrature {
            value: f64::NAN,
            evaluations: 0,
            converged: false,
        };
    }
    if a == b {
        return Quadrature {
            value: 0.0,
            evaluations: 0,
            converged: true,
        };
    }
    if b < a {
        let flipped = adaptive_simpson(f, b, a, options);
        return Quadrature {
            value: -flipped.value,
            ..flipped
        };
    }

    let fa = f(a);
    let fb = f(b);
    let m = 0.5 * (a + b);
    let fm = f(m);
    let whole = simpson(a, b, fa, fm, fb);

    let mut budget = Budget {
        evaluations: 3,
        converged: true,
    };
    let value = refine(
        &f,
        Interval { a, b, fa, fm, fb },
        whole,
        options.tolerance,
        options.max_depth,
        &mut budget,
    );

    Quadrature {
        value,
        evaluations: budget.evaluations,
        converged: budget.converged && value.is_finite(),
    }
}

#[derive(Clone, Copy)]
struct Interval {
    a: f64,
    b: f64,
    fa: f64,
    fm: f64,
    fb: f64,
}

fn simpson(a: f64, b: f64, fa: f64, fm: f64, fb: f64) -> f64 {
    (b - a) / 6.0 * (fa + 4.0 * fm + fb)
}

fn refine<F>(f: &F, iv: Interval, whole: f64, tol: f64, depth: u32, budget: &mut Budget) -> f64
where
    F: Fn(f64) -> f64,
{
    let m = 0.5 * (iv.a + iv.b);
    let left_mid = 0.5 * (iv.a + m);
    let right_mid = 0.5 * (m + iv.b);
    let f_left_mid = f(left_mid);
    let f_right_mid = f(right_mid);
    budget.evaluations += 2;

    let left = simpson(iv.a, m, iv.fa, f_left_mid, iv.fm);
    let right = simpson(m, iv.b, iv.fm, f_right_mid, iv.fb);
    let delta = left + right - whole;

    if delta.is_nan() {
        budget.converged = false;
        return f64::NAN;
    }
    if delta.abs() <= 15.0 * tol {
        return left + right + delta / 15.0;
    }
    if depth == 0 {
        budget.converged = false;
        return left + right + delta / 15.0;
    }

    let lower = Interval {
        a: iv.a,
        b: m,
        fa: iv.fa,
        fm: f_left_mid,
        fb: iv.fm,
    };
    let upper = Interval {
        a: m,
        b: iv.b,
        fa: iv.fm,
        fm: f_right_mid,
        fb: iv.fb,
    };
    refine(f, lower, left, 0.5 * tol, depth - 1, budget)
        + refine(f, upper, right, 0.5 * tol, depth - 1, budget)
}
