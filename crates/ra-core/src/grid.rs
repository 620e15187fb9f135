//! Cumulative φ and its delta-method covariance on a uniform time grid.

use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::phi::PhiPrediction;

/// Relative tolerance for matching a time to a grid point.
const GRID_TOLERANCE: f64 = 1e-9;

/// `{0, Δt, 2Δt, …, (len-1)Δt}`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimeGrid {
    step: f64,
    len: usize,
}

impl TimeGrid {
    /// Grid from 0 to `upper` inclusive. `step` must divide `upper`.
    pub fn new(step: f64, upper: f64) -> Result<Self> {
        if !(step > 0.0) || !step.is_finite() {
            return Err(Error::configuration(
                "grid_step",
                format!("must be positive and finite, got {}", step),
            ));
        }
        if !(upper >= 0.0) || !upper.is_finite() {
            return Err(Error::configuration(
                "grid upper bound",
                format!("must be non-negative and finite, got {}", upper),
            ));
        }
        let intervals = (upper / step).round();
        if (intervals * step - upper).abs() > GRID_TOLERANCE * upper.max(1.0) {
            return Err(Error::configuration(
                "grid_step",
                format!("{} does not divide {}", step, upper),
            ));
        }
        Ok(Self {
            step,
            len: intervals as usize + 1,
        })
    }

    pub fn step(&self) -> f64 {
        self.step
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn time(&self, i: usize) -> f64 {
        i as f64 * self.step
    }

    pub fn times(&self) -> Vec<f64> {
        (0..self.len).map(|i| self.time(i)).collect()
    }

    /// Grid times without the origin.
    pub fn positive_times(&self) -> Vec<f64> {
        (1..self.len).map(|i| self.time(i)).collect()
    }

    pub fn index_of(&self, t: f64) -> Result<usize> {
        if !t.is_finite() {
            return Err(Error::numerical_range(
                "grid time",
                format!("{} is not a finite time", t),
            ));
        }
        let i = (t / self.step).round();
        if i < 0.0 || i as usize >= self.len || (i * self.step - t).abs() > GRID_TOLERANCE * t.abs().max(1.0) {
            return Err(Error::configuration(
                "grid time",
                format!("{} is not a point of the grid with step {}", t, self.step),
            ));
        }
        Ok(i as usize)
    }
}

/// One entry of the long-format covariance view.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GridCell {
    pub row: usize,
    pub col: usize,
    pub value: f64,
}

/// Trapezoid cumulative φ, `C_i = Δt·Σ_{j<i} (φ_j + φ_{j+1})/2`, and its
/// covariance `V_ij = Σ_a Σ_b w_ia w_jb Cov(φ_a, φ_b)` under the same weights.
#[derive(Debug, Clone, PartialEq)]
pub struct CumulativeGrid {
    grid: TimeGrid,
    cumulative: DVector<f64>,
    covariance: DMatrix<f64>,
}

impl CumulativeGrid {
    /// From a φ prediction on `Δt..=τ` or `0..=τ`. A missing origin is taken
    /// as φ(0) = 1 with zero variance.
    pub fn from_prediction(prediction: &PhiPrediction, step: f64) -> Result<Self> {
        let has_origin = prediction
            .times
            .first()
            .is_some_and(|&t| t.abs() <= GRID_TOLERANCE * step);

        let (times, point, covariance) = if has_origin {
            (
                prediction.times.clone(),
                prediction.point.clone(),
                prediction.covariance.clone(),
            )
        } else {
            let k = prediction.times.len();
            let mut times = Vec::with_capacity(k + 1);
            times.push(0.0);
            times.extend_from_slice(&prediction.times);

            let mut point = DVector::zeros(k + 1);
            point[0] = 1.0;
            point.rows_mut(1, k).copy_from(&prediction.point);

            let mut covariance = DMatrix::zeros(k + 1, k + 1);
            covariance.view_mut((1, 1), (k, k)).copy_from(&prediction.covariance);
            (times, point, covariance)
        };

        for (i, &t) in times.iter().enumerate() {
            let expected = i as f64 * step;
            if (t - expected).abs() > GRID_TOLERANCE * expected.max(1.0) {
                return Err(Error::configuration(
                    "grid",
                    format!("prediction time {} at index {} is not {}·{}", t, i, i, step),
                ));
            }
        }

        Self::from_parts(step, point, covariance)
    }

    /// From φ and Cov(φ) on grid indices `0..=k`.
    pub fn from_parts(step: f64, point: DVector<f64>, covariance: DMatrix<f64>) -> Result<Self> {
        let n = point.len();
        if covariance.shape() != (n, n) {
            return Err(Error::configuration(
                "covariance",
                format!("shape {:?} does not match {} grid points", covariance.shape(), n),
            ));
        }
        for (i, &phi) in point.iter().enumerate() {
            if phi.is_nan() || !(0.0..=1.0).contains(&phi) {
                return Err(Error::numerical_range(
                    "phi estimate",
                    format!("value {} at grid index {} is outside [0, 1]", phi, i),
                ));
            }
        }
        if covariance.iter().any(|v| v.is_nan()) {
            return Err(Error::numerical_range("phi covariance", "contains NaN"));
        }

        let grid = TimeGrid {
            step,
            len: n,
        };

        // Exclusive prefix sums of φ, E_p = Σ_{j<p} φ_j for p in 0..=n.
        let mut prefix = vec![0.0f64; n + 1];
        for j in 0..n {
            prefix[j + 1] = prefix[j] + point[j];
        }
        let cumulative = DVector::from_fn(n, |i, _| {
            step * 0.5 * (prefix[i] + prefix[i + 1] - prefix[1])
        });

        // D_pq = Σ_{a<p}Σ_{b<q} Cov(φ_a, φ_b) for p, q in 0..=n.
        let mut double = DMatrix::<f64>::zeros(n + 1, n + 1);
        for p in 1..=n {
            for q in 1..=n {
                double[(p, q)] = covariance[(p - 1, q - 1)] + double[(p - 1, q)]
                    + double[(p, q - 1)]
                    - double[(p - 1, q - 1)];
            }
        }

        // C_i is linear in E_i, E_{i+1} and E_1 with signs (+, +, -).
        let ends = |i: usize| -> [(usize, f64); 3] { [(i, 1.0), (i + 1, 1.0), (1, -1.0)] };
        let scale = 0.25 * step * step;
        let mut v = DMatrix::<f64>::zeros(n, n);
        for i in 1..n {
            for j in 1..n {
                let mut sum = 0.0f64;
                for (p, sp) in ends(i) {
                    for (q, sq) in ends(j) {
                        sum += sp * sq * double[(p, q)];
                    }
                }
                v[(i, j)] = scale * sum;
            }
        }
        let covariance = (&v + v.transpose()) * 0.5;

        Ok(Self {
            grid,
            cumulative,
            covariance,
        })
    }

    pub fn grid(&self) -> &TimeGrid {
        &self.grid
    }

    pub fn len(&self) -> usize {
        self.grid.len
    }

    pub fn is_empty(&self) -> bool {
        self.grid.len == 0
    }

    pub fn step(&self) -> f64 {
        self.grid.step
    }

    pub fn cumulative(&self, i: usize) -> f64 {
        self.cumulative[i]
    }

    /// `C` at grid time `t`.
    pub fn cumulative_at(&self, t: f64) -> Result<f64> {
        Ok(self.cumulative[self.grid.index_of(t)?])
    }

    pub fn variance(&self, i: usize, j: usize) -> f64 {
        self.covariance[(i, j)]
    }

    pub fn covariance(&self) -> &DMatrix<f64> {
        &self.covariance
    }

    /// `(row, col, value)` for every pair of grid indices, row-major.
    pub fn long_format(&self) -> Vec<GridCell> {
        let n = self.len();
        let mut cells = Vec::with_capacity(n * n);
        for row in 0..n {
            for col in 0..n {
                cells.push(GridCell {
                    row,
                    col,
                    value: self.covariance[(row, col)],
                });
            }
        }
        cells
    }
}
