//! Numerical integration for the sinusoid planner
//!
//! - `integrate_euler`: fixed-step forward Euler for the shooting residual.
//!   The right-hand side reports divergence as a tagged value instead of
//!   letting infinities leak into the state.
//! - `adaptive_simpson`: scalar quadrature for the steering commutator integral.

use nalgebra::Vector4;

/// Result of evaluating an ODE right-hand side
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Derivative {
    /// Regular derivative
    Finite(Vector4<f64>),
    /// State left the region where the dynamics are defined
    Diverged,
}

/// Outcome of integrating an ODE over an interval
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Integration {
    /// Reached the end of the interval with this state
    Completed(Vector4<f64>),
    /// Right-hand side diverged at time `t`
    Diverged { t: f64 },
}

impl Integration {
    pub fn final_state(&self) -> Option<Vector4<f64>> {
        match self {
            Integration::Completed(y) => Some(*y),
            Integration::Diverged { .. } => None,
        }
    }
}

/// Integrate `y' = f(t, y)` with `n` forward Euler steps of size `h`
///
/// Step `k` evaluates `f` at `t0 + k * h`, the same sample times a planner
/// rollout uses, so a shooting residual built on this matches the emitted
/// trajectory exactly.
pub fn integrate_euler<F>(f: F, y0: Vector4<f64>, t0: f64, h: f64, n: usize) -> Integration
where
    F: Fn(f64, &Vector4<f64>) -> Derivative,
{
    let mut y = y0;
    for k in 0..n {
        let t = t0 + k as f64 * h;
        match f(t, &y) {
            Derivative::Finite(d) if d.iter().all(|v| v.is_finite()) => y += d * h,
            _ => return Integration::Diverged { t },
        }
        if !y.iter().all(|v| v.is_finite()) {
            return Integration::Diverged { t };
        }
    }

    Integration::Completed(y)
}

/// Integrate a scalar function over `[a, b]` with adaptive Simpson's rule
pub fn adaptive_simpson<F>(f: F, a: f64, b: f64, tolerance: f64, max_depth: usize) -> f64
where
    F: Fn(f64) -> f64,
{
    fn simpson(a: f64, b: f64, fa: f64, fm: f64, fb: f64) -> f64 {
        (b - a) / 6.0 * (fa + 4.0 * fm + fb)
    }

    #[allow(clippy::too_many_arguments)]
    fn adaptive_helper<F: Fn(f64) -> f64>(
        f: &F,
        a: f64,
        b: f64,
        fa: f64,
        fm: f64,
        fb: f64,
        whole: f64,
        tolerance: f64,
        depth: usize,
    ) -> f64 {
        let m = (a + b) / 2.0;
        let lm = (a + m) / 2.0;
        let rm = (m + b) / 2.0;
        let flm = f(lm);
        let frm = f(rm);
        let left = simpson(a, m, fa, flm, fm);
        let right = simpson(m, b, fm, frm, fb);
        let combined = left + right;

        if depth == 0 || (combined - whole).abs() < 15.0 * tolerance {
            combined + (combined - whole) / 15.0
        } else {
            let new_tol = tolerance / 2.0;
            adaptive_helper(f, a, m, fa, flm, fm, left, new_tol, depth - 1)
                + adaptive_helper(f, m, b, fm, frm, fb, right, new_tol, depth - 1)
        }
    }

    if a == b {
        return 0.0;
    }
    let m = (a + b) / 2.0;
    let (fa, fm, fb) = (f(a), f(m), f(b));
    let whole = simpson(a, b, fa, fm, fb);
    adaptive_helper(&f, a, b, fa, fm, fb, whole, tolerance, max_depth)
}
