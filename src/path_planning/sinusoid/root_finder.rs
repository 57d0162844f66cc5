//! Levenberg-Marquardt root finder for two-parameter residuals
//!
//! Used by the shooting stage to find sinusoid amplitudes. The residual
//! returns `None` for candidates whose simulation diverged; such candidates
//! are never accepted as steps.

use nalgebra::{Matrix2, Vector2};
use tracing::debug;

/// Root finder configuration
#[derive(Debug, Clone)]
pub struct LevenbergMarquardtConfig {
    /// Maximum outer iterations
    pub max_iter: usize,
    /// Residual norm accepted as a root
    pub tolerance: f64,
    /// Relative step size below which the search is considered stalled
    pub step_tolerance: f64,
    /// Initial damping factor
    pub initial_lambda: f64,
    /// Damping factor above which the search gives up
    pub max_lambda: f64,
    /// Relative finite difference step for the Jacobian
    pub fd_step: f64,
}

impl Default for LevenbergMarquardtConfig {
    fn default() -> Self {
        Self {
            max_iter: 100,
            tolerance: 1e-9,
            step_tolerance: 1e-12,
            initial_lambda: 1e-3,
            max_lambda: 1e12,
            fd_step: 1e-7,
        }
    }
}

/// Result of a root search
#[derive(Debug, Clone)]
pub struct RootSolution {
    /// Final parameters
    pub x: Vector2<f64>,
    /// Residual at `x`
    pub residual: Vector2<f64>,
    /// Iterations spent
    pub iterations: usize,
    /// Whether `|residual| <= tolerance`
    pub success: bool,
    /// Why the search stopped
    pub message: String,
}

/// Levenberg-Marquardt solver for `F(x) = 0`, `F: R^2 -> R^2`
#[derive(Debug, Clone, Default)]
pub struct LevenbergMarquardt {
    config: LevenbergMarquardtConfig,
}

impl LevenbergMarquardt {
    pub fn new(config: LevenbergMarquardtConfig) -> Self {
        Self { config }
    }

    pub fn with_defaults() -> Self {
        Self::new(LevenbergMarquardtConfig::default())
    }

    pub fn config(&self) -> &LevenbergMarquardtConfig {
        &self.config
    }

    /// Forward-difference Jacobian, `None` if any perturbed residual diverges
    fn calc_jacobian<F>(&self, f: &F, x: &Vector2<f64>, fx: &Vector2<f64>) -> Option<Matrix2<f64>>
    where
        F: Fn(&Vector2<f64>) -> Option<Vector2<f64>>,
    {
        let mut jacobian = Matrix2::zeros();
        for i in 0..2 {
            let h = self.config.fd_step * x[i].abs().max(1.0);
            let mut x_plus = *x;
            x_plus[i] += h;
            let f_plus = f(&x_plus)?;

            // dF/dx_i = (F(x + h) - F(x)) / h
            for j in 0..2 {
                jacobian[(j, i)] = (f_plus[j] - fx[j]) / h;
            }
        }
        Some(jacobian)
    }

    fn finish(&self, x: Vector2<f64>, residual: Vector2<f64>, iterations: usize, message: &str) -> RootSolution {
        debug!(
            iterations = iterations,
            residual = residual.norm(),
            "Root search stopped: {}",
            message
        );
        RootSolution {
            x,
            residual,
            iterations,
            success: residual.norm() <= self.config.tolerance,
            message: message.to_string(),
        }
    }

    /// Search for a root of `f` starting at `x0`
    ///
    /// # Returns
    /// The solution record; `success` is false when no root was reached.
    pub fn solve<F>(&self, f: F, x0: Vector2<f64>) -> RootSolution
    where
        F: Fn(&Vector2<f64>) -> Option<Vector2<f64>>,
    {
        let mut x = x0;
        let mut fx = match f(&x) {
            Some(r) => r,
            None => {
                return RootSolution {
                    x,
                    residual: Vector2::repeat(f64::INFINITY),
                    iterations: 0,
                    success: false,
                    message: "simulation diverged at the initial guess".to_string(),
                }
            }
        };
        let mut cost = fx.norm_squared();
        let mut lambda = self.config.initial_lambda;

        for iter in 0..self.config.max_iter {
            if fx.norm() <= self.config.tolerance {
                return self.finish(x, fx, iter, "residual within tolerance");
            }

            let jacobian = match self.calc_jacobian(&f, &x, &fx) {
                Some(j) => j,
                None => return self.finish(x, fx, iter, "simulation diverged while probing the Jacobian"),
            };
            let jt = jacobian.transpose();
            let jtj = jt * jacobian;
            let gradient = jt * fx;
            if gradient.norm() < f64::EPSILON * cost.sqrt().max(1.0) {
                return self.finish(x, fx, iter, "gradient vanished away from a root");
            }

            // Isotropic damping; rank-one residuals have a flat direction
            let scale = Matrix2::identity() * jtj.diagonal().max().max(1e-12);

            loop {
                let damped = jtj + scale * lambda;
                let step = match damped.try_inverse() {
                    Some(inv) => -(inv * gradient),
                    None => {
                        lambda *= 10.0;
                        if lambda > self.config.max_lambda {
                            return self.finish(x, fx, iter, "damped system is singular");
                        }
                        continue;
                    }
                };

                let candidate = x + step;
                match f(&candidate) {
                    Some(f_new) if f_new.norm_squared() < cost => {
                        let small_step = step.norm() <= self.config.step_tolerance * (x.norm() + self.config.step_tolerance);
                        x = candidate;
                        fx = f_new;
                        cost = fx.norm_squared();
                        lambda = (lambda / 10.0).max(1e-10);
                        if small_step && fx.norm() > self.config.tolerance {
                            return self.finish(x, fx, iter + 1, "step size below tolerance");
                        }
                        break;
                    }
                    _ => {
                        lambda *= 10.0;
                        if lambda > self.config.max_lambda {
                            return self.finish(x, fx, iter, "no descent direction reduces the residual");
                        }
                    }
                }
            }
        }

        if fx.norm() <= self.config.tolerance {
            self.finish(x, fx, self.config.max_iter, "residual within tolerance")
        } else {
            self.finish(x, fx, self.config.max_iter, "maximum number of iterations reached")
        }
    }
}
