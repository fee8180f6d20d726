//! Derivative-free minimization
//!
//! A bounded Nelder-Mead simplex search. Model parameters that have to stay
//! inside a box (e.g. autoregressive coefficients kept within the unit
//! interval) are clamped after every simplex move.

use crate::{MathError, Result};
use serde::{Deserialize, Serialize};

/// Settings for the simplex search
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NelderMeadConfig {
    /// Maximum number of iterations
    pub max_iter: usize,
    /// Relative spread of objective values at which the search stops
    pub tolerance: f64,
    /// Reflection coefficient
    pub alpha: f64,
    /// Expansion coefficient
    pub gamma: f64,
    /// Contraction coefficient
    pub rho: f64,
    /// Shrink coefficient
    pub sigma: f64,
    /// Relative size of the initial simplex
    pub initial_step: f64,
}

impl Default for NelderMeadConfig {
    fn default() -> Self {
        Self {
            max_iter: 2000,
            tolerance: 1e-8,
            alpha: 1.0,
            gamma: 2.0,
            rho: 0.5,
            sigma: 0.5,
            initial_step: 0.05,
        }
    }
}

/// Outcome of a simplex search
#[derive(Debug, Clone)]
pub struct Minimum {
    /// Best point found
    pub point: Vec<f64>,
    /// Objective value at `point`
    pub value: f64,
    /// Iterations used
    pub iterations: usize,
    /// Whether the tolerance was reached before `max_iter`
    pub converged: bool,
}

/// Minimize `objective` starting from `initial`.
///
/// `bounds`, when given, must hold one `(lower, upper)` pair per dimension.
pub fn nelder_mead<F>(
    objective: F,
    initial: &[f64],
    bounds: Option<&[(f64, f64)]>,
    config: &NelderMeadConfig,
) -> Result<Minimum>
where
    F: Fn(&[f64]) -> f64,
{
    let n = initial.len();
    if n == 0 {
        return Err(MathError::InvalidInput(
            "Cannot optimize over zero parameters".to_string(),
        ));
    }
    if let Some(b) = bounds {
        if b.len() != n {
            return Err(MathError::InvalidInput(format!(
                "Expected {} bounds, got {}",
                n,
                b.len()
            )));
        }
    }

    let clamp = |point: Vec<f64>| -> Vec<f64> {
        match bounds {
            None => point,
            Some(b) => point
                .into_iter()
                .zip(b.iter())
                .map(|(x, &(lo, hi))| x.clamp(lo, hi))
                .collect(),
        }
    };
    // NaN objectives sort last so they are always replaced first.
    let eval = |point: &[f64]| -> f64 {
        let value = objective(point);
        if value.is_nan() {
            f64::INFINITY
        } else {
            value
        }
    };

    let mut simplex: Vec<Vec<f64>> = Vec::with_capacity(n + 1);
    simplex.push(clamp(initial.to_vec()));
    for i in 0..n {
        let mut vertex = initial.to_vec();
        vertex[i] += if initial[i].abs() > 1e-10 {
            config.initial_step * initial[i].abs()
        } else {
            config.initial_step
        };
        simplex.push(clamp(vertex));
    }
    let mut values: Vec<f64> = simplex.iter().map(|v| eval(v)).collect();

    let mut iterations = 0;
    let mut converged = false;

    while iterations < config.max_iter {
        iterations += 1;

        let mut order: Vec<usize> = (0..=n).collect();
        order.sort_by(|&a, &b| values[a].total_cmp(&values[b]));
        let best = order[0];
        let worst = order[n];
        let second_worst = order[n - 1];

        let spread = (values[worst] - values[best]).abs();
        if spread <= config.tolerance * (values[best].abs() + config.tolerance) {
            converged = true;
            break;
        }

        let centroid = centroid_without(&simplex, worst);

        let reflected = clamp(towards(&centroid, &simplex[worst], -config.alpha));
        let reflected_value = eval(&reflected);

        if reflected_value < values[best] {
            let expanded = clamp(towards(&centroid, &reflected, config.gamma));
            let expanded_value = eval(&expanded);
            if expanded_value < reflected_value {
                simplex[worst] = expanded;
                values[worst] = expanded_value;
            } else {
                simplex[worst] = reflected;
                values[worst] = reflected_value;
            }
            continue;
        }

        if reflected_value < values[second_worst] {
            simplex[worst] = reflected;
            values[worst] = reflected_value;
            continue;
        }

        let (target, target_value) = if reflected_value < values[worst] {
            (&reflected, reflected_value)
        } else {
            (&simplex[worst], values[worst])
        };
        let contracted = clamp(towards(&centroid, target, config.rho));
        let contracted_value = eval(&contracted);
        if contracted_value < target_value {
            simplex[worst] = contracted;
            values[worst] = contracted_value;
            continue;
        }

        // Shrink everything towards the best vertex
        let anchor = simplex[best].clone();
        for i in 0..=n {
            if i == best {
                continue;
            }
            let shrunk = clamp(towards(&anchor, &simplex[i], config.sigma));
            values[i] = eval(&shrunk);
            simplex[i] = shrunk;
        }
    }

    let best = (0..=n)
        .min_by(|&a, &b| values[a].total_cmp(&values[b]))
        .unwrap_or(0);

    if !values[best].is_finite() {
        return Err(MathError::CalculationError(
            "Objective is not finite anywhere on the simplex".to_string(),
        ));
    }

    Ok(Minimum {
        point: simplex[best].clone(),
        value: values[best],
        iterations,
        converged,
    })
}

/// Mean of all vertices except `exclude`
fn centroid_without(simplex: &[Vec<f64>], exclude: usize) -> Vec<f64> {
    let dims = simplex[0].len();
    let count = (simplex.len() - 1) as f64;
    let mut centroid = vec![0.0; dims];

    for (i, vertex) in simplex.iter().enumerate() {
        if i == exclude {
            continue;
        }
        for (c, v) in centroid.iter_mut().zip(vertex) {
            *c += v;
        }
    }

    centroid.iter_mut().for_each(|c| *c /= count);
    centroid
}

/// `origin + factor * (point - origin)`
fn towards(origin: &[f64], point: &[f64], factor: f64) -> Vec<f64> {
    origin
        .iter()
        .zip(point)
        .map(|(o, p)| o + factor * (p - o))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_quadratic_minimum() {
        let result = nelder_mead(
            |x| (x[0] - 2.0).powi(2) + (x[1] + 1.0).powi(2) + 3.0,
            &[0.0, 0.0],
            None,
            &NelderMeadConfig::default(),
        )
        .unwrap();

        assert!(result.converged);
        assert_abs_diff_eq!(result.point[0], 2.0, epsilon = 1e-3);
        assert_abs_diff_eq!(result.point[1], -1.0, epsilon = 1e-3);
        assert_abs_diff_eq!(result.value, 3.0, epsilon = 1e-6);
    }

    #[test]
    fn test_bounds_are_respected() {
        // Unconstrained minimum at x = 5 lies outside the box
        let bounds = [(-0.99, 0.99)];
        let result = nelder_mead(
            |x| (x[0] - 5.0).powi(2),
            &[0.1],
            Some(&bounds),
            &NelderMeadConfig::default(),
        )
        .unwrap();

        assert!(result.point[0] <= 0.99);
        assert_abs_diff_eq!(result.point[0], 0.99, epsilon = 1e-3);
    }

    #[test]
    fn test_invalid_inputs() {
        let config = NelderMeadConfig::default();
        assert!(nelder_mead(|_| 0.0, &[], None, &config).is_err());
        assert!(nelder_mead(|x| x[0], &[0.0], Some(&[(0.0, 1.0), (0.0, 1.0)]), &config).is_err());
        assert!(nelder_mead(|_| f64::NAN, &[0.0], None, &config).is_err());
    }
}
