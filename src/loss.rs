use serde::{Deserialize, Serialize};

use crate::types::ColVec;

/// Desired-output entries above this value mark the true class. The target
/// encoding is asymmetric: the true class carries 0.4, all others 0.
const TRUE_CLASS_CUTOFF: f32 = 0.01;

/// Keeps activations away from 0 and 1 so the cross-entropy logs and partials
/// stay finite.
const ACTIVATION_CLAMP: f32 = 1e-7;

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub enum LossFunction {
    CrossEntropy,
    /// Squared error with the true-class term up-weighted to compensate class
    /// imbalance in the asymmetric target encoding.
    Quadratic { true_class_weight: f32 },
}

fn clamp_activation(x: f32) -> f32 {
    x.clamp(ACTIVATION_CLAMP, 1.0 - ACTIVATION_CLAMP)
}

impl LossFunction {
    pub fn cost(&self, avg_output: &ColVec, desired: &ColVec) -> f32 {
        match *self {
            LossFunction::CrossEntropy => {
                let mut cost = 0.0;
                for (&out, &des) in avg_output.iter().zip(desired) {
                    let out = clamp_activation(out);
                    if des > TRUE_CLASS_CUTOFF {
                        cost -= des * out.ln();
                    } else {
                        cost -= (1.0 - out).ln();
                    }
                }
                cost / avg_output.len() as f32
            }
            LossFunction::Quadratic { true_class_weight } => {
                let mut cost = 0.0;
                for (&out, &des) in avg_output.iter().zip(desired) {
                    let weight = if des > TRUE_CLASS_CUTOFF {
                        true_class_weight
                    } else {
                        1.0
                    };
                    cost += weight * (out - des) * (out - des);
                }
                0.5 * cost
            }
        }
    }

    /// Derivative of the cost with respect to the i-th time-averaged output.
    pub fn partial(&self, i: usize, avg_output: &ColVec, desired: &ColVec) -> f32 {
        match *self {
            LossFunction::CrossEntropy => {
                let n = avg_output.len() as f32;
                let out = clamp_activation(avg_output[i]);
                if desired[i] > TRUE_CLASS_CUTOFF {
                    -1.0 / (n * out)
                } else {
                    1.0 / (n * (1.0 - out))
                }
            }
            LossFunction::Quadratic { .. } => avg_output[i] - desired[i],
        }
    }
}

#[cfg(test)]
mod tests {

    use super::*;
    use float_cmp::assert_approx_eq;
    use ndarray::arr1;

    #[test]
    fn cross_entropy_cost() {
        let out = arr1(&[0.4, 0.1]);
        let desired = arr1(&[0.4, 0.0]);

        let cost = LossFunction::CrossEntropy.cost(&out, &desired);
        let expected = (-0.4 * 0.4f32.ln() - 0.9f32.ln()) / 2.0;
        assert_approx_eq!(f32, cost, expected, epsilon = 1e-6);
    }

    #[test]
    fn cross_entropy_partial_signs() {
        let out = arr1(&[0.3, 0.3]);
        let desired = arr1(&[0.4, 0.0]);
        let loss = LossFunction::CrossEntropy;

        // Pushing the true-class output up lowers the cost, all others raise it.
        assert!(loss.partial(0, &out, &desired) < 0.0);
        assert!(loss.partial(1, &out, &desired) > 0.0);

        assert_approx_eq!(f32, loss.partial(0, &out, &desired), -1.0 / (2.0 * 0.3));
        assert_approx_eq!(f32, loss.partial(1, &out, &desired), 1.0 / (2.0 * 0.7));
    }

    #[test]
    fn cross_entropy_is_finite_at_saturated_activations() {
        let out = arr1(&[0.0, 1.0]);
        let desired = arr1(&[0.4, 0.0]);
        let loss = LossFunction::CrossEntropy;

        assert!(loss.cost(&out, &desired).is_finite());
        assert!(loss.partial(0, &out, &desired).is_finite());
        assert!(loss.partial(1, &out, &desired).is_finite());

        // The clamp bounds the partial magnitude.
        assert!(loss.partial(1, &out, &desired) <= 1.0 / (2.0 * ACTIVATION_CLAMP));
    }

    #[test]
    fn quadratic_cost_weights_true_class() {
        let out = arr1(&[0.2, 0.1]);
        let desired = arr1(&[0.4, 0.0]);
        let loss = LossFunction::Quadratic {
            true_class_weight: 3.0,
        };

        let expected = 0.5 * (3.0 * 0.2 * 0.2 + 0.1 * 0.1);
        assert_approx_eq!(f32, loss.cost(&out, &desired), expected, epsilon = 1e-6);
    }

    #[test]
    fn quadratic_partial() {
        let out = arr1(&[0.2, 0.1]);
        let desired = arr1(&[0.4, 0.0]);
        let loss = LossFunction::Quadratic {
            true_class_weight: 1.0,
        };

        assert_approx_eq!(f32, loss.partial(0, &out, &desired), -0.2, epsilon = 1e-6);
        assert_approx_eq!(f32, loss.partial(1, &out, &desired), 0.1, epsilon = 1e-6);
    }
}
