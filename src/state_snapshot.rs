use serde::{Deserialize, Serialize};

use crate::types::Mat;

/// Serializable copy of everything training changes: both weight matrices and
/// the per-neuron biases. Membrane state is deliberately absent; a restored
/// network re-settles from its construction-time snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkSnapshot {
    pub w1: Mat,
    pub w2: Mat,
    pub hidden_biases: Vec<f32>,
    pub output_biases: Vec<f32>,
}

#[cfg(test)]
mod tests {

    use super::*;
    use ndarray::arr2;

    #[test]
    fn json_round_trip() {
        let snapshot = NetworkSnapshot {
            w1: arr2(&[[0.25, -1.5], [0.0, 3.0]]),
            w2: arr2(&[[1.0, 2.0]]),
            hidden_biases: vec![0.1, -0.2],
            output_biases: vec![0.3],
        };

        let json = serde_json::to_string(&snapshot).unwrap();
        let restored: NetworkSnapshot = serde_json::from_str(&json).unwrap();

        assert_eq!(restored.w1, snapshot.w1);
        assert_eq!(restored.w2, snapshot.w2);
        assert_eq!(restored.hidden_biases, snapshot.hidden_biases);
        assert_eq!(restored.output_biases, snapshot.output_biases);
    }
}
