use spikegrad::params::{NetworkParams, TrainingParams};

pub fn get_scenario_params() -> (NetworkParams, TrainingParams) {
    let network_yaml_str = r#"
num_in: 16
num_hidden: 8
num_out: 3
dt: 0.1
sim_time_ms: 30.0
model: !RelaxationOscillator
  g_ca: 4.0
  g_k: 8.0
  g_leak: 2.0
  e_ca: 120.0
  e_k: -84.0
  e_leak: -60.0
  threshold_voltage: 20.0
  output_steepness: 1.0
  v_half_m: -1.2
  v_slope_m: 18.0
  v_half_w: 12.0
  v_slope_w: 17.4
  phi: 0.0666667
  capacitance: 20.0
  input_offset: 40.5
hidden_layer:
  coupling_scalar: 100.0
  lateral_exponent: 0.5
output_layer:
  coupling_scalar: 100.0
  lateral_exponent: 0.5
bias_enabled: false
settle_to_steady_state: true
seed_override: 0
"#;

    let training_yaml_str = r#"
learning_rate: 1.0
momentum_factor: 0.9
mini_batch_size: 4
num_batches: 50
loss: CrossEntropy
same_samples: false
"#;

    (
        serde_yaml::from_str(network_yaml_str).unwrap(),
        serde_yaml::from_str(training_yaml_str).unwrap(),
    )
}
