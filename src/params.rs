use serde::{Deserialize, Serialize};
use simple_error::SimpleError;

use crate::loss::LossFunction;

/// Static description of a two-layer network: topology, integration step,
/// neuron physiology and per-layer tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkParams {
    pub num_in: usize,
    pub num_hidden: usize,
    pub num_out: usize,
    /// Integration timestep in ms.
    pub dt: f32,
    /// Length of the simulation window in ms.
    pub sim_time_ms: f32,
    pub model: NeuronModelParams,
    pub hidden_layer: LayerParams,
    pub output_layer: LayerParams,
    pub bias_enabled: bool,
    /// Run a zero-input settling pass at construction and capture the resulting
    /// state as the per-sample reset snapshot.
    pub settle_to_steady_state: bool,
    pub seed_override: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LayerParams {
    /// Input coupling strength; divided by the neuron's fan-in at use time.
    pub coupling_scalar: f32,
    /// Exponent of the lateral-normalization damping factor.
    pub lateral_exponent: f32,
}

/// Selects one of the three membrane model variants and carries its physiology.
/// The variant is fixed for the lifetime of a network.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum NeuronModelParams {
    FastSpiking(FastSpikingParams),
    RelaxationOscillator(RelaxationOscillatorParams),
    MultiChannelAdapting(MultiChannelAdaptingParams),
}

/// Two-gate fast-spiking model (Na/K/leak channels, m/n/h gates).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FastSpikingParams {
    pub g_na: f32,
    pub g_k: f32,
    pub g_leak: f32,
    pub e_na: f32,
    pub e_k: f32,
    pub e_leak: f32,
    pub threshold_voltage: f32,
    pub output_steepness: f32,
    /// Alternate beta_n kinetics shifted into the hyperpolarized regime.
    pub beta_n_phase_2: bool,
}

/// Two-variable relaxation-oscillator model (Ca/K/leak channels, recovery
/// variable w, explicit capacitance).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelaxationOscillatorParams {
    pub g_ca: f32,
    pub g_k: f32,
    pub g_leak: f32,
    pub e_ca: f32,
    pub e_k: f32,
    pub e_leak: f32,
    pub threshold_voltage: f32,
    pub output_steepness: f32,
    pub v_half_m: f32,
    pub v_slope_m: f32,
    pub v_half_w: f32,
    pub v_slope_w: f32,
    pub phi: f32,
    pub capacitance: f32,
    /// Constant drive placed at the model's bifurcation point so that synaptic
    /// input modulates firing rather than having to initiate it.
    pub input_offset: f32,
}

/// Multi-channel adapting model (K/Ca/KCa/NaP/leak channels, calcium-gated
/// adaptation).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MultiChannelAdaptingParams {
    pub g_k: f32,
    pub g_ca: f32,
    pub g_kca: f32,
    pub g_nap: f32,
    pub g_leak: f32,
    pub e_k: f32,
    pub e_na: f32,
    pub e_ca: f32,
    pub e_leak: f32,
    pub k_d: f32,
    pub alpha_ca: f32,
    pub tau_ca: f32,
    pub membrane_area: f32,
    pub threshold_voltage: f32,
    pub output_steepness: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingParams {
    pub learning_rate: f32,
    pub momentum_factor: f32,
    pub mini_batch_size: usize,
    pub num_batches: usize,
    pub loss: LossFunction,
    /// Reload the same fixed sample indices every batch instead of advancing
    /// the sampler order. Used to overfit a tiny set when debugging.
    pub same_samples: bool,
}

impl Default for NetworkParams {
    fn default() -> Self {
        Self {
            num_in: 1,
            num_hidden: 1,
            num_out: 1,
            dt: 0.03,
            sim_time_ms: 30.0,
            model: NeuronModelParams::FastSpiking(FastSpikingParams::default()),
            hidden_layer: LayerParams::default(),
            output_layer: LayerParams::default(),
            bias_enabled: false,
            settle_to_steady_state: true,
            seed_override: None,
        }
    }
}

impl Default for LayerParams {
    fn default() -> Self {
        Self {
            coupling_scalar: 100.0,
            lateral_exponent: 0.5,
        }
    }
}

impl Default for FastSpikingParams {
    fn default() -> Self {
        Self {
            g_na: 120.0,
            g_k: 36.0,
            g_leak: 0.3,
            e_na: 115.0,
            e_k: -12.0,
            e_leak: 10.613,
            threshold_voltage: 20.0,
            output_steepness: 3.0,
            beta_n_phase_2: false,
        }
    }
}

impl Default for RelaxationOscillatorParams {
    fn default() -> Self {
        Self {
            g_ca: 4.0,
            g_k: 8.0,
            g_leak: 2.0,
            e_ca: 120.0,
            e_k: -84.0,
            e_leak: -60.0,
            threshold_voltage: 20.0,
            output_steepness: 1.0,
            v_half_m: -1.2,
            v_slope_m: 18.0,
            v_half_w: 12.0,
            v_slope_w: 17.4,
            phi: 1.0 / 15.0,
            capacitance: 20.0,
            input_offset: 40.5,
        }
    }
}

impl Default for MultiChannelAdaptingParams {
    fn default() -> Self {
        Self {
            g_k: 19.20436,
            g_ca: 0.1624,
            g_kca: 0.7506,
            g_nap: 0.63314,
            g_leak: 0.016307,
            e_k: -100.0,
            e_na: 55.0,
            e_ca: 120.0,
            e_leak: -60.95,
            k_d: 30.0,
            alpha_ca: 0.5,
            tau_ca: 739.09,
            membrane_area: 0.02,
            threshold_voltage: -35.0,
            output_steepness: 3.6,
        }
    }
}

impl Default for TrainingParams {
    fn default() -> Self {
        Self {
            learning_rate: 100.0,
            momentum_factor: 0.9,
            mini_batch_size: 1,
            num_batches: 300,
            loss: LossFunction::CrossEntropy,
            same_samples: false,
        }
    }
}

impl NeuronModelParams {
    /// Voltage above which a neuron counts as firing, both as the output
    /// sigmoid midpoint and for lateral normalization.
    pub fn firing_threshold(&self) -> f32 {
        match self {
            NeuronModelParams::FastSpiking(p) => p.threshold_voltage,
            NeuronModelParams::RelaxationOscillator(p) => p.threshold_voltage,
            NeuronModelParams::MultiChannelAdapting(p) => p.threshold_voltage,
        }
    }

    pub fn output_steepness(&self) -> f32 {
        match self {
            NeuronModelParams::FastSpiking(p) => p.output_steepness,
            NeuronModelParams::RelaxationOscillator(p) => p.output_steepness,
            NeuronModelParams::MultiChannelAdapting(p) => p.output_steepness,
        }
    }
}

impl NetworkParams {
    pub fn sim_steps(&self) -> usize {
        (self.sim_time_ms / self.dt) as usize
    }
}

pub fn validate_network_params(params: &NetworkParams) -> Result<(), SimpleError> {
    if params.num_in == 0 {
        return Err(SimpleError::new("num_in must be strictly positive"));
    }

    if params.num_hidden == 0 {
        return Err(SimpleError::new("num_hidden must be strictly positive"));
    }

    if params.num_out == 0 {
        return Err(SimpleError::new("num_out must be strictly positive"));
    }

    if params.dt <= 0.0 {
        return Err(SimpleError::new("dt must be strictly positive"));
    }

    if params.sim_steps() == 0 {
        return Err(SimpleError::new(
            "sim_time_ms must cover at least one timestep",
        ));
    }

    validate_layer_params(&params.hidden_layer)?;
    validate_layer_params(&params.output_layer)?;
    validate_model_params(&params.model)?;

    Ok(())
}

fn validate_layer_params(layer_params: &LayerParams) -> Result<(), SimpleError> {
    if layer_params.coupling_scalar < 0.0 {
        return Err(SimpleError::new("coupling_scalar must not be negative"));
    }

    if layer_params.lateral_exponent < 0.0 {
        return Err(SimpleError::new("lateral_exponent must not be negative"));
    }

    Ok(())
}

fn validate_model_params(model_params: &NeuronModelParams) -> Result<(), SimpleError> {
    if model_params.output_steepness() <= 0.0 {
        return Err(SimpleError::new(
            "output_steepness must be strictly positive",
        ));
    }

    match model_params {
        NeuronModelParams::RelaxationOscillator(p) => {
            if p.capacitance <= 0.0 {
                return Err(SimpleError::new("capacitance must be strictly positive"));
            }
            if p.phi <= 0.0 {
                return Err(SimpleError::new("phi must be strictly positive"));
            }
            if p.v_slope_m <= 0.0 || p.v_slope_w <= 0.0 {
                return Err(SimpleError::new(
                    "activation slope parameters must be strictly positive",
                ));
            }
        }
        NeuronModelParams::MultiChannelAdapting(p) => {
            if p.tau_ca <= 0.0 {
                return Err(SimpleError::new("tau_ca must be strictly positive"));
            }
            if p.k_d <= 0.0 {
                return Err(SimpleError::new("k_d must be strictly positive"));
            }
        }
        NeuronModelParams::FastSpiking(_) => {}
    }

    Ok(())
}

pub fn validate_training_params(params: &TrainingParams) -> Result<(), SimpleError> {
    if params.learning_rate <= 0.0 {
        return Err(SimpleError::new("learning_rate must be strictly positive"));
    }

    if params.momentum_factor < 0.0 || params.momentum_factor >= 1.0 {
        return Err(SimpleError::new("momentum_factor must be in [0, 1)"));
    }

    if params.mini_batch_size == 0 {
        return Err(SimpleError::new(
            "mini_batch_size must be strictly positive",
        ));
    }

    if params.num_batches == 0 {
        return Err(SimpleError::new("num_batches must be strictly positive"));
    }

    if let LossFunction::Quadratic { true_class_weight } = params.loss {
        if true_class_weight <= 0.0 {
            return Err(SimpleError::new(
                "true_class_weight must be strictly positive",
            ));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {

    use super::*;

    fn network_params() -> NetworkParams {
        NetworkParams {
            num_in: 4,
            num_hidden: 3,
            num_out: 2,
            ..NetworkParams::default()
        }
    }

    #[test]
    fn valid_params() {
        assert!(validate_network_params(&network_params()).is_ok());
        assert!(validate_training_params(&TrainingParams::default()).is_ok());
    }

    #[test]
    fn zero_num_in() {
        let mut params = network_params();
        params.num_in = 0;
        let result = validate_network_params(&params);

        assert!(result.is_err());
        assert_eq!(
            result.unwrap_err().as_str(),
            "num_in must be strictly positive"
        );
    }

    #[test]
    fn zero_dt() {
        let mut params = network_params();
        params.dt = 0.0;
        let result = validate_network_params(&params);

        assert!(result.is_err());
        assert_eq!(result.unwrap_err().as_str(), "dt must be strictly positive");
    }

    #[test]
    fn window_shorter_than_timestep() {
        let mut params = network_params();
        params.dt = 1.0;
        params.sim_time_ms = 0.5;
        let result = validate_network_params(&params);

        assert!(result.is_err());
        assert_eq!(
            result.unwrap_err().as_str(),
            "sim_time_ms must cover at least one timestep"
        );
    }

    #[test]
    fn negative_coupling_scalar() {
        let mut params = network_params();
        params.hidden_layer.coupling_scalar = -1.0;
        let result = validate_network_params(&params);

        assert!(result.is_err());
        assert_eq!(
            result.unwrap_err().as_str(),
            "coupling_scalar must not be negative"
        );
    }

    #[test]
    fn negative_lateral_exponent() {
        let mut params = network_params();
        params.output_layer.lateral_exponent = -0.5;
        let result = validate_network_params(&params);

        assert!(result.is_err());
        assert_eq!(
            result.unwrap_err().as_str(),
            "lateral_exponent must not be negative"
        );
    }

    #[test]
    fn zero_capacitance() {
        let mut params = network_params();
        params.model = NeuronModelParams::RelaxationOscillator(RelaxationOscillatorParams {
            capacitance: 0.0,
            ..RelaxationOscillatorParams::default()
        });
        let result = validate_network_params(&params);

        assert!(result.is_err());
        assert_eq!(
            result.unwrap_err().as_str(),
            "capacitance must be strictly positive"
        );
    }

    #[test]
    fn zero_tau_ca() {
        let mut params = network_params();
        params.model = NeuronModelParams::MultiChannelAdapting(MultiChannelAdaptingParams {
            tau_ca: 0.0,
            ..MultiChannelAdaptingParams::default()
        });
        let result = validate_network_params(&params);

        assert!(result.is_err());
        assert_eq!(
            result.unwrap_err().as_str(),
            "tau_ca must be strictly positive"
        );
    }

    #[test]
    fn zero_output_steepness() {
        let mut params = network_params();
        params.model = NeuronModelParams::FastSpiking(FastSpikingParams {
            output_steepness: 0.0,
            ..FastSpikingParams::default()
        });
        let result = validate_network_params(&params);

        assert!(result.is_err());
        assert_eq!(
            result.unwrap_err().as_str(),
            "output_steepness must be strictly positive"
        );
    }

    #[test]
    fn zero_learning_rate() {
        let mut params = TrainingParams::default();
        params.learning_rate = 0.0;
        let result = validate_training_params(&params);

        assert!(result.is_err());
        assert_eq!(
            result.unwrap_err().as_str(),
            "learning_rate must be strictly positive"
        );
    }

    #[test]
    fn momentum_factor_of_one() {
        let mut params = TrainingParams::default();
        params.momentum_factor = 1.0;
        let result = validate_training_params(&params);

        assert!(result.is_err());
        assert_eq!(
            result.unwrap_err().as_str(),
            "momentum_factor must be in [0, 1)"
        );
    }

    #[test]
    fn zero_mini_batch_size() {
        let mut params = TrainingParams::default();
        params.mini_batch_size = 0;
        let result = validate_training_params(&params);

        assert!(result.is_err());
        assert_eq!(
            result.unwrap_err().as_str(),
            "mini_batch_size must be strictly positive"
        );
    }

    #[test]
    fn zero_true_class_weight() {
        let mut params = TrainingParams::default();
        params.loss = LossFunction::Quadratic {
            true_class_weight: 0.0,
        };
        let result = validate_training_params(&params);

        assert!(result.is_err());
        assert_eq!(
            result.unwrap_err().as_str(),
            "true_class_weight must be strictly positive"
        );
    }

    #[test]
    fn yaml_round_trip() {
        let params = network_params();
        let yaml = serde_yaml::to_string(&params).unwrap();
        let restored: NetworkParams = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(restored.num_in, 4);
        assert_eq!(restored.sim_steps(), params.sim_steps());
    }
}
