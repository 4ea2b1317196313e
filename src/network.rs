use rand::distributions::Distribution;
use rand::{rngs::StdRng, SeedableRng};
use simple_error::SimpleError;
use statrs::distribution::Normal;

use crate::neuron::Neuron;
use crate::params::{validate_network_params, NetworkParams};
use crate::state_snapshot::NetworkSnapshot;
use crate::types::{ColVec, Mat};

/// Initial weights are drawn from this Gaussian.
const INIT_WEIGHT_MEAN: f64 = 0.5;
const INIT_WEIGHT_STD: f64 = 0.17;

/// Per-timestep hook invoked after both layers have been integrated. The
/// gradient accumulator implements this; evaluation passes no observer.
pub trait StepObserver {
    fn on_step(&mut self, hidden: &[Neuron], output: &[Neuron]);
}

/// Two dense layers of neurons driven over a discrete simulation window.
pub struct LayeredNetwork {
    params: NetworkParams,
    sim_steps: usize,
    firing_threshold: f32,

    /// Input spike trains; rows are channels, columns are time bins.
    input: Mat,
    weighted_input: Mat,

    hidden: Vec<Neuron>,
    output_layer: Vec<Neuron>,
    hidden_init: Vec<Neuron>,
    output_init: Vec<Neuron>,

    pub(crate) w1: Mat,
    pub(crate) w2: Mat,

    hidden_out: ColVec,
    output_out: ColVec,
    avg_output: ColVec,
}

/// Soft competitive suppression: the more of the layer is already firing, the
/// more a quiescent neuron's voltage is damped before the next step.
pub(crate) fn damping_factor(layer_size: usize, fired: usize, exponent: f32) -> f32 {
    (((layer_size - fired) as f32) / layer_size as f32).powf(exponent)
}

fn damp_quiescent(neurons: &mut [Neuron], fired: usize, exponent: f32, threshold: f32) {
    let factor = damping_factor(neurons.len(), fired, exponent);
    for neuron in neurons.iter_mut() {
        if neuron.voltage <= threshold {
            neuron.voltage *= factor;
        }
    }
}

impl LayeredNetwork {
    pub fn new(params: NetworkParams) -> Result<Self, SimpleError> {
        validate_network_params(&params)?;

        let seed = params.seed_override.unwrap_or(0);
        let mut rng = StdRng::seed_from_u64(seed);
        let weight_dist = Normal::new(INIT_WEIGHT_MEAN, INIT_WEIGHT_STD)
            .map_err(|err| SimpleError::new(format!("invalid weight distribution: {}", err)))?;

        let sim_steps = params.sim_steps();
        let (num_in, num_hidden, num_out) = (params.num_in, params.num_hidden, params.num_out);

        let w1 = Mat::from_shape_fn((num_hidden, num_in), |_| {
            weight_dist.sample(&mut rng) as f32
        });
        let w2 = Mat::from_shape_fn((num_out, num_hidden), |_| {
            weight_dist.sample(&mut rng) as f32
        });

        let hidden: Vec<Neuron> = (0..num_hidden)
            .map(|_| {
                Neuron::new(
                    num_in,
                    false,
                    params.hidden_layer.coupling_scalar,
                    &params.model,
                )
            })
            .collect();

        let output_layer: Vec<Neuron> = (0..num_out)
            .map(|_| {
                Neuron::new(
                    num_hidden,
                    true,
                    params.output_layer.coupling_scalar,
                    &params.model,
                )
            })
            .collect();

        let firing_threshold = params.model.firing_threshold();
        let settle = params.settle_to_steady_state;

        let mut network = Self {
            params,
            sim_steps,
            firing_threshold,
            input: Mat::zeros((num_in, sim_steps)),
            weighted_input: Mat::zeros((num_hidden, sim_steps)),
            hidden,
            output_layer,
            hidden_init: Vec::new(),
            output_init: Vec::new(),
            w1,
            w2,
            hidden_out: ColVec::zeros(num_hidden),
            output_out: ColVec::zeros(num_out),
            avg_output: ColVec::zeros(num_out),
        };

        // Settling pass with zero input, gradient-free, so the captured
        // snapshot carries a realistic membrane state and zeroed traces.
        if settle {
            network.forward(false, None);
        }
        network.hidden_init = network.hidden.clone();
        network.output_init = network.output_layer.clone();

        Ok(network)
    }

    /// Simulates the full window. Per step: integrate the hidden layer, damp
    /// its quiescent neurons, integrate the output layer from the
    /// freshly produced hidden outputs, damp, accumulate the output average
    /// and finally hand the layer state to the observer.
    pub fn forward(&mut self, training: bool, mut observer: Option<&mut dyn StepObserver>) {
        self.avg_output.fill(0.0);
        self.weighted_input = self.w1.dot(&self.input);

        let dt = self.params.dt;
        let bias_enabled = self.params.bias_enabled;

        for t in 0..self.sim_steps {
            let mut fired = 0;
            for (i, neuron) in self.hidden.iter_mut().enumerate() {
                self.hidden_out[i] = neuron.integrate(
                    self.weighted_input[(i, t)],
                    self.input.column(t),
                    None,
                    training,
                    &self.params.model,
                    dt,
                    bias_enabled,
                );
                if neuron.voltage > self.firing_threshold {
                    fired += 1;
                }
            }
            damp_quiescent(
                &mut self.hidden,
                fired,
                self.params.hidden_layer.lateral_exponent,
                self.firing_threshold,
            );

            let output_weighted_input = self.w2.dot(&self.hidden_out);
            fired = 0;
            for (i, neuron) in self.output_layer.iter_mut().enumerate() {
                self.output_out[i] = neuron.integrate(
                    output_weighted_input[i],
                    self.hidden_out.view(),
                    Some(self.w2.row(i)),
                    training,
                    &self.params.model,
                    dt,
                    bias_enabled,
                );
                if neuron.voltage > self.firing_threshold {
                    fired += 1;
                }
            }
            damp_quiescent(
                &mut self.output_layer,
                fired,
                self.params.output_layer.lateral_exponent,
                self.firing_threshold,
            );

            self.avg_output += &self.output_out;

            if training {
                if let Some(obs) = observer.as_deref_mut() {
                    obs.on_step(&self.hidden, &self.output_layer);
                }
            }
        }

        self.avg_output /= self.sim_steps as f32;
    }

    /// Restores all neurons to the construction-time snapshot. Biases are
    /// learned parameters and survive the reset.
    pub fn reset_to_initial_state(&mut self) {
        for (neuron, init) in self.hidden.iter_mut().zip(&self.hidden_init) {
            neuron.restore_from(init);
        }
        for (neuron, init) in self.output_layer.iter_mut().zip(&self.output_init) {
            neuron.restore_from(init);
        }
    }

    /// Time-averaged output activation of the last forward pass; the network's
    /// effective prediction.
    pub fn output_average(&self) -> &ColVec {
        &self.avg_output
    }

    pub fn input_mut(&mut self) -> &mut Mat {
        &mut self.input
    }

    pub fn weights(&self) -> (&Mat, &Mat) {
        (&self.w1, &self.w2)
    }

    pub fn set_weights(&mut self, w1: Mat, w2: Mat) -> Result<(), SimpleError> {
        if w1.dim() != self.w1.dim() {
            return Err(SimpleError::new(format!(
                "hidden weight matrix must have shape {:?}",
                self.w1.dim()
            )));
        }
        if w2.dim() != self.w2.dim() {
            return Err(SimpleError::new(format!(
                "output weight matrix must have shape {:?}",
                self.w2.dim()
            )));
        }
        self.w1 = w1;
        self.w2 = w2;
        Ok(())
    }

    pub fn hidden_biases(&self) -> Vec<f32> {
        self.hidden.iter().map(|neuron| neuron.bias).collect()
    }

    pub fn output_biases(&self) -> Vec<f32> {
        self.output_layer.iter().map(|neuron| neuron.bias).collect()
    }

    pub(crate) fn nudge_output_biases(&mut self, step: &ColVec) {
        for (neuron, &s) in self.output_layer.iter_mut().zip(step) {
            neuron.bias -= s;
        }
    }

    #[cfg(test)]
    pub(crate) fn hidden_neurons(&self) -> &[Neuron] {
        &self.hidden
    }

    #[cfg(test)]
    pub(crate) fn output_neurons(&self) -> &[Neuron] {
        &self.output_layer
    }

    pub fn bias_enabled(&self) -> bool {
        self.params.bias_enabled
    }

    pub fn num_in(&self) -> usize {
        self.params.num_in
    }

    pub fn num_hidden(&self) -> usize {
        self.params.num_hidden
    }

    pub fn num_out(&self) -> usize {
        self.params.num_out
    }

    pub fn sim_steps(&self) -> usize {
        self.sim_steps
    }

    pub fn state_snapshot(&self) -> NetworkSnapshot {
        NetworkSnapshot {
            w1: self.w1.clone(),
            w2: self.w2.clone(),
            hidden_biases: self.hidden_biases(),
            output_biases: self.output_biases(),
        }
    }

    pub fn restore_snapshot(&mut self, snapshot: &NetworkSnapshot) -> Result<(), SimpleError> {
        self.set_weights(snapshot.w1.clone(), snapshot.w2.clone())?;

        if snapshot.hidden_biases.len() != self.hidden.len()
            || snapshot.output_biases.len() != self.output_layer.len()
        {
            return Err(SimpleError::new("bias vector length mismatch"));
        }

        for (neuron, &bias) in self.hidden.iter_mut().zip(&snapshot.hidden_biases) {
            neuron.bias = bias;
        }
        for (neuron, &bias) in self.output_layer.iter_mut().zip(&snapshot.output_biases) {
            neuron.bias = bias;
        }

        Ok(())
    }
}
