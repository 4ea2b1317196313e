use crate::loss::LossFunction;
use crate::network::StepObserver;
use crate::neuron::Neuron;
use crate::types::{ColVec, Mat};

/// Accumulates weight and bias gradients over a mini batch from the
/// sensitivity traces the neurons carry during training passes.
///
/// The per-step terms are linear in the loss partials, but the partials are
/// only known once the sample's time-averaged output exists. The accumulator
/// therefore collects loss-independent increments while the simulation runs
/// and folds the partials in at the end of the sample.
pub struct GradientAccumulator {
    dw1: Mat,
    dw2: Mat,
    db2: ColVec,

    dw2_inc: Mat,
    db2_inc: ColVec,
    /// One hidden-weight increment matrix per output neuron, so the per-output
    /// loss partial can be applied separately in `finish_sample`.
    dw1_inc_parts: Vec<Mat>,
}

impl GradientAccumulator {
    pub fn new(num_in: usize, num_hidden: usize, num_out: usize) -> Self {
        Self {
            dw1: Mat::zeros((num_hidden, num_in)),
            dw2: Mat::zeros((num_out, num_hidden)),
            db2: ColVec::zeros(num_out),
            dw2_inc: Mat::zeros((num_out, num_hidden)),
            db2_inc: ColVec::zeros(num_out),
            dw1_inc_parts: (0..num_out)
                .map(|_| Mat::zeros((num_hidden, num_in)))
                .collect(),
        }
    }

    pub fn begin_batch(&mut self) {
        self.dw1.fill(0.0);
        self.dw2.fill(0.0);
        self.db2.fill(0.0);
    }

    pub fn begin_sample(&mut self) {
        self.dw2_inc.fill(0.0);
        self.db2_inc.fill(0.0);
        for part in &mut self.dw1_inc_parts {
            part.fill(0.0);
        }
    }

    /// Scales the collected increments by the loss partials of this sample's
    /// averaged output and merges them into the batch sums.
    pub fn finish_sample(&mut self, loss: &LossFunction, avg_output: &ColVec, desired: &ColVec) {
        for k in 0..self.db2_inc.len() {
            let partial = loss.partial(k, avg_output, desired);
            self.dw2
                .row_mut(k)
                .scaled_add(partial, &self.dw2_inc.row(k));
            self.db2[k] += partial * self.db2_inc[k];
            self.dw1.scaled_add(partial, &self.dw1_inc_parts[k]);
        }
    }

    /// Averages the batch sums in place. Weights average over the samples; the
    /// bias trace integrates a constant unit drive, so its sum additionally
    /// divides by the number of timesteps.
    pub fn finalize(&mut self, mini_batch_size: usize, sim_steps: usize) {
        let inv_samples = 1.0 / mini_batch_size as f32;
        self.dw1 *= inv_samples;
        self.dw2 *= inv_samples;
        self.db2 *= inv_samples / sim_steps as f32;
    }

    pub fn dw1(&self) -> &Mat {
        &self.dw1
    }

    pub fn dw2(&self) -> &Mat {
        &self.dw2
    }

    pub fn db2(&self) -> &ColVec {
        &self.db2
    }
}

impl StepObserver for GradientAccumulator {
    fn on_step(&mut self, hidden: &[Neuron], output: &[Neuron]) {
        for (k, out_neuron) in output.iter().enumerate() {
            let lhs = out_neuron.output_deriv;

            self.dw2_inc.row_mut(k).scaled_add(lhs, &out_neuron.delta);
            self.db2_inc[k] += lhs * out_neuron.bias_deriv;

            let part = &mut self.dw1_inc_parts[k];
            for (i, hidden_neuron) in hidden.iter().enumerate() {
                let chain = lhs * out_neuron.delta_t[i] * hidden_neuron.output_deriv;
                part.row_mut(i).scaled_add(chain, &hidden_neuron.delta);
            }
        }
    }
}
