use ndarray::{Array, Dimension};
use serde::Serialize;
use simple_error::SimpleError;

use crate::gradient::GradientAccumulator;
use crate::network::LayeredNetwork;
use crate::params::{validate_training_params, TrainingParams};
use crate::sampler::{SampleLoadError, Sampler, SpikeTrainSource};
use crate::types::{ColVec, Mat};
use crate::util::argmax;

#[derive(Debug, Clone, Serialize)]
pub struct SampleRecord {
    pub cost: f32,
    pub predicted_label: usize,
    pub true_label: usize,
}

/// Per-batch training outcome, in execution order. Carries the output biases
/// as they stood after the batch's update, giving a per-batch bias history.
#[derive(Debug, Clone, Serialize)]
pub struct BatchRecord {
    pub batch: usize,
    pub avg_cost: f32,
    pub num_correct: usize,
    pub samples: Vec<SampleRecord>,
    pub output_biases: Vec<f32>,
}

#[derive(Debug, Clone, Serialize)]
pub struct EvaluationReport {
    pub num_samples: usize,
    pub num_correct: usize,
    pub hit_rate_percent: f32,
    /// Hit rate after each evaluated sample.
    pub running_hit_rate_percent: Vec<f32>,
}

/// Classic momentum update: decay the velocity, add the scaled gradient. The
/// caller then subtracts the velocity from the parameters.
pub(crate) fn momentum_step<D: Dimension>(
    velocity: &mut Array<f32, D>,
    gradient: &Array<f32, D>,
    learning_rate: f32,
    momentum_factor: f32,
) {
    velocity.mapv_inplace(|v| v * momentum_factor);
    velocity.scaled_add(learning_rate, gradient);
}

/// Mini-batch gradient descent with momentum over a sample stream.
pub struct MiniBatchTrainer {
    network: LayeredNetwork,
    accumulator: GradientAccumulator,
    params: TrainingParams,

    w1_velocity: Mat,
    w2_velocity: Mat,
    b2_velocity: ColVec,

    desired: ColVec,
}

impl MiniBatchTrainer {
    pub fn new(network: LayeredNetwork, params: TrainingParams) -> Result<Self, SimpleError> {
        validate_training_params(&params)?;

        let accumulator =
            GradientAccumulator::new(network.num_in(), network.num_hidden(), network.num_out());
        let w1_velocity = Mat::zeros((network.num_hidden(), network.num_in()));
        let w2_velocity = Mat::zeros((network.num_out(), network.num_hidden()));
        let b2_velocity = ColVec::zeros(network.num_out());
        let desired = ColVec::zeros(network.num_out());

        Ok(Self {
            network,
            accumulator,
            params,
            w1_velocity,
            w2_velocity,
            b2_velocity,
            desired,
        })
    }

    /// Runs the configured number of batches. An exhausted sampler ends
    /// training cleanly with the records produced so far; a failing sample
    /// load aborts with the underlying error.
    pub fn train<S: SpikeTrainSource>(
        &mut self,
        sampler: &mut Sampler<S>,
    ) -> Result<Vec<BatchRecord>, SimpleError> {
        let mut records = Vec::with_capacity(self.params.num_batches);

        for batch in 0..self.params.num_batches {
            self.accumulator.begin_batch();
            let mut batch_cost = 0.0;
            let mut num_correct = 0;
            let mut samples = Vec::with_capacity(self.params.mini_batch_size);

            for sample in 0..self.params.mini_batch_size {
                self.accumulator.begin_sample();
                self.network.reset_to_initial_state();

                let load_result = if self.params.same_samples {
                    sampler.load_indexed(sample, self.network.input_mut(), &mut self.desired)
                } else {
                    sampler.load_next(self.network.input_mut(), &mut self.desired)
                };

                match load_result {
                    Ok(()) => {}
                    Err(SampleLoadError::Exhausted) => {
                        log::info!("sample source exhausted after {} full batches", batch);
                        return Ok(records);
                    }
                    Err(SampleLoadError::Failed(err)) => return Err(err),
                }

                self.network.forward(true, Some(&mut self.accumulator));

                let avg_output = self.network.output_average();
                let cost = self.params.loss.cost(avg_output, &self.desired);
                self.accumulator
                    .finish_sample(&self.params.loss, avg_output, &self.desired);

                let predicted_label = argmax(avg_output);
                let true_label = argmax(&self.desired);
                if predicted_label == true_label {
                    num_correct += 1;
                }
                batch_cost += cost;
                samples.push(SampleRecord {
                    cost,
                    predicted_label,
                    true_label,
                });

                log::debug!("batch {} sample {}: cost {}", batch, sample, cost);
            }

            self.accumulator
                .finalize(samples.len(), self.network.sim_steps());

            momentum_step(
                &mut self.w1_velocity,
                self.accumulator.dw1(),
                self.params.learning_rate,
                self.params.momentum_factor,
            );
            momentum_step(
                &mut self.w2_velocity,
                self.accumulator.dw2(),
                self.params.learning_rate,
                self.params.momentum_factor,
            );
            self.network.w1 -= &self.w1_velocity;
            self.network.w2 -= &self.w2_velocity;

            if self.network.bias_enabled() {
                momentum_step(
                    &mut self.b2_velocity,
                    self.accumulator.db2(),
                    self.params.learning_rate,
                    self.params.momentum_factor,
                );
                self.network.nudge_output_biases(&self.b2_velocity);
            }

            let avg_cost = batch_cost / samples.len() as f32;
            log::info!(
                "batch {}: avg cost {}, {}/{} correct",
                batch,
                avg_cost,
                num_correct,
                samples.len()
            );
            records.push(BatchRecord {
                batch,
                avg_cost,
                num_correct,
                samples,
                output_biases: self.network.output_biases(),
            });
        }

        Ok(records)
    }

    /// Gradient-free classification pass over up to `max_samples` samples.
    pub fn evaluate<S: SpikeTrainSource>(
        &mut self,
        sampler: &mut Sampler<S>,
        max_samples: usize,
    ) -> Result<EvaluationReport, SimpleError> {
        let mut num_samples = 0;
        let mut num_correct = 0;
        let mut running_hit_rate_percent = Vec::new();

        while num_samples < max_samples {
            match sampler.load_next(self.network.input_mut(), &mut self.desired) {
                Ok(()) => {}
                Err(SampleLoadError::Exhausted) => break,
                Err(SampleLoadError::Failed(err)) => return Err(err),
            }

            self.network.reset_to_initial_state();
            self.network.forward(false, None);

            if argmax(self.network.output_average()) == argmax(&self.desired) {
                num_correct += 1;
            }
            num_samples += 1;
            running_hit_rate_percent.push(100.0 * num_correct as f32 / num_samples as f32);
        }

        let hit_rate_percent = if num_samples == 0 {
            0.0
        } else {
            100.0 * num_correct as f32 / num_samples as f32
        };
        log::info!(
            "evaluation: {}/{} correct ({}%)",
            num_correct,
            num_samples,
            hit_rate_percent
        );

        Ok(EvaluationReport {
            num_samples,
            num_correct,
            hit_rate_percent,
            running_hit_rate_percent,
        })
    }

    pub fn network(&self) -> &LayeredNetwork {
        &self.network
    }

    pub fn network_mut(&mut self) -> &mut LayeredNetwork {
        &mut self.network
    }
}
