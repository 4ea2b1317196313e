use std::error::Error;
use std::fmt;

use rand::distributions::Distribution;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use simple_error::SimpleError;
use statrs::distribution::Exp;

use crate::types::{ColVec, Mat};

/// Desired-output amplitude of the true class. Kept well below saturation so
/// the output sigmoid still has usable slope at the target.
pub const DEFAULT_TARGET_AMPLITUDE: f32 = 0.4;

#[derive(Debug)]
pub enum SampleLoadError {
    /// The source has no sample at the requested index. Training treats this
    /// as a clean end of data, not a failure.
    Exhausted,
    Failed(SimpleError),
}

impl fmt::Display for SampleLoadError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            SampleLoadError::Exhausted => write!(f, "sample source exhausted"),
            SampleLoadError::Failed(err) => write!(f, "sample load failed: {}", err),
        }
    }
}

impl Error for SampleLoadError {}

/// Writes one sample's input spike trains and desired output directly into the
/// provided buffers. The buffers' shapes define the network's expectations;
/// a source that cannot fill them must fail rather than reshape.
pub trait SpikeTrainSource {
    fn load_sample(
        &mut self,
        idx: usize,
        input: &mut Mat,
        desired: &mut ColVec,
    ) -> Result<(), SampleLoadError>;
}

/// Iterates a source in a fixed or shuffled index order.
pub struct Sampler<S: SpikeTrainSource> {
    source: S,
    order: Vec<usize>,
    cursor: usize,
}

impl<S: SpikeTrainSource> Sampler<S> {
    pub fn with_identity_order(source: S, num_samples: usize) -> Self {
        Self {
            source,
            order: (0..num_samples).collect(),
            cursor: 0,
        }
    }

    /// Draws `num_samples` indices without replacement from `0..universe`.
    pub fn with_shuffled_order(
        source: S,
        num_samples: usize,
        universe: usize,
        rng: &mut StdRng,
    ) -> Self {
        let mut indices: Vec<usize> = (0..universe).collect();
        indices.shuffle(rng);
        indices.truncate(num_samples);
        Self {
            source,
            order: indices,
            cursor: 0,
        }
    }

    pub fn load_next(
        &mut self,
        input: &mut Mat,
        desired: &mut ColVec,
    ) -> Result<(), SampleLoadError> {
        if self.cursor >= self.order.len() {
            return Err(SampleLoadError::Exhausted);
        }
        let idx = self.order[self.cursor];
        self.source.load_sample(idx, input, desired)?;
        self.cursor += 1;
        Ok(())
    }

    /// Loads a sample by position in the order, without advancing the cursor.
    pub fn load_indexed(
        &mut self,
        position: usize,
        input: &mut Mat,
        desired: &mut ColVec,
    ) -> Result<(), SampleLoadError> {
        let idx = *self
            .order
            .get(position)
            .ok_or(SampleLoadError::Exhausted)?;
        self.source.load_sample(idx, input, desired)
    }

    pub fn reset(&mut self) {
        self.cursor = 0;
    }

    pub fn shuffle_order(&mut self, rng: &mut StdRng) {
        self.order.shuffle(rng);
        self.cursor = 0;
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

/// In-memory source holding fully materialized samples. Used by tests and
/// small demo scenarios.
pub struct FixedSetSource {
    samples: Vec<(Mat, ColVec)>,
}

impl FixedSetSource {
    pub fn new(samples: Vec<(Mat, ColVec)>) -> Self {
        Self { samples }
    }

    pub fn num_samples(&self) -> usize {
        self.samples.len()
    }
}

impl SpikeTrainSource for FixedSetSource {
    fn load_sample(
        &mut self,
        idx: usize,
        input: &mut Mat,
        desired: &mut ColVec,
    ) -> Result<(), SampleLoadError> {
        let (sample_input, sample_desired) =
            self.samples.get(idx).ok_or(SampleLoadError::Exhausted)?;

        if sample_input.dim() != input.dim() {
            return Err(SampleLoadError::Failed(SimpleError::new(format!(
                "sample {} input shape {:?} does not match network input shape {:?}",
                idx,
                sample_input.dim(),
                input.dim()
            ))));
        }
        if sample_desired.len() != desired.len() {
            return Err(SampleLoadError::Failed(SimpleError::new(format!(
                "sample {} has {} outputs, expected {}",
                idx,
                sample_desired.len(),
                desired.len()
            ))));
        }

        input.assign(sample_input);
        desired.assign(sample_desired);
        Ok(())
    }
}

/// Rate-codes grayscale intensity vectors as Poisson spike trains. Each
/// channel fires at a rate proportional to its intensity, rescaled so every
/// sample injects the same total number of firings into the window.
pub struct PoissonSource {
    intensities: Vec<Vec<u8>>,
    labels: Vec<usize>,
    /// Expected firings of a fully saturated channel over the window, before
    /// total-rate normalization.
    max_firings_per_channel: f32,
    /// Expected firings over all channels per sample after normalization.
    total_firings: f32,
    /// Number of consecutive timesteps one firing keeps the channel active.
    spike_len: usize,
    target_amplitude: f32,
    rng: StdRng,
}

impl PoissonSource {
    pub fn new(
        intensities: Vec<Vec<u8>>,
        labels: Vec<usize>,
        max_firings_per_channel: f32,
        total_firings: f32,
        spike_len: usize,
        seed: u64,
    ) -> Result<Self, SimpleError> {
        if intensities.len() != labels.len() {
            return Err(SimpleError::new(
                "intensities and labels must have the same length",
            ));
        }
        if max_firings_per_channel <= 0.0 || total_firings <= 0.0 {
            return Err(SimpleError::new(
                "firing counts must be strictly positive",
            ));
        }
        if spike_len == 0 {
            return Err(SimpleError::new("spike_len must be strictly positive"));
        }

        Ok(Self {
            intensities,
            labels,
            max_firings_per_channel,
            total_firings,
            spike_len,
            target_amplitude: DEFAULT_TARGET_AMPLITUDE,
            rng: StdRng::seed_from_u64(seed),
        })
    }

    pub fn num_samples(&self) -> usize {
        self.intensities.len()
    }
}

impl SpikeTrainSource for PoissonSource {
    fn load_sample(
        &mut self,
        idx: usize,
        input: &mut Mat,
        desired: &mut ColVec,
    ) -> Result<(), SampleLoadError> {
        let image = self
            .intensities
            .get(idx)
            .ok_or(SampleLoadError::Exhausted)?;

        if image.len() != input.nrows() {
            return Err(SampleLoadError::Failed(SimpleError::new(format!(
                "sample {} has {} channels, expected {}",
                idx,
                image.len(),
                input.nrows()
            ))));
        }
        let label = self.labels[idx];
        if label >= desired.len() {
            return Err(SampleLoadError::Failed(SimpleError::new(format!(
                "sample {} label {} out of range for {} outputs",
                idx,
                label,
                desired.len()
            ))));
        }

        let steps = input.ncols();
        // Per-step firing probability per channel, then rescaled so the whole
        // sample carries `total_firings` expected firings.
        let mut rates: Vec<f32> = image
            .iter()
            .map(|&px| (px as f32 + 1.0) / 256.0 * self.max_firings_per_channel / steps as f32)
            .collect();
        let rate_sum: f32 = rates.iter().sum();
        if rate_sum > 0.0 {
            let scale = self.total_firings / (steps as f32 * rate_sum);
            for rate in &mut rates {
                *rate *= scale;
            }
        }

        input.fill(0.0);
        for (channel, &rate) in rates.iter().enumerate() {
            if rate <= 0.0 {
                continue;
            }
            let inter_arrival = Exp::new(rate as f64).map_err(|err| {
                SampleLoadError::Failed(SimpleError::new(format!("invalid firing rate: {}", err)))
            })?;

            let mut t = inter_arrival.sample(&mut self.rng);
            while (t as usize) < steps {
                let start = t as usize;
                let end = (start + self.spike_len).min(steps);
                for bin in start..end {
                    input[(channel, bin)] = 1.0;
                }
                // The channel is occupied for the whole pulse; the next
                // arrival is drawn from the pulse's end.
                t = end as f64 + inter_arrival.sample(&mut self.rng);
            }
        }

        desired.fill(0.0);
        desired[label] = self.target_amplitude;
        Ok(())
    }
}

#[cfg(test)]
mod tests {

    use super::*;
    use ndarray::{arr1, arr2};

    fn two_fixed_samples() -> FixedSetSource {
        FixedSetSource::new(vec![
            (arr2(&[[1.0, 0.0], [0.0, 1.0]]), arr1(&[0.4, 0.0])),
            (arr2(&[[0.0, 1.0], [1.0, 0.0]]), arr1(&[0.0, 0.4])),
        ])
    }

    #[test]
    fn fixed_set_source_copies_sample_into_buffers() {
        let mut source = two_fixed_samples();
        let mut input = Mat::zeros((2, 2));
        let mut desired = ColVec::zeros(2);

        source.load_sample(1, &mut input, &mut desired).unwrap();

        assert_eq!(input, arr2(&[[0.0, 1.0], [1.0, 0.0]]));
        assert_eq!(desired, arr1(&[0.0, 0.4]));
    }

    #[test]
    fn fixed_set_source_exhausts_past_the_end() {
        let mut source = two_fixed_samples();
        let mut input = Mat::zeros((2, 2));
        let mut desired = ColVec::zeros(2);

        let result = source.load_sample(2, &mut input, &mut desired);
        assert!(matches!(result, Err(SampleLoadError::Exhausted)));
    }

    #[test]
    fn fixed_set_source_rejects_shape_mismatch() {
        let mut source = two_fixed_samples();
        let mut input = Mat::zeros((3, 2));
        let mut desired = ColVec::zeros(2);

        let result = source.load_sample(0, &mut input, &mut desired);
        assert!(matches!(result, Err(SampleLoadError::Failed(_))));
    }

    #[test]
    fn sampler_walks_identity_order_and_resets() {
        let mut sampler = Sampler::with_identity_order(two_fixed_samples(), 2);
        let mut input = Mat::zeros((2, 2));
        let mut desired = ColVec::zeros(2);

        sampler.load_next(&mut input, &mut desired).unwrap();
        assert_eq!(desired, arr1(&[0.4, 0.0]));
        sampler.load_next(&mut input, &mut desired).unwrap();
        assert_eq!(desired, arr1(&[0.0, 0.4]));

        let result = sampler.load_next(&mut input, &mut desired);
        assert!(matches!(result, Err(SampleLoadError::Exhausted)));

        sampler.reset();
        sampler.load_next(&mut input, &mut desired).unwrap();
        assert_eq!(desired, arr1(&[0.4, 0.0]));
    }

    #[test]
    fn load_indexed_does_not_advance_the_cursor() {
        let mut sampler = Sampler::with_identity_order(two_fixed_samples(), 2);
        let mut input = Mat::zeros((2, 2));
        let mut desired = ColVec::zeros(2);

        sampler.load_indexed(1, &mut input, &mut desired).unwrap();
        assert_eq!(desired, arr1(&[0.0, 0.4]));

        sampler.load_next(&mut input, &mut desired).unwrap();
        assert_eq!(desired, arr1(&[0.4, 0.0]));
    }

    #[test]
    fn shuffled_order_is_a_permutation_subset() {
        let mut rng = StdRng::seed_from_u64(7);
        let sampler = Sampler::with_shuffled_order(two_fixed_samples(), 3, 10, &mut rng);

        assert_eq!(sampler.len(), 3);
        let mut seen = sampler.order.clone();
        seen.sort_unstable();
        seen.dedup();
        assert_eq!(seen.len(), 3);
        assert!(sampler.order.iter().all(|&idx| idx < 10));
    }

    #[test]
    fn poisson_source_is_deterministic_per_seed() {
        let intensities = vec![vec![200, 10, 128, 0]];
        let labels = vec![1];

        let mut a = PoissonSource::new(intensities.clone(), labels.clone(), 40.0, 60.0, 1, 3)
            .unwrap();
        let mut b = PoissonSource::new(intensities, labels, 40.0, 60.0, 1, 3).unwrap();

        let mut input_a = Mat::zeros((4, 100));
        let mut input_b = Mat::zeros((4, 100));
        let mut desired = ColVec::zeros(2);

        a.load_sample(0, &mut input_a, &mut desired).unwrap();
        b.load_sample(0, &mut input_b, &mut desired).unwrap();

        assert_eq!(input_a, input_b);
    }

    #[test]
    fn poisson_source_produces_binary_trains_and_asymmetric_target() {
        let mut source =
            PoissonSource::new(vec![vec![255, 0], vec![0, 255]], vec![0, 1], 40.0, 30.0, 2, 11)
                .unwrap();

        let mut input = Mat::zeros((2, 200));
        let mut desired = ColVec::zeros(2);
        source.load_sample(1, &mut input, &mut desired).unwrap();

        assert!(input.iter().all(|&x| x == 0.0 || x == 1.0));
        assert!(input.iter().any(|&x| x == 1.0));
        assert_eq!(desired, arr1(&[0.0, DEFAULT_TARGET_AMPLITUDE]));
    }

    #[test]
    fn poisson_pulses_never_retrigger_before_the_pulse_ends() {
        let mut source = PoissonSource::new(vec![vec![255]], vec![0], 60.0, 60.0, 3, 5).unwrap();

        let mut input = Mat::zeros((1, 90));
        let mut desired = ColVec::zeros(1);
        source.load_sample(0, &mut input, &mut desired).unwrap();

        // A new pulse can start no earlier than the previous pulse's end, so
        // every run of active bins that ends inside the window is a whole
        // number of pulses.
        let row: Vec<f32> = input.row(0).to_vec();
        let mut run = 0usize;
        let mut saw_run = false;
        for (i, &bin) in row.iter().enumerate() {
            if bin == 1.0 {
                run += 1;
                saw_run = true;
            } else {
                assert_eq!(run % 3, 0, "run ending at bin {} has length {}", i, run);
                run = 0;
            }
        }
        assert!(saw_run);
    }

    #[test]
    fn poisson_source_rejects_mismatched_labels() {
        let result = PoissonSource::new(vec![vec![1, 2]], vec![], 40.0, 60.0, 1, 0);
        assert!(result.is_err());
        assert_eq!(
            result.err().unwrap().as_str(),
            "intensities and labels must have the same length"
        );
    }
}
