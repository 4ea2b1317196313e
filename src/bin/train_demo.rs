use rand::distributions::{Distribution, Uniform};
use rand::{rngs::StdRng, SeedableRng};

use spikegrad::network::LayeredNetwork;
use spikegrad::sampler::{PoissonSource, Sampler};
use spikegrad::trainer::MiniBatchTrainer;

#[path = "../scenario_params.rs"]
mod scenario_params;

/// Each class lights up its own band of input channels; the rest stay dim.
fn synthetic_dataset(
    num_samples: usize,
    num_channels: usize,
    num_classes: usize,
    seed: u64,
) -> (Vec<Vec<u8>>, Vec<usize>) {
    let mut rng = StdRng::seed_from_u64(seed);
    let noise = Uniform::new_inclusive(0u8, 30u8);
    let band = num_channels / num_classes;

    let mut intensities = Vec::with_capacity(num_samples);
    let mut labels = Vec::with_capacity(num_samples);

    for i in 0..num_samples {
        let label = i % num_classes;
        let image: Vec<u8> = (0..num_channels)
            .map(|c| {
                let base = if c >= label * band && c < (label + 1) * band {
                    200
                } else {
                    10
                };
                base + noise.sample(&mut rng)
            })
            .collect();
        intensities.push(image);
        labels.push(label);
    }

    (intensities, labels)
}

fn main() {
    let (network_params, training_params) = scenario_params::get_scenario_params();

    let num_in = network_params.num_in;
    let num_out = network_params.num_out;
    let num_train = training_params.mini_batch_size * training_params.num_batches;
    let num_eval = 60;

    let (train_intensities, train_labels) = synthetic_dataset(num_train, num_in, num_out, 1);
    let train_source =
        PoissonSource::new(train_intensities, train_labels, 40.0, 60.0, 2, 1).unwrap();

    let mut rng = StdRng::seed_from_u64(0);
    let mut train_sampler = Sampler::with_shuffled_order(train_source, num_train, num_train, &mut rng);

    let network = LayeredNetwork::new(network_params).unwrap();
    let mut trainer = MiniBatchTrainer::new(network, training_params).unwrap();

    let records = trainer.train(&mut train_sampler).unwrap();
    if let (Some(first), Some(last)) = (records.first(), records.last()) {
        eprintln!(
            "Cost over {} batches: {:.4} -> {:.4}",
            records.len(),
            first.avg_cost,
            last.avg_cost
        );
    }

    let (eval_intensities, eval_labels) = synthetic_dataset(num_eval, num_in, num_out, 2);
    let eval_source = PoissonSource::new(eval_intensities, eval_labels, 40.0, 60.0, 2, 2).unwrap();
    let mut eval_sampler = Sampler::with_identity_order(eval_source, num_eval);

    let report = trainer.evaluate(&mut eval_sampler, num_eval).unwrap();
    eprintln!(
        "Hit rate: {:.1}% ({}/{})",
        report.hit_rate_percent, report.num_correct, report.num_samples
    );

    println!("{}", serde_json::to_string(&report).unwrap());
}
