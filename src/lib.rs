pub mod gradient;
pub mod loss;
pub mod network;
pub mod neuron;
pub mod params;
pub mod sampler;
pub mod state_snapshot;
pub mod trainer;
pub mod types;

mod util;
