use ndarray::{ArrayView1, Zip};

use crate::params::NeuronModelParams;
use crate::types::ColVec;

/// One neuron's continuous state. The kinetics variant is fixed at construction
/// and must match the model params the owning network passes into `integrate`.
#[derive(Debug, Clone)]
pub struct Neuron {
    pub voltage: f32,
    kinetics: Kinetics,
    pub output: f32,
    pub output_deriv: f32,
    /// Learned parameter; survives per-sample resets.
    pub bias: f32,
    pub bias_deriv: f32,
    /// Sensitivity of the voltage to each incoming weight.
    pub delta: ColVec,
    /// Sensitivity of the voltage to each downstream weight; non-empty iff
    /// this neuron is in the output layer.
    pub delta_t: ColVec,
    coupling_scalar: f32,
}

#[derive(Debug, Clone)]
enum Kinetics {
    FastSpiking { m: f32, n: f32, h: f32 },
    RelaxationOscillator { w: f32 },
    MultiChannelAdapting { n_k: f32, ca: f32 },
}

/// Semi-implicit trapezoidal update of a gating variable driven by an
/// alpha/beta rate pair.
fn gating_step(x: f32, alpha: f32, beta: f32, dt: f32) -> f32 {
    (alpha * dt + (1.0 - dt / 2.0 * (alpha + beta)) * x) / (dt / 2.0 * (alpha + beta) + 1.0)
}

/// Implicit-midpoint voltage update for the linearized membrane equation
/// dV/dt = drive + E - G*V. Stable for stiff conductances.
fn implicit_voltage_step(v: f32, drive: f32, g: f32, e: f32, dt: f32) -> f32 {
    dt * (drive + e) / (1.0 + dt / 2.0 * g) + v * (1.0 - g * dt / 2.0) / (1.0 + dt / 2.0 * g)
}

/// Logistic output activation and its derivative with respect to voltage.
pub(crate) fn logistic_output(v: f32, threshold: f32, steepness: f32) -> (f32, f32) {
    let val = (-(v - threshold) / steepness).exp();
    let output = 1.0 / (1.0 + val);
    let deriv = val / (steepness * (val + 1.0) * (val + 1.0));
    (output, deriv)
}

// The m and n activation rates have removable singularities; the exact-value
// branches reproduce the reference limits.

pub(crate) fn fs_alpha_m(v: f32) -> f32 {
    if v == 25.0 {
        1.0
    } else {
        (25.0 - v) / (10.0 * (((25.0 - v) / 10.0).exp() - 1.0))
    }
}

pub(crate) fn fs_alpha_n(v: f32) -> f32 {
    if v == 10.0 {
        1.0
    } else {
        (10.0 - v) / (100.0 * (((10.0 - v) / 10.0).exp() - 1.0))
    }
}

pub(crate) fn mca_alpha_n(v: f32) -> f32 {
    if v == -34.0 {
        0.1
    } else {
        0.01 * (v + 34.0) / (1.0 - (-(v + 34.0) / 10.0).exp())
    }
}

impl Neuron {
    pub fn new(
        fan_in: usize,
        is_output: bool,
        coupling_scalar: f32,
        model: &NeuronModelParams,
    ) -> Self {
        let (voltage, kinetics) = match model {
            NeuronModelParams::FastSpiking(_) => (
                0.0,
                Kinetics::FastSpiking {
                    m: 0.0,
                    n: 0.0,
                    h: 1.0,
                },
            ),
            NeuronModelParams::RelaxationOscillator(_) => {
                (-52.14, Kinetics::RelaxationOscillator { w: 0.02 })
            }
            NeuronModelParams::MultiChannelAdapting(_) => {
                (0.0, Kinetics::MultiChannelAdapting { n_k: 0.0, ca: 0.1 })
            }
        };

        Self {
            voltage,
            kinetics,
            output: 0.0,
            output_deriv: 0.0,
            bias: 0.0,
            bias_deriv: 0.0,
            delta: ColVec::zeros(fan_in),
            delta_t: if is_output {
                ColVec::zeros(fan_in)
            } else {
                ColVec::zeros(0)
            },
            coupling_scalar,
        }
    }

    /// Copies everything except `bias` from `other`, so a per-sample reset
    /// never discards the learned bias.
    pub fn restore_from(&mut self, other: &Neuron) {
        self.voltage = other.voltage;
        self.kinetics = other.kinetics.clone();
        self.output = other.output;
        self.output_deriv = other.output_deriv;
        self.bias_deriv = other.bias_deriv;
        self.delta.assign(&other.delta);
        self.delta_t.assign(&other.delta_t);
        self.coupling_scalar = other.coupling_scalar;
    }

    /// Advances the neuron by one timestep and returns the output activation.
    ///
    /// - `weighted_input`: this neuron's entry of the layer's weighted input.
    /// - `upstream_outputs`: unweighted output of the previous layer, length
    ///   equal to fan-in.
    /// - `downstream_weight_row`: for output neurons, the row of the output
    ///   weight matrix feeding this neuron; drives the `delta_t` trace.
    /// - `training`: when set, the sensitivity traces are integrated as well.
    pub fn integrate(
        &mut self,
        weighted_input: f32,
        upstream_outputs: ArrayView1<f32>,
        downstream_weight_row: Option<ArrayView1<f32>>,
        training: bool,
        model: &NeuronModelParams,
        dt: f32,
        bias_enabled: bool,
    ) -> f32 {
        let scalar = self.coupling_scalar / self.delta.len() as f32;
        let bias_feed = if bias_enabled { self.bias } else { 0.0 };
        let drive = weighted_input * scalar + bias_feed;

        // Per-variant membrane update; yields the total conductance and the
        // capacitance-like divisor shared with the sensitivity ODEs.
        let (g, cap) = match (&mut self.kinetics, model) {
            (Kinetics::FastSpiking { m, n, h }, NeuronModelParams::FastSpiking(p)) => {
                let a_m = fs_alpha_m(self.voltage);
                let a_n = fs_alpha_n(self.voltage);
                let a_h = 0.07 * (-self.voltage / 20.0).exp();
                let b_m = 4.0 * (-self.voltage / 18.0).exp();
                let b_n = if p.beta_n_phase_2 {
                    0.125 * (-(self.voltage + 70.0) / 19.7).exp()
                } else {
                    0.125 * (-self.voltage / 80.0).exp()
                };
                let b_h = 1.0 / (((30.0 - self.voltage) / 10.0).exp() + 1.0);

                *m = gating_step(*m, a_m, b_m, dt);
                *n = gating_step(*n, a_n, b_n, dt);
                *h = gating_step(*h, a_h, b_h, dt);

                let g_na = p.g_na * *m * *m * *m * *h;
                let g_k = p.g_k * n.powi(4);
                let g = g_na + g_k + p.g_leak;
                let e = g_na * p.e_na + g_k * p.e_k + p.g_leak * p.e_leak;

                self.voltage = implicit_voltage_step(self.voltage, drive, g, e, dt);
                (g, 1.0)
            }
            (
                Kinetics::RelaxationOscillator { w },
                NeuronModelParams::RelaxationOscillator(p),
            ) => {
                let current = p.input_offset + drive;

                let m_ss = 1.0 / (1.0 + (-2.0 * (self.voltage - p.v_half_m) / p.v_slope_m).exp());
                let w_ss = 1.0 / (1.0 + (-2.0 * (self.voltage - p.v_half_w) / p.v_slope_w).exp());
                let tau_w = 1.0 / (p.phi * ((self.voltage - p.v_half_w) / (2.0 * p.v_slope_w)).cosh());

                let g = p.g_ca * m_ss + p.g_k * *w + p.g_leak;
                let e = p.g_ca * m_ss * p.e_ca + p.g_k * *w * p.e_k + p.g_leak * p.e_leak;

                // Plain Euler; the drive is constant within the step, so a
                // higher-order scheme would still be first order here.
                self.voltage += dt * (current - g * self.voltage + e) / p.capacitance;
                *w += dt * (w_ss - *w) / tau_w;
                (g, p.capacitance)
            }
            (
                Kinetics::MultiChannelAdapting { n_k, ca },
                NeuronModelParams::MultiChannelAdapting(p),
            ) => {
                let m_ca_inf = 1.0 / (1.0 + (-(self.voltage + 20.0) / 9.0).exp());
                let m_kca_inf = 1.0 / (1.0 + (p.k_d / *ca).powf(3.5));
                let m_nap_inf = 1.0 / (1.0 + (-(self.voltage + 55.7) / 7.7).exp());

                // Both n_k rates are scaled by 4 in this model.
                let a_n = 4.0 * mca_alpha_n(self.voltage);
                let b_n = 4.0 * 0.125 * (-(self.voltage + 44.0) / 25.0).exp();
                *n_k = gating_step(*n_k, a_n, b_n, dt);

                let i_ca = p.g_ca * m_ca_inf * m_ca_inf * (self.voltage - p.e_ca);
                *ca = (*ca * (1.0 - dt / 2.0 / p.tau_ca)
                    - dt / 2.0 * p.alpha_ca * 10.0 * p.membrane_area * i_ca)
                    / (1.0 + dt / 2.0 / p.tau_ca);

                let g_k = p.g_k * n_k.powi(4);
                let g_ca = p.g_ca * m_ca_inf * m_ca_inf;
                let g_kca = p.g_kca * m_kca_inf;
                let g_nap = p.g_nap * m_nap_inf * m_nap_inf * m_nap_inf;
                let g = g_k + g_ca + g_kca + g_nap + p.g_leak;
                let e = g_k * p.e_k
                    + g_ca * p.e_ca
                    + g_kca * p.e_k
                    + g_nap * p.e_na
                    + p.g_leak * p.e_leak;

                self.voltage = implicit_voltage_step(self.voltage, drive, g, e, dt);
                (g, 1.0)
            }
            _ => unreachable!("neuron kinetics do not match model params"),
        };

        let (output, output_deriv) = logistic_output(
            self.voltage,
            model.firing_threshold(),
            model.output_steepness(),
        );
        self.output = output;
        self.output_deriv = output_deriv;

        if training {
            // The sensitivity ODEs use explicit Euler on purpose; the implicit
            // scheme is unstable for them.
            let inv_cap = 1.0 / cap;
            Zip::from(&mut self.delta)
                .and(upstream_outputs)
                .for_each(|d, &t_up| {
                    *d += dt * (t_up * scalar - g * *d) * inv_cap;
                });

            self.bias_deriv += dt * (1.0 - g * self.bias_deriv) * inv_cap;

            if !self.delta_t.is_empty() {
                if let Some(weight_row) = downstream_weight_row {
                    Zip::from(&mut self.delta_t)
                        .and(weight_row)
                        .for_each(|d, &w| {
                            *d += dt * (w * scalar - g * *d) * inv_cap;
                        });
                }
            }
        }

        self.output
    }
}
