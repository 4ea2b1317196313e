use ndarray::{Array1, Array2};

pub type Mat = Array2<f32>;

pub type ColVec = Array1<f32>;
