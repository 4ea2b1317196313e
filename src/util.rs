use itertools::Itertools;

/// Index of the largest element; ties resolve to the last occurrence. An empty
/// input maps to 0, callers guarantee at least one output neuron.
pub(crate) fn argmax<'a, I>(values: I) -> usize
where
    I: IntoIterator<Item = &'a f32>,
{
    values
        .into_iter()
        .position_max_by(|a, b| a.total_cmp(b))
        .unwrap_or(0)
}

#[cfg(test)]
pub mod test_util {
    use float_cmp::{assert_approx_eq, ApproxEq};
    use std::fmt::Debug;

    pub fn assert_approx_eq_slice<T>(left: &[T], right: &[T])
    where
        T: ApproxEq + Debug + Copy,
    {
        assert_eq!(left.len(), right.len());

        for item in left.iter().zip(right) {
            assert_approx_eq!(T, *item.0, *item.1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn argmax_picks_largest() {
        assert_eq!(argmax(&[0.1, 0.9, 0.3]), 1);
        assert_eq!(argmax(&[2.0, -1.0]), 0);
    }

    #[test]
    fn argmax_handles_degenerate_inputs() {
        let empty: [f32; 0] = [];
        assert_eq!(argmax(&empty), 0);
        assert_eq!(argmax(&[0.5]), 0);
        assert_eq!(argmax(&[f32::NEG_INFINITY, 0.0]), 1);
    }
}
