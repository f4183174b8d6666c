//! Filter state containers
//!
//! The 15-element error state is one contiguous vector addressed through [ErrorBlock], so
//! that no code outside this module needs to know where a block starts. The nominal state and
//! the two-sample inertial window used by the trapezoidal integration live here as well.
use std::collections::VecDeque;

use nalgebra::{Matrix3, SMatrix, SVector, Vector3};

use crate::{InertialSample, Pose};

/// Dimension of the error state
pub const ERROR_STATE_DIM: usize = 15;
/// Dimension of the process noise (gyro, accel)
pub const PROCESS_NOISE_DIM: usize = 6;
/// Dimension of the relative-pose observation (position, orientation)
pub const MEASUREMENT_DIM: usize = 6;
/// Largest number of inertial samples held for integration
pub const WINDOW_SIZE: usize = 2;

pub type ErrorVector = SVector<f64, ERROR_STATE_DIM>;
pub type CovarianceMatrix = SMatrix<f64, ERROR_STATE_DIM, ERROR_STATE_DIM>;
pub type ProcessNoiseMatrix = SMatrix<f64, PROCESS_NOISE_DIM, PROCESS_NOISE_DIM>;
pub type MeasurementNoiseMatrix = SMatrix<f64, MEASUREMENT_DIM, MEASUREMENT_DIM>;
pub type MeasurementVector = SVector<f64, MEASUREMENT_DIM>;

/// The five 3-element blocks of the error state, in storage order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorBlock {
    /// Position error, navigation frame
    Position,
    /// Velocity error, navigation frame
    Velocity,
    /// Small-angle orientation error, navigation frame
    Orientation,
    /// Gyroscope bias, body frame
    GyroBias,
    /// Accelerometer bias, body frame
    AccelBias,
}
impl ErrorBlock {
    pub const ALL: [ErrorBlock; 5] = [
        ErrorBlock::Position,
        ErrorBlock::Velocity,
        ErrorBlock::Orientation,
        ErrorBlock::GyroBias,
        ErrorBlock::AccelBias,
    ];
    /// Blocks folded into the nominal state and zeroed after every correction
    pub const TRANSIENT: [ErrorBlock; 3] = [
        ErrorBlock::Position,
        ErrorBlock::Velocity,
        ErrorBlock::Orientation,
    ];
    /// Index of the first element of the block
    pub const fn offset(self) -> usize {
        match self {
            ErrorBlock::Position => 0,
            ErrorBlock::Velocity => 3,
            ErrorBlock::Orientation => 6,
            ErrorBlock::GyroBias => 9,
            ErrorBlock::AccelBias => 12,
        }
    }
}

/// Copy a 3×3 block into `m` at the given row and column offsets.
pub fn set_block3<const R: usize, const C: usize>(
    m: &mut SMatrix<f64, R, C>,
    row: usize,
    col: usize,
    block: &Matrix3<f64>,
) {
    m.fixed_view_mut::<3, 3>(row, col).copy_from(block);
}

/// Read the 3×3 block of `m` at the given row and column offsets.
pub fn block3<const R: usize, const C: usize>(
    m: &SMatrix<f64, R, C>,
    row: usize,
    col: usize,
) -> Matrix3<f64> {
    m.fixed_view::<3, 3>(row, col).into_owned()
}

/// The error state estimate δx.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ErrorState {
    vector: ErrorVector,
}
impl Default for ErrorState {
    fn default() -> Self {
        ErrorState::zeros()
    }
}
impl ErrorState {
    pub fn zeros() -> Self {
        ErrorState {
            vector: ErrorVector::zeros(),
        }
    }
    pub fn block(&self, block: ErrorBlock) -> Vector3<f64> {
        self.vector.fixed_rows::<3>(block.offset()).into_owned()
    }
    pub fn set_block(&mut self, block: ErrorBlock, value: &Vector3<f64>) {
        self.vector
            .fixed_rows_mut::<3>(block.offset())
            .copy_from(value);
    }
    /// Zero the position, velocity and orientation blocks. Bias blocks are kept.
    pub fn reset_transient(&mut self) {
        for block in ErrorBlock::TRANSIENT {
            self.set_block(block, &Vector3::zeros());
        }
    }
    pub fn as_vector(&self) -> &ErrorVector {
        &self.vector
    }
    pub fn as_vector_mut(&mut self) -> &mut ErrorVector {
        &mut self.vector
    }
}
impl From<ErrorVector> for ErrorState {
    fn from(vector: ErrorVector) -> Self {
        ErrorState { vector }
    }
}

/// Nominal (integrated) navigation state.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct NominalState {
    pub pose: Pose,
    /// Velocity in m/s, navigation frame
    pub velocity: Vector3<f64>,
}
impl NominalState {
    /// The nominal state with an error estimate removed: `p - δp`, `v - δv`,
    /// `(I - [φ×])ᵀ C`.
    ///
    /// The returned rotation is first-order accurate and not renormalized.
    pub fn corrected(&self, error: &ErrorState) -> NominalState {
        let orientation_correction = Matrix3::identity()
            - crate::earth::vector_to_skew_symmetric(&error.block(ErrorBlock::Orientation));
        let rotation = orientation_correction.transpose() * self.pose.rotation.matrix();
        NominalState {
            pose: Pose::new(
                nalgebra::Rotation3::from_matrix_unchecked(rotation),
                self.pose.translation - error.block(ErrorBlock::Position),
            ),
            velocity: self.velocity - error.block(ErrorBlock::Velocity),
        }
    }
}

/// Sliding window over the most recent inertial samples, oldest first.
#[derive(Clone, Debug, Default)]
pub struct InertialWindow {
    samples: VecDeque<InertialSample>,
}
impl InertialWindow {
    pub fn new() -> Self {
        InertialWindow {
            samples: VecDeque::with_capacity(WINDOW_SIZE),
        }
    }
    /// Clear the window and seed it with a single sample.
    pub fn reset(&mut self, sample: InertialSample) {
        self.samples.clear();
        self.samples.push_back(sample);
    }
    /// Append a sample, evicting the oldest one if the window is full.
    pub fn push(&mut self, sample: InertialSample) {
        if self.samples.len() == WINDOW_SIZE {
            self.samples.pop_front();
        }
        self.samples.push_back(sample);
    }
    pub fn pop_oldest(&mut self) -> Option<InertialSample> {
        self.samples.pop_front()
    }
    /// The (previous, current) pair, if two samples are held.
    pub fn pair(&self) -> Option<(&InertialSample, &InertialSample)> {
        match (self.samples.front(), self.samples.back()) {
            (Some(previous), Some(current)) if self.samples.len() == WINDOW_SIZE => {
                Some((previous, current))
            }
            _ => None,
        }
    }
    pub fn latest(&self) -> Option<&InertialSample> {
        self.samples.back()
    }
    pub fn len(&self) -> usize {
        self.samples.len()
    }
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    fn sample(time: f64) -> InertialSample {
        InertialSample::new(time, Vector3::zeros(), Vector3::zeros())
    }

    #[test]
    fn blocks_are_contiguous_and_disjoint() {
        let mut offsets: Vec<usize> = ErrorBlock::ALL.iter().map(|b| b.offset()).collect();
        offsets.sort();
        assert_eq!(offsets, vec![0, 3, 6, 9, 12]);
        assert_eq!(ErrorBlock::AccelBias.offset() + 3, ERROR_STATE_DIM);
    }

    #[test]
    fn error_state_block_access() {
        let mut x = ErrorState::zeros();
        x.set_block(ErrorBlock::Orientation, &Vector3::new(1.0, 2.0, 3.0));
        x.set_block(ErrorBlock::AccelBias, &Vector3::new(-1.0, -2.0, -3.0));
        assert_eq!(x.as_vector()[6], 1.0);
        assert_eq!(x.as_vector()[8], 3.0);
        assert_eq!(x.as_vector()[14], -3.0);
        assert_eq!(x.block(ErrorBlock::Orientation), Vector3::new(1.0, 2.0, 3.0));
    }

    #[test]
    fn reset_transient_keeps_biases() {
        let mut x = ErrorState::from(ErrorVector::from_fn(|i, _| i as f64 + 1.0));
        let gyro_bias = x.block(ErrorBlock::GyroBias);
        let accel_bias = x.block(ErrorBlock::AccelBias);
        x.reset_transient();
        for block in ErrorBlock::TRANSIENT {
            assert_eq!(x.block(block), Vector3::zeros());
        }
        assert_eq!(x.block(ErrorBlock::GyroBias), gyro_bias);
        assert_eq!(x.block(ErrorBlock::AccelBias), accel_bias);
    }

    #[test]
    fn matrix_block_helpers() {
        let mut m = CovarianceMatrix::zeros();
        let b = Matrix3::from_fn(|i, j| (3 * i + j) as f64);
        set_block3(
            &mut m,
            ErrorBlock::Velocity.offset(),
            ErrorBlock::GyroBias.offset(),
            &b,
        );
        assert_eq!(m[(3, 9)], 0.0);
        assert_eq!(m[(5, 11)], 8.0);
        assert_eq!(block3(&m, 3, 9), b);
    }

    #[test]
    fn corrected_nominal_state() {
        let nominal = NominalState {
            pose: Pose::new(nalgebra::Rotation3::identity(), Vector3::new(1.0, 1.0, 1.0)),
            velocity: Vector3::new(2.0, 0.0, 0.0),
        };
        let mut x = ErrorState::zeros();
        x.set_block(ErrorBlock::Position, &Vector3::new(0.5, 0.0, 0.0));
        x.set_block(ErrorBlock::Velocity, &Vector3::new(0.0, 0.1, 0.0));
        x.set_block(ErrorBlock::Orientation, &Vector3::new(0.0, 0.0, 1e-3));
        let corrected = nominal.corrected(&x);
        assert_eq!(corrected.pose.translation, Vector3::new(0.5, 1.0, 1.0));
        assert_eq!(corrected.velocity, Vector3::new(2.0, -0.1, 0.0));
        // (I - [φ×])ᵀ = I + [φ×] rotates by +φ about z
        assert_approx_eq!(corrected.pose.rotation.matrix()[(1, 0)], 1e-3, 1e-12);
    }

    #[test]
    fn window_slides() {
        let mut window = InertialWindow::new();
        assert!(window.pair().is_none());
        window.reset(sample(0.0));
        assert_eq!(window.len(), 1);
        assert!(window.pair().is_none());
        window.push(sample(0.1));
        let (previous, current) = window.pair().expect("two samples held");
        assert_eq!(previous.time, 0.0);
        assert_eq!(current.time, 0.1);
        window.push(sample(0.2));
        assert_eq!(window.len(), WINDOW_SIZE);
        assert_eq!(window.pop_oldest().map(|s| s.time), Some(0.1));
        assert_eq!(window.latest().map(|s| s.time), Some(0.2));
        window.reset(sample(1.0));
        assert_eq!(window.len(), 1);
        assert!(!window.is_empty());
    }
}
