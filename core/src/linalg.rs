//! Linear algebra helpers for covariance maintenance and the Kalman gain.
//!
//! Public API:
//!     pub fn symmetrize(matrix) -> matrix
//!     pub fn conditioned_spd_solve(a, b, options) -> Result<x, LinalgError>
//!     pub fn renormalize_rotation(matrix) -> Rotation3
//!
//! Strategy for the gain solve:
//! 1) Reject non-finite input
//! 2) Symmetrize A ← 0.5 (A + Aᵀ)
//! 3) Symmetric eigenvalues: reject if λ_min ≤ floor or λ_max / λ_min > limit
//! 4) Cholesky solve A X = B
//!
//! The filter never forms S⁻¹ explicitly.

use nalgebra::linalg::Cholesky;
use nalgebra::{Matrix3, Matrix6, Rotation3, SMatrix, UnitQuaternion};

use crate::error::LinalgError;

/// Symmetrize a matrix: P ← 0.5 (P + Pᵀ)
///
/// Simple matrix symmetrization function that reduces round-off errors associated
/// with floating point arithmetic.
///
/// # Arguments
/// * `m` - the matrix to symmetrize
///
/// # Returns
/// A symmetrized version of the input matrix.
#[inline]
pub fn symmetrize<const N: usize>(m: &SMatrix<f64, N, N>) -> SMatrix<f64, N, N> {
    (m + m.transpose()) * 0.5
}

/// Guards applied before factorising an innovation covariance.
#[derive(Debug, Clone, Copy)]
pub struct ConditioningOptions {
    /// Largest accepted ratio λ_max / λ_min
    pub max_condition_number: f64, // e.g., 1e12
    /// Smallest accepted eigenvalue
    pub min_eigenvalue: f64, // e.g., 1e-15
}

impl Default for ConditioningOptions {
    fn default() -> Self {
        Self {
            max_condition_number: 1e12,
            min_eigenvalue: 1e-15,
        }
    }
}

/// Solve A X = B for a symmetric positive-definite 6×6 `A` via Cholesky, after checking that
/// `A` is finite and well-conditioned.
///
/// # Arguments
/// * `a` - the (nominally symmetric) system matrix, e.g. an innovation covariance
/// * `b` - right-hand side with any number of columns
/// * `opt` - conditioning limits
///
/// # Returns
/// The solution `X`, or the [LinalgError] describing why `A` was rejected.
pub fn conditioned_spd_solve<const C: usize>(
    a: &Matrix6<f64>,
    b: &SMatrix<f64, 6, C>,
    opt: ConditioningOptions,
) -> Result<SMatrix<f64, 6, C>, LinalgError> {
    if a.iter().chain(b.iter()).any(|v| !v.is_finite()) {
        return Err(LinalgError::NonFinite);
    }
    let a_sym = symmetrize(a);
    let eigenvalues = a_sym.symmetric_eigenvalues();
    let min_eigenvalue = eigenvalues.min();
    let max_eigenvalue = eigenvalues.max();
    if min_eigenvalue <= opt.min_eigenvalue {
        return Err(LinalgError::NotPositiveDefinite { min_eigenvalue });
    }
    let condition_number = max_eigenvalue / min_eigenvalue;
    if condition_number > opt.max_condition_number {
        return Err(LinalgError::IllConditioned {
            condition_number,
            limit: opt.max_condition_number,
        });
    }
    let cholesky = Cholesky::new(a_sym).ok_or(LinalgError::FactorizationFailed)?;
    Ok(cholesky.solve(b))
}

/// Project a nearly-orthonormal 3×3 matrix back onto SO(3).
///
/// The matrix is converted to a quaternion, the quaternion is normalized, and the result is
/// written back as a rotation matrix. Inputs that drift from orthonormality by accumulated
/// round-off or by a first-order correction `(I - [δθ×])ᵀ R` come back with `RᵀR = I` to
/// machine precision.
pub fn renormalize_rotation(m: &Matrix3<f64>) -> Rotation3<f64> {
    let q = UnitQuaternion::from_rotation_matrix(&Rotation3::from_matrix_unchecked(*m));
    UnitQuaternion::new_normalize(q.into_inner()).to_rotation_matrix()
}

/// Largest absolute deviation of `RᵀR` from the identity.
pub fn orthonormality_error(m: &Matrix3<f64>) -> f64 {
    (m.transpose() * m - Matrix3::identity()).amax()
}

/* =============================== Tests ==================================== */
