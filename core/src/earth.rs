//! Earth-related constants and functions
//!
//! This module contains the Earth quantities the filter needs: the gravity vector used to
//! compensate specific force, the Earth rotation vector used in the orientation-error
//! dynamics, and the skew-symmetric ("hat") and inverse ("vee") operators that the
//! small-angle linearisation is written in terms of.
//!
//! The navigation frame is a local-level frame with the vertical axis up, so the gravity
//! vector is `(0, 0, g)` and an accelerometer at rest reports `+g` along its vertical axis.
//! The Earth rotation vector expressed in such a frame at latitude $\varphi$ is
//!
//! $$
//! \omega_{ie}^n = \begin{bmatrix} 0 \\\\ \omega_{ie} \cos\varphi \\\\ \omega_{ie} \sin\varphi \end{bmatrix}
//! $$
use nalgebra::{Matrix3, Vector3};

/// Earth's rotation rate rad/s ($\omega_{ie}$)
pub const RATE: f64 = 7.2921159e-5;
/// Earth's gravitational acceleration at the equator ($g_e$) in $m/s^2$
pub const GE: f64 = 9.7803253359;
/// Earth's gravitational acceleration at the poles ($g_p$) in $m/s^2$
pub const GP: f64 = 9.8321849378;
/// Earth's equitorial radius in meters
pub const EQUATORIAL_RADIUS: f64 = 6378137.0;
/// Earth's polar radius in meters
pub const POLAR_RADIUS: f64 = 6356752.31425;
/// Earth's eccentricity ($e$)
pub const ECCENTRICITY: f64 = 0.0818191908425;
/// Earth's eccentricity squared ($e^2$)
pub const ECCENTRICITY_SQUARED: f64 = ECCENTRICITY * ECCENTRICITY;
/// Somigliana's constant ($K$)
pub const K: f64 = (POLAR_RADIUS * GP - EQUATORIAL_RADIUS * GE) / (EQUATORIAL_RADIUS * GE);

/// Convert a three-element vector to a skew-symmetric matrix
///
/// This is the "hat" operator: `hat(a) * b == a.cross(&b)`.
///
/// $$
/// x = \begin{bmatrix} a \\\\ b \\\\ c \end{bmatrix} \rightarrow X = \begin{bmatrix} 0 & -c & b \\\\ c & 0 & -a \\\\ -b & a & 0 \end{bmatrix}
/// $$
///
/// # Example
/// ```rust
/// use nalgebra::{Vector3, Matrix3};
/// use lio_eskf::earth;
/// let v: Vector3<f64> = Vector3::new(1.0, 2.0, 3.0);
/// let skew: Matrix3<f64> = earth::vector_to_skew_symmetric(&v);
/// assert_eq!(skew * Vector3::x(), v.cross(&Vector3::x()));
/// ```
pub fn vector_to_skew_symmetric(v: &Vector3<f64>) -> Matrix3<f64> {
    Matrix3::new(
        0.0, -v[2], v[1], //
        v[2], 0.0, -v[0], //
        -v[1], v[0], 0.0,
    )
}
/// Convert a skew-symmetric matrix to a three-element vector
///
/// This is the "vee" operator and the inverse of [vector_to_skew_symmetric]. One entry of each
/// off-diagonal pair is read, so the input may also be the first-order rotation residual
/// `I - R_a * R_b^T` rather than an exactly skew-symmetric matrix.
///
/// # Example
/// ```rust
/// use lio_eskf::earth;
/// use nalgebra::Matrix3;
/// let skew: Matrix3<f64> = Matrix3::new(0.0, -3.0, 2.0, 3.0, 0.0, -1.0, -2.0, 1.0, 0.0);
/// let v = earth::skew_symmetric_to_vector(&skew);
/// assert_eq!(v, nalgebra::Vector3::new(1.0, 2.0, 3.0));
/// ```
pub fn skew_symmetric_to_vector(skew: &Matrix3<f64>) -> Vector3<f64> {
    Vector3::new(skew[(2, 1)], skew[(0, 2)], skew[(1, 0)])
}
/// Calculate the magnitude of gravity at a given latitude and altitude using the Somigliana
/// model.
///
/// # Parameters
/// - `latitude` - latitude in degrees
/// - `altitude` - altitude above the ellipsoid in meters
///
/// # Returns
/// Gravitational acceleration in $m/s^2$
pub fn gravity(latitude: &f64, altitude: &f64) -> f64 {
    let sin_lat: f64 = latitude.to_radians().sin();
    let g0: f64 = (GE * (1.0 + K * sin_lat * sin_lat))
        / (1.0 - ECCENTRICITY_SQUARED * sin_lat * sin_lat).sqrt();
    g0 - 3.08e-6 * altitude
}
/// Navigation-frame gravity vector for a given gravity magnitude (vertical axis up).
pub fn gravity_vector(gravity_magnitude: f64) -> Vector3<f64> {
    Vector3::new(0.0, 0.0, gravity_magnitude)
}
/// Earth rotation vector expressed in the local-level navigation frame.
///
/// # Parameters
/// - `rotation_speed` - Earth's rotation rate in rad/s (nominally [RATE])
/// - `latitude` - latitude in radians
pub fn rotation_vector(rotation_speed: f64, latitude: f64) -> Vector3<f64> {
    Vector3::new(
        0.0,
        rotation_speed * latitude.cos(),
        rotation_speed * latitude.sin(),
    )
}
