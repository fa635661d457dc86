//! Fixed-size linear algebra helpers for the attitude filter.
//!
//! Public API:
//!     pub fn invert_3x3(m: &Matrix3<f64>) -> Option<Matrix3<f64>>
//!     pub fn quat_derivative(q: &Quaternion<f64>, rates: &Vector3<f64>) -> Quaternion<f64>
//!     pub fn rmat_of_quat(q: &Quaternion<f64>) -> Matrix3<f64>
//!     pub fn eulers_of_rmat(dcm: &Matrix3<f64>) -> Vector3<f64>
//!
//! Everything here is a pure function over `nalgebra` value types. The filter is
//! sensitive to the exact arithmetic of these routines (order of operations, no
//! implicit renormalization), so they are deliberately explicit rather than deferring
//! to the generic decompositions `nalgebra` ships for dynamic matrices.

use nalgebra::{Matrix3, Quaternion, Vector3};

/// Closed-form 3x3 matrix inversion by cofactor expansion.
///
/// Returns `None` when the determinant is exactly zero. The filter uses this for the
/// innovation covariance S; a singular S means the correction for that cycle is
/// skipped, so no tolerance-based near-singularity handling is wanted here.
///
/// # Arguments
/// * `m` - the matrix to invert
///
/// # Returns
/// `Some(inverse)` or `None` if the determinant is exactly zero.
pub fn invert_3x3(m: &Matrix3<f64>) -> Option<Matrix3<f64>> {
    let det = m[(0, 0)] * (m[(1, 1)] * m[(2, 2)] - m[(1, 2)] * m[(2, 1)])
        - m[(0, 1)] * (m[(1, 0)] * m[(2, 2)] - m[(1, 2)] * m[(2, 0)])
        + m[(0, 2)] * (m[(1, 0)] * m[(2, 1)] - m[(1, 1)] * m[(2, 0)]);
    if det == 0.0 {
        return None;
    }
    let mut inv = Matrix3::zeros();
    inv[(0, 0)] = (m[(1, 1)] * m[(2, 2)] - m[(1, 2)] * m[(2, 1)]) / det;
    inv[(0, 1)] = (m[(0, 2)] * m[(2, 1)] - m[(0, 1)] * m[(2, 2)]) / det;
    inv[(0, 2)] = (m[(0, 1)] * m[(1, 2)] - m[(0, 2)] * m[(1, 1)]) / det;
    inv[(1, 0)] = (m[(1, 2)] * m[(2, 0)] - m[(1, 0)] * m[(2, 2)]) / det;
    inv[(1, 1)] = (m[(0, 0)] * m[(2, 2)] - m[(0, 2)] * m[(2, 0)]) / det;
    inv[(1, 2)] = (m[(0, 2)] * m[(1, 0)] - m[(0, 0)] * m[(1, 2)]) / det;
    inv[(2, 0)] = (m[(1, 0)] * m[(2, 1)] - m[(1, 1)] * m[(2, 0)]) / det;
    inv[(2, 1)] = (m[(0, 1)] * m[(2, 0)] - m[(0, 0)] * m[(2, 1)]) / det;
    inv[(2, 2)] = (m[(0, 0)] * m[(1, 1)] - m[(0, 1)] * m[(1, 0)]) / det;
    Some(inv)
}

/// Quaternion kinematic derivative $\dot{q} = \frac{1}{2} \Omega(\omega) q$.
///
/// $\Omega$ is the 4x4 skew-symmetric rate matrix
///
/// $$
/// \Omega = \begin{bmatrix}
/// 0 & -p & -q & -r \\\\
/// p & 0 & r & -q \\\\
/// q & -r & 0 & p \\\\
/// r & q & -p & 0
/// \end{bmatrix}
/// $$
///
/// No norm-correction term is applied; the caller integrates this first order and
/// accepts the resulting slow norm drift.
pub fn quat_derivative(q: &Quaternion<f64>, rates: &Vector3<f64>) -> Quaternion<f64> {
    let (p, qr, r) = (rates.x, rates.y, rates.z);
    Quaternion::new(
        0.5 * (-p * q.i - qr * q.j - r * q.k),
        0.5 * (p * q.w + r * q.j - qr * q.k),
        0.5 * (qr * q.w - r * q.i + p * q.k),
        0.5 * (r * q.w + qr * q.i - p * q.j),
    )
}

/// Navigation-to-body direction cosine matrix of a quaternion.
///
/// Standard unit-quaternion formula with no normalization division: if the quaternion
/// has drifted off unit norm the matrix scales with it, matching the strapdown
/// propagation's first-order behavior.
pub fn rmat_of_quat(q: &Quaternion<f64>) -> Matrix3<f64> {
    let qi2 = q.w * q.w;
    let qx2 = q.i * q.i;
    let qy2 = q.j * q.j;
    let qz2 = q.k * q.k;
    let qiqx = q.w * q.i;
    let qiqy = q.w * q.j;
    let qiqz = q.w * q.k;
    let qxqy = q.i * q.j;
    let qxqz = q.i * q.k;
    let qyqz = q.j * q.k;
    Matrix3::new(
        qi2 + qx2 - qy2 - qz2,
        2.0 * (qxqy + qiqz),
        2.0 * (qxqz - qiqy),
        2.0 * (qxqy - qiqz),
        qi2 - qx2 + qy2 - qz2,
        2.0 * (qyqz + qiqx),
        2.0 * (qxqz + qiqy),
        2.0 * (qyqz - qiqx),
        qi2 - qx2 - qy2 + qz2,
    )
}

/// Euler angles (roll, pitch, yaw in radians) of a navigation-to-body DCM.
///
/// Aerospace x-y-z sequence. Pitch degenerates at +/-90 degrees as usual; the filter
/// publishes these for downstream consumers and does not feed them back into the
/// estimate, so no gimbal-lock special casing is done.
pub fn eulers_of_rmat(dcm: &Matrix3<f64>) -> Vector3<f64> {
    let roll = dcm[(1, 2)].atan2(dcm[(2, 2)]);
    let pitch = (-dcm[(0, 2)]).asin();
    let yaw = dcm[(0, 1)].atan2(dcm[(0, 0)]);
    Vector3::new(roll, pitch, yaw)
}

/* =============================== Tests ==================================== */
