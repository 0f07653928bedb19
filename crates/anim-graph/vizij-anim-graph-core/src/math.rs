//! Minimal transform math for poses and root motion.
//! Quaternions are stored as `[x, y, z, w]`; scale is uniform.

use serde::{Deserialize, Serialize};

#[inline]
fn lerp_f(a: f32, b: f32, t: f32) -> f32 {
    a + (b - a) * t
}

fn lerp_array<const N: usize>(a: &[f32; N], b: &[f32; N], t: f32) -> [f32; N] {
    let mut out = [0.0f32; N];
    for i in 0..N {
        out[i] = lerp_f(a[i], b[i], t);
    }
    out
}

/// Normalize a quaternion represented as [x,y,z,w]
pub fn normalize_quat(q: [f32; 4]) -> [f32; 4] {
    let mag = (q[0] * q[0] + q[1] * q[1] + q[2] * q[2] + q[3] * q[3]).sqrt();
    if mag == 0.0 {
        [0.0, 0.0, 0.0, 1.0]
    } else {
        [q[0] / mag, q[1] / mag, q[2] / mag, q[3] / mag]
    }
}

/// Shortest-arc slerp between two quaternions.
pub fn slerp(q1: [f32; 4], q2: [f32; 4], t: f32) -> [f32; 4] {
    let qa = normalize_quat(q1);
    let mut qb = normalize_quat(q2);

    let mut dot = qa[0] * qb[0] + qa[1] * qb[1] + qa[2] * qb[2] + qa[3] * qb[3];
    if dot < 0.0 {
        qb = [-qb[0], -qb[1], -qb[2], -qb[3]];
        dot = -dot;
    }

    const DOT_THRESHOLD: f32 = 0.9995;
    if dot > DOT_THRESHOLD {
        return normalize_quat(lerp_array(&qa, &qb, t));
    }

    let theta_0 = dot.clamp(-1.0, 1.0).acos();
    let theta = theta_0 * t;
    let sin_theta_0 = theta_0.sin();
    let s0 = (theta_0 - theta).sin() / sin_theta_0;
    let s1 = theta.sin() / sin_theta_0;

    [
        s0 * qa[0] + s1 * qb[0],
        s0 * qa[1] + s1 * qb[1],
        s0 * qa[2] + s1 * qb[2],
        s0 * qa[3] + s1 * qb[3],
    ]
}

fn quat_mul(a: [f32; 4], b: [f32; 4]) -> [f32; 4] {
    [
        a[3] * b[0] + a[0] * b[3] + a[1] * b[2] - a[2] * b[1],
        a[3] * b[1] - a[0] * b[2] + a[1] * b[3] + a[2] * b[0],
        a[3] * b[2] + a[0] * b[1] - a[1] * b[0] + a[2] * b[3],
        a[3] * b[3] - a[0] * b[0] - a[1] * b[1] - a[2] * b[2],
    ]
}

fn quat_conjugate(q: [f32; 4]) -> [f32; 4] {
    [-q[0], -q[1], -q[2], q[3]]
}

fn cross(a: [f32; 3], b: [f32; 3]) -> [f32; 3] {
    [
        a[1] * b[2] - a[2] * b[1],
        a[2] * b[0] - a[0] * b[2],
        a[0] * b[1] - a[1] * b[0],
    ]
}

/// Rotate `v` by the unit quaternion `q`.
pub fn rotate_vector(q: [f32; 4], v: [f32; 3]) -> [f32; 3] {
    let u = [q[0], q[1], q[2]];
    let uv = cross(u, v);
    let uuv = cross(u, uv);
    [
        v[0] + 2.0 * (q[3] * uv[0] + uuv[0]),
        v[1] + 2.0 * (q[3] * uv[1] + uuv[1]),
        v[2] + 2.0 * (q[3] * uv[2] + uuv[2]),
    ]
}

/// Translation, rotation and uniform scale.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Transform {
    pub translation: [f32; 3],
    pub rotation: [f32; 4],
    pub scale: f32,
}

impl Default for Transform {
    fn default() -> Self {
        Transform::IDENTITY
    }
}

impl Transform {
    pub const IDENTITY: Transform = Transform {
        translation: [0.0, 0.0, 0.0],
        rotation: [0.0, 0.0, 0.0, 1.0],
        scale: 1.0,
    };

    pub fn new(translation: [f32; 3], rotation: [f32; 4], scale: f32) -> Self {
        Transform {
            translation,
            rotation: normalize_quat(rotation),
            scale,
        }
    }

    pub fn from_translation(translation: [f32; 3]) -> Self {
        Transform {
            translation,
            ..Transform::IDENTITY
        }
    }

    /// Apply this transform to a point.
    pub fn transform_point(&self, p: [f32; 3]) -> [f32; 3] {
        let scaled = [p[0] * self.scale, p[1] * self.scale, p[2] * self.scale];
        let r = rotate_vector(self.rotation, scaled);
        [
            r[0] + self.translation[0],
            r[1] + self.translation[1],
            r[2] + self.translation[2],
        ]
    }

    /// `self * child`: applies `child` first, then `self`.
    pub fn compose(&self, child: &Transform) -> Transform {
        let scaled = [
            child.translation[0] * self.scale,
            child.translation[1] * self.scale,
            child.translation[2] * self.scale,
        ];
        let t = rotate_vector(self.rotation, scaled);
        Transform {
            translation: [
                t[0] + self.translation[0],
                t[1] + self.translation[1],
                t[2] + self.translation[2],
            ],
            rotation: normalize_quat(quat_mul(self.rotation, child.rotation)),
            scale: self.scale * child.scale,
        }
    }

    /// Inverse transform. A zero scale collapses to a zero-scale inverse.
    pub fn inverse(&self) -> Transform {
        let inv_scale = if self.scale.abs() <= f32::EPSILON {
            0.0
        } else {
            1.0 / self.scale
        };
        let inv_rot = quat_conjugate(normalize_quat(self.rotation));
        let t = rotate_vector(inv_rot, self.translation);
        Transform {
            translation: [-t[0] * inv_scale, -t[1] * inv_scale, -t[2] * inv_scale],
            rotation: inv_rot,
            scale: inv_scale,
        }
    }

    /// Translation/scale lerp and rotation slerp.
    pub fn blend(a: &Transform, b: &Transform, t: f32) -> Transform {
        Transform {
            translation: lerp_array(&a.translation, &b.translation, t),
            rotation: slerp(a.rotation, b.rotation, t),
            scale: lerp_f(a.scale, b.scale, t),
        }
    }

    pub fn approx_eq(&self, other: &Transform, eps: f32) -> bool {
        let close = |a: f32, b: f32| (a - b).abs() <= eps;
        let same_rotation = {
            let dot: f32 = (0..4).map(|i| self.rotation[i] * other.rotation[i]).sum();
            dot.abs() >= 1.0 - eps
        };
        (0..3).all(|i| close(self.translation[i], other.translation[i]))
            && same_rotation
            && close(self.scale, other.scale)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quarter_turn_z() -> [f32; 4] {
        let half = std::f32::consts::FRAC_PI_4;
        [0.0, 0.0, half.sin(), half.cos()]
    }

    #[test]
    fn inverse_undoes_transform() {
        let xf = Transform::new([1.0, 2.0, 3.0], quarter_turn_z(), 2.0);
        let p = [0.5, -1.0, 4.0];
        let back = xf.inverse().transform_point(xf.transform_point(p));
        for i in 0..3 {
            assert!((back[i] - p[i]).abs() < 1e-4, "{back:?} vs {p:?}");
        }
        assert!(xf.compose(&xf.inverse()).approx_eq(&Transform::IDENTITY, 1e-4));
    }

    #[test]
    fn rotate_quarter_turn() {
        let v = rotate_vector(quarter_turn_z(), [1.0, 0.0, 0.0]);
        assert!((v[0]).abs() < 1e-5);
        assert!((v[1] - 1.0).abs() < 1e-5);
    }

    #[test]
    fn blend_midpoint() {
        let a = Transform::from_translation([0.0, 0.0, 0.0]);
        let b = Transform::new([2.0, 0.0, 0.0], quarter_turn_z(), 3.0);
        let mid = Transform::blend(&a, &b, 0.5);
        assert!((mid.translation[0] - 1.0).abs() < 1e-6);
        assert!((mid.scale - 2.0).abs() < 1e-6);
        let angle = 2.0 * mid.rotation[3].acos();
        assert!((angle - std::f32::consts::FRAC_PI_4).abs() < 1e-4);
    }

    #[test]
    fn zero_scale_inverse_is_finite() {
        let xf = Transform::new([1.0, 0.0, 0.0], [0.0, 0.0, 0.0, 1.0], 0.0);
        let inv = xf.inverse();
        assert!(inv.translation.iter().all(|v| v.is_finite()));
        assert_eq!(inv.scale, 0.0);
    }
}
