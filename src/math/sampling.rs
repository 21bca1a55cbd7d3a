//! Hash-based random numbers and hemisphere sampling.
//!
//! Mirrors the functions in `shaders/common.wgsl` so the CPU and GPU path
//! tracers draw identical sample sequences for a given pixel and sample index.

use crate::core::types::Vec3;

/// PCG output hash
pub fn pcg_hash(v: u32) -> u32 {
    let state = v.wrapping_mul(747_796_405).wrapping_add(2_891_336_453);
    let word = ((state >> ((state >> 28) + 4)) ^ state).wrapping_mul(277_803_737);
    (word >> 22) ^ word
}

/// Per-pixel, per-sample random stream
#[derive(Clone, Copy, Debug)]
pub struct SampleRng {
    state: u32,
}

impl SampleRng {
    pub fn new(pixel_index: u32, sample_index: u32) -> Self {
        Self { state: pcg_hash(pixel_index ^ pcg_hash(sample_index.wrapping_add(0x9E37_79B9))) }
    }

    pub fn next_u32(&mut self) -> u32 {
        self.state = pcg_hash(self.state);
        self.state
    }

    /// Uniform float in [0, 1)
    pub fn next_f32(&mut self) -> f32 {
        (self.next_u32() >> 8) as f32 / 16_777_216.0
    }
}

/// Right-handed orthonormal basis around a unit normal (Duff et al. 2017)
pub fn orthonormal_basis(n: Vec3) -> (Vec3, Vec3) {
    let sign = 1.0_f32.copysign(n.z);
    let a = -1.0 / (sign + n.z);
    let b = n.x * n.y * a;
    (
        Vec3::new(1.0 + sign * n.x * n.x * a, sign * b, -sign * n.x),
        Vec3::new(b, sign + n.y * n.y * a, -n.y),
    )
}

/// Cosine-weighted direction in the hemisphere around `normal`
pub fn cosine_hemisphere(normal: Vec3, u1: f32, u2: f32) -> Vec3 {
    let r = u1.sqrt();
    let phi = std::f32::consts::TAU * u2;
    let (t, b) = orthonormal_basis(normal);
    (t * (r * phi.cos()) + b * (r * phi.sin()) + normal * (1.0 - u1).max(0.0).sqrt()).normalize()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rng_is_deterministic_and_in_range() {
        let mut a = SampleRng::new(42, 7);
        let mut b = SampleRng::new(42, 7);
        for _ in 0..1000 {
            let x = a.next_f32();
            assert_eq!(x, b.next_f32());
            assert!((0.0..1.0).contains(&x));
        }
        assert_ne!(SampleRng::new(42, 7).next_u32(), SampleRng::new(42, 8).next_u32());
    }

    #[test]
    fn test_basis_is_orthonormal() {
        for n in [Vec3::Z, -Vec3::Z, Vec3::X, Vec3::new(0.3, -0.5, 0.8).normalize()] {
            let (t, b) = orthonormal_basis(n);
            assert!(t.dot(n).abs() < 1e-5 && b.dot(n).abs() < 1e-5 && t.dot(b).abs() < 1e-5);
            assert!((t.length() - 1.0).abs() < 1e-5 && (b.length() - 1.0).abs() < 1e-5);
        }
    }

    #[test]
    fn test_cosine_samples_stay_in_hemisphere() {
        let normal = Vec3::new(0.0, 1.0, 0.0);
        let mut rng = SampleRng::new(1, 1);
        for _ in 0..500 {
            let d = cosine_hemisphere(normal, rng.next_f32(), rng.next_f32());
            assert!(d.dot(normal) >= -1e-5);
        }
    }
}
