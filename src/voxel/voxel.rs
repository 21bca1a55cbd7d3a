//! Voxel attribute payload stored in octree nodes

use bytemuck::{Pod, Zeroable};

use crate::core::types::{Vec2, Vec3, Vec4};

/// Voxel flags
pub mod flags {
    /// Set on every voxel that holds geometry
    pub const SOLID: u8 = 1 << 0;
    /// Material emits light
    pub const EMISSIVE: u8 = 1 << 1;
}

/// Pack a linear color into RGBA8 (r in the low byte)
pub fn pack_rgba8(color: Vec4) -> u32 {
    let c = (color.clamp(Vec4::ZERO, Vec4::ONE) * 255.0).round();
    (c.x as u32) | (c.y as u32) << 8 | (c.z as u32) << 16 | (c.w as u32) << 24
}

pub fn unpack_rgba8(packed: u32) -> Vec4 {
    Vec4::new(
        (packed & 0xFF) as f32,
        ((packed >> 8) & 0xFF) as f32,
        ((packed >> 16) & 0xFF) as f32,
        (packed >> 24) as f32,
    ) / 255.0
}

/// Octahedral normal encoding, 8 bits per axis
pub fn encode_normal(n: Vec3) -> u16 {
    let l1 = n.x.abs() + n.y.abs() + n.z.abs();
    if l1 <= f32::EPSILON {
        return encode_normal(Vec3::Z);
    }
    let n = n / l1;
    let mut p = Vec2::new(n.x, n.y);
    if n.z < 0.0 {
        p = (Vec2::ONE - Vec2::new(p.y.abs(), p.x.abs())) * Vec2::new(1.0_f32.copysign(p.x), 1.0_f32.copysign(p.y));
    }
    let q = ((p * 0.5 + 0.5) * 255.0).round();
    (q.x as u16) | (q.y as u16) << 8
}

pub fn decode_normal(packed: u16) -> Vec3 {
    let p = Vec2::new((packed & 0xFF) as f32, (packed >> 8) as f32) / 255.0 * 2.0 - 1.0;
    let mut n = Vec3::new(p.x, p.y, 1.0 - p.x.abs() - p.y.abs());
    let t = (-n.z).max(0.0);
    n.x += if n.x >= 0.0 { -t } else { t };
    n.y += if n.y >= 0.0 { -t } else { t };
    n.normalize()
}

/// Attributes of one voxel - exactly 8 bytes
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct Voxel {
    /// Linear RGBA8 color
    pub color: u32,
    /// Octahedral-encoded surface normal
    pub normal: u16,
    /// Index into the scene material table
    pub material_id: u8,
    pub flags: u8,
}

impl Voxel {
    /// Empty/air voxel
    pub const EMPTY: Voxel = Voxel {
        color: 0,
        normal: 0,
        material_id: 0,
        flags: 0,
    };

    /// Solid voxel from a linear color, a normal and a material
    pub fn new(color: Vec3, normal: Vec3, material_id: u8) -> Self {
        Self {
            color: pack_rgba8(color.extend(1.0)),
            normal: encode_normal(normal),
            material_id,
            flags: flags::SOLID,
        }
    }

    pub fn with_emissive(mut self, emissive: bool) -> Self {
        if emissive {
            self.flags |= flags::EMISSIVE;
        } else {
            self.flags &= !flags::EMISSIVE;
        }
        self
    }

    pub fn color(&self) -> Vec3 {
        unpack_rgba8(self.color).truncate()
    }

    pub fn normal(&self) -> Vec3 {
        decode_normal(self.normal)
    }

    /// Check if voxel is empty (air)
    pub fn is_empty(&self) -> bool {
        self.flags & flags::SOLID == 0
    }

    pub fn is_emissive(&self) -> bool {
        self.flags & flags::EMISSIVE != 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_size() {
        assert_eq!(std::mem::size_of::<Voxel>(), 8);
    }

    #[test]
    fn test_normal_encoding_precision() {
        let normals = [
            Vec3::X, -Vec3::X, Vec3::Y, -Vec3::Y, Vec3::Z, -Vec3::Z,
            Vec3::new(1.0, 1.0, 1.0).normalize(),
            Vec3::new(-0.3, 0.2, -0.9).normalize(),
        ];
        for n in normals {
            let decoded = decode_normal(encode_normal(n));
            assert!(decoded.dot(n) > 0.995, "{:?} decoded as {:?}", n, decoded);
        }
    }

    #[test]
    fn test_color_packing() {
        let v = Voxel::new(Vec3::new(1.0, 0.5, 0.0), Vec3::Y, 3);
        let c = v.color();
        assert!((c.x - 1.0).abs() < 1e-6);
        assert!((c.y - 0.5).abs() < 0.01);
        assert_eq!(c.z, 0.0);
        assert_eq!(v.material_id, 3);
    }

    #[test]
    fn test_flags() {
        assert!(Voxel::EMPTY.is_empty());
        let v = Voxel::new(Vec3::ONE, Vec3::Y, 0);
        assert!(!v.is_empty());
        assert!(!v.is_emissive());
        assert!(v.with_emissive(true).is_emissive());
    }
}
