//! Survivor records: the per-instance data the draw stage consumes.

use bytemuck::{Pod, Zeroable};
use glam::{Quat, Vec3};
use sylvan_core::Instance;

/// Scale of the snorm16 orientation encoding.
const SNORM16_MAX: f32 = 32767.0;

/// One instance that passed culling.
///
/// Written only by the cull pass, read only by the draw stage. Bound as a
/// per-instance vertex buffer (see [`SurvivorRecord::desc`]) or a storage
/// buffer.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Pod, Zeroable)]
pub struct SurvivorRecord {
    /// World position.
    pub position: [f32; 3],
    /// Uniform scale.
    pub scale: f32,
    /// Unit quaternion (x, y, z, w) as snorm16.
    pub orientation: [i16; 4],
    /// Archetype id.
    pub archetype: u32,
    /// LOD blend factor in [0, 1] (0 = full detail, 1 = impostor).
    pub blend: f32,
    /// Low 32 bits of the frame that wrote the record.
    pub frame_tag: u32,
    /// Padding to 40 bytes.
    pub _pad: u32,
}

impl SurvivorRecord {
    /// Size in bytes.
    pub const SIZE: usize = std::mem::size_of::<Self>();

    /// Instance buffer attributes, locations 4..=9 (0..=3 are left to the
    /// archetype's vertex buffer).
    pub const ATTRIBS: [wgpu::VertexAttribute; 6] = wgpu::vertex_attr_array![
        4 => Float32x3,  // position
        5 => Float32,    // scale
        6 => Snorm16x4,  // orientation
        7 => Uint32,     // archetype
        8 => Float32,    // blend
        9 => Uint32,     // frame_tag
    ];

    /// Creates a record for a surviving instance.
    #[inline]
    #[must_use]
    pub fn new(instance: &Instance, blend: f32, frame_tag: u32) -> Self {
        Self {
            position: instance.position.to_array(),
            scale: instance.scale,
            orientation: pack_orientation(instance.rotation),
            archetype: u32::from(instance.archetype.0),
            blend,
            frame_tag,
            _pad: 0,
        }
    }

    /// World position.
    #[must_use]
    pub fn position(&self) -> Vec3 {
        Vec3::from_array(self.position)
    }

    /// Decoded orientation.
    #[must_use]
    pub fn rotation(&self) -> Quat {
        unpack_orientation(self.orientation)
    }

    /// Per-instance vertex buffer layout.
    #[must_use]
    pub fn desc() -> wgpu::VertexBufferLayout<'static> {
        wgpu::VertexBufferLayout {
            array_stride: Self::SIZE as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Instance,
            attributes: &Self::ATTRIBS,
        }
    }
}

/// Encodes a rotation as four snorm16 components.
///
/// The sign is canonicalized (w >= 0) since `q` and `-q` are the same
/// rotation.
#[inline]
#[must_use]
pub fn pack_orientation(rotation: Quat) -> [i16; 4] {
    let q = rotation.normalize();
    let q = if q.w < 0.0 { -q } else { q };
    let encode = |v: f32| (v.clamp(-1.0, 1.0) * SNORM16_MAX).round() as i16;
    [encode(q.x), encode(q.y), encode(q.z), encode(q.w)]
}

/// Decodes [`pack_orientation`] output.
#[inline]
#[must_use]
pub fn unpack_orientation(packed: [i16; 4]) -> Quat {
    let decode = |v: i16| f32::from(v) / SNORM16_MAX;
    Quat::from_xyzw(
        decode(packed[0]),
        decode(packed[1]),
        decode(packed[2]),
        decode(packed[3]),
    )
    .normalize()
}

#[cfg(test)]
mod tests {
    use super::*;
    use sylvan_core::ArchetypeId;

    #[test]
    fn test_record_size() {
        // 40 bytes: 1M survivors fit in 40 MB per buffer set
        assert_eq!(SurvivorRecord::SIZE, 40);
        assert_eq!(std::mem::align_of::<SurvivorRecord>(), 4);
    }

    #[test]
    fn test_orientation_precision() {
        let rotation = Quat::from_euler(glam::EulerRot::YXZ, 2.1, -0.4, 0.3);
        let decoded = unpack_orientation(pack_orientation(rotation));
        // Same rotation up to sign, within snorm16 precision.
        assert!(rotation.dot(decoded).abs() > 0.99999);
    }

    #[test]
    fn test_record_from_instance() {
        let instance = Instance::new(Vec3::new(1.0, 2.0, 3.0), ArchetypeId(7))
            .with_scale(1.25)
            .with_yaw(1.0);
        let record = SurvivorRecord::new(&instance, 0.5, 42);
        assert_eq!(record.position(), instance.position);
        assert_eq!(record.archetype, 7);
        assert_eq!(record.frame_tag, 42);
        assert!((record.rotation().dot(instance.rotation).abs() - 1.0).abs() < 1e-4);
    }

    #[test]
    fn test_layout_stride() {
        let layout = SurvivorRecord::desc();
        assert_eq!(layout.array_stride, 40);
        assert_eq!(layout.step_mode, wgpu::VertexStepMode::Instance);
    }
}
