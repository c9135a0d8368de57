//! Mesh data, handles and backend-side storage.

use bytemuck::{Pod, Zeroable};
use glam::Mat4;

use crate::error::{GpuError, Result};

/// Vertex layout shared by every backend's mesh pipeline.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    pub color: [f32; 4],
}

impl Vertex {
    /// Byte stride of one vertex.
    pub const STRIDE: u32 = std::mem::size_of::<Self>() as u32;
    /// Byte offset of `normal`.
    pub const NORMAL_OFFSET: u32 = 12;
    /// Byte offset of `color`.
    pub const COLOR_OFFSET: u32 = 24;

    #[must_use]
    pub const fn new(position: [f32; 3], normal: [f32; 3], color: [f32; 4]) -> Self {
        Self {
            position,
            normal,
            color,
        }
    }
}

/// CPU-side mesh handed to `load_meshes`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MeshData {
    pub vertices: Vec<Vertex>,
    pub indices: Vec<u32>,
}

impl MeshData {
    #[must_use]
    pub const fn new(vertices: Vec<Vertex>, indices: Vec<u32>) -> Self {
        Self { vertices, indices }
    }

    /// Check that the mesh is a non-empty indexed triangle list.
    pub fn validate(&self) -> Result<()> {
        if self.vertices.is_empty() || self.indices.is_empty() {
            return Err(GpuError::InvalidMesh("mesh has no geometry".into()));
        }
        if self.indices.len() % 3 != 0 {
            return Err(GpuError::InvalidMesh(format!(
                "index count {} is not a multiple of 3",
                self.indices.len()
            )));
        }
        let vertex_count = self.vertices.len();
        if let Some(bad) = self.indices.iter().find(|&&i| i as usize >= vertex_count) {
            return Err(GpuError::InvalidMesh(format!(
                "index {bad} out of range for {vertex_count} vertices"
            )));
        }
        Ok(())
    }

    /// Vertex bytes for upload.
    #[must_use]
    pub fn vertex_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.vertices)
    }

    /// Index bytes for upload.
    #[must_use]
    pub fn index_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.indices)
    }

    /// Axis-aligned cube centred on the origin, one color per face.
    #[must_use]
    pub fn cube(size: f32) -> Self {
        let h = size * 0.5;
        let faces: [([f32; 3], [f32; 3], [f32; 3], [f32; 4]); 6] = [
            ([0.0, 0.0, 1.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.9, 0.3, 0.3, 1.0]),
            ([0.0, 0.0, -1.0], [-1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.3, 0.9, 0.3, 1.0]),
            ([1.0, 0.0, 0.0], [0.0, 0.0, -1.0], [0.0, 1.0, 0.0], [0.3, 0.3, 0.9, 1.0]),
            ([-1.0, 0.0, 0.0], [0.0, 0.0, 1.0], [0.0, 1.0, 0.0], [0.9, 0.9, 0.3, 1.0]),
            ([0.0, 1.0, 0.0], [1.0, 0.0, 0.0], [0.0, 0.0, -1.0], [0.3, 0.9, 0.9, 1.0]),
            ([0.0, -1.0, 0.0], [1.0, 0.0, 0.0], [0.0, 0.0, 1.0], [0.9, 0.3, 0.9, 1.0]),
        ];

        let mut vertices = Vec::with_capacity(24);
        let mut indices = Vec::with_capacity(36);
        for (normal, right, up, color) in faces {
            let base = vertices.len() as u32;
            for (sx, sy) in [(-1.0, -1.0), (1.0, -1.0), (1.0, 1.0), (-1.0, 1.0)] {
                let position = [
                    (normal[0] + right[0] * sx + up[0] * sy) * h,
                    (normal[1] + right[1] * sx + up[1] * sy) * h,
                    (normal[2] + right[2] * sx + up[2] * sy) * h,
                ];
                vertices.push(Vertex::new(position, normal, color));
            }
            indices.extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
        }

        Self { vertices, indices }
    }
}

/// Opaque handle to a mesh uploaded by a backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MeshHandle {
    index: u32,
    generation: u32,
}

/// Counts describing an uploaded mesh.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MeshInfo {
    pub vertex_count: u32,
    pub index_count: u32,
}

/// Implemented by each backend's GPU mesh resources.
pub trait GpuMesh {
    fn info(&self) -> MeshInfo;
}

/// One draw for `render`: a mesh and its world transform.
///
/// Borrowed for the duration of a single `render` call.
#[derive(Debug, Clone, Copy)]
pub struct RenderData<'a> {
    pub mesh: MeshHandle,
    pub world: &'a Mat4,
}

impl<'a> RenderData<'a> {
    #[must_use]
    pub const fn new(mesh: MeshHandle, world: &'a Mat4) -> Self {
        Self { mesh, world }
    }
}

struct Slot<M> {
    generation: u32,
    value: Option<M>,
}

/// Generational arena owning a backend's meshes.
///
/// Removing a mesh bumps its slot generation, so stale handles miss instead of
/// aliasing a newer mesh that reused the slot.
pub struct MeshStore<M> {
    slots: Vec<Slot<M>>,
    free: Vec<u32>,
    len: usize,
}

impl<M> Default for MeshStore<M> {
    fn default() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            len: 0,
        }
    }
}

impl<M> MeshStore<M> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a mesh and return its handle.
    pub fn insert(&mut self, mesh: M) -> MeshHandle {
        self.len += 1;
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.value = Some(mesh);
            return MeshHandle {
                index,
                generation: slot.generation,
            };
        }

        let index = self.slots.len() as u32;
        self.slots.push(Slot {
            generation: 0,
            value: Some(mesh),
        });
        MeshHandle {
            index,
            generation: 0,
        }
    }

    #[must_use]
    pub fn get(&self, handle: MeshHandle) -> Option<&M> {
        self.slots
            .get(handle.index as usize)
            .filter(|slot| slot.generation == handle.generation)
            .and_then(|slot| slot.value.as_ref())
    }

    #[must_use]
    pub fn contains(&self, handle: MeshHandle) -> bool {
        self.get(handle).is_some()
    }

    /// Take a mesh out of the store, invalidating its handle.
    pub fn remove(&mut self, handle: MeshHandle) -> Option<M> {
        let slot = self.slots.get_mut(handle.index as usize)?;
        if slot.generation != handle.generation {
            return None;
        }
        let value = slot.value.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(handle.index);
        self.len -= 1;
        Some(value)
    }

    /// Remove every mesh, invalidating all handles.
    pub fn drain(&mut self) -> Vec<M> {
        let mut out = Vec::with_capacity(self.len);
        for (index, slot) in self.slots.iter_mut().enumerate() {
            if let Some(value) = slot.value.take() {
                slot.generation = slot.generation.wrapping_add(1);
                self.free.push(index as u32);
                out.push(value);
            }
        }
        self.len = 0;
        out
    }

    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cube_is_valid() {
        let cube = MeshData::cube(1.0);
        assert_eq!(cube.vertices.len(), 24);
        assert_eq!(cube.indices.len(), 36);
        cube.validate().unwrap();
        assert!(cube
            .vertices
            .iter()
            .all(|v| v.position.iter().all(|c| c.abs() <= 0.5 + f32::EPSILON)));
    }

    #[test]
    fn validation_rejects_bad_indices() {
        let v = Vertex::new([0.0; 3], [0.0, 0.0, 1.0], [1.0; 4]);
        let mesh = MeshData::new(vec![v; 3], vec![0, 1, 3]);
        assert!(matches!(mesh.validate(), Err(GpuError::InvalidMesh(_))));

        let mesh = MeshData::new(vec![v; 3], vec![0, 1]);
        assert!(matches!(mesh.validate(), Err(GpuError::InvalidMesh(_))));

        assert!(MeshData::default().validate().is_err());
    }

    #[test]
    fn vertex_layout_matches_offsets() {
        assert_eq!(Vertex::STRIDE, 40);
        assert_eq!(std::mem::offset_of!(Vertex, normal) as u32, Vertex::NORMAL_OFFSET);
        assert_eq!(std::mem::offset_of!(Vertex, color) as u32, Vertex::COLOR_OFFSET);
    }

    #[test]
    fn stale_handles_miss_after_reuse() {
        let mut store = MeshStore::new();
        let a = store.insert("a");
        assert_eq!(store.remove(a), Some("a"));
        let b = store.insert("b");

        assert_eq!(store.get(a), None);
        assert_eq!(store.get(b), Some(&"b"));
        assert_eq!(store.remove(a), None);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn drain_empties_store() {
        let mut store = MeshStore::new();
        let handles: Vec<_> = (0..4).map(|i| store.insert(i)).collect();
        let mut drained = store.drain();
        drained.sort_unstable();

        assert_eq!(drained, vec![0, 1, 2, 3]);
        assert!(store.is_empty());
        assert!(handles.iter().all(|&h| !store.contains(h)));
    }
}
