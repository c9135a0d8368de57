//! Draw-list recording shared by all backends.

use glam::Mat4;

use crate::mesh::{MeshHandle, RenderData};

/// Per-backend command recording for the mesh pass.
pub trait DrawRecorder {
    /// Record the view-projection matrix used by every following draw.
    fn set_view_projection(&mut self, view_projection: &Mat4);

    /// Bind `mesh`, push `world` and record one indexed draw.
    ///
    /// Returns the number of indices drawn, or `None` if the handle does not
    /// resolve to a live mesh.
    fn draw_mesh(&mut self, mesh: MeshHandle, world: &Mat4) -> Option<u32>;
}

/// Counts accumulated while recording draws.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrawStats {
    /// Draws recorded.
    pub draws: u32,
    /// Entries skipped (unknown mesh, no pipeline, suspended surface).
    pub skipped: u32,
    /// Indices submitted across all draws.
    pub indices: u64,
}

impl DrawStats {
    /// Fold another pass into this one.
    pub fn merge(&mut self, other: Self) {
        self.draws += other.draws;
        self.skipped += other.skipped;
        self.indices += other.indices;
    }

    /// Stats for a list where every entry was skipped.
    #[must_use]
    pub fn all_skipped(count: usize) -> Self {
        Self {
            skipped: count as u32,
            ..Self::default()
        }
    }
}

/// Record `draws` into `recorder`, setting the view-projection once.
pub fn record_draw_list<R: DrawRecorder + ?Sized>(
    recorder: &mut R,
    draws: &[RenderData<'_>],
    view_projection: &Mat4,
) -> DrawStats {
    let mut stats = DrawStats::default();
    if draws.is_empty() {
        return stats;
    }

    recorder.set_view_projection(view_projection);
    for draw in draws {
        match recorder.draw_mesh(draw.mesh, draw.world) {
            Some(indices) => {
                stats.draws += 1;
                stats.indices += u64::from(indices);
            }
            None => {
                tracing::debug!("Skipping draw of unknown mesh {:?}", draw.mesh);
                stats.skipped += 1;
            }
        }
    }
    stats
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::MeshStore;

    #[derive(Default)]
    struct Recording {
        store: MeshStore<u32>,
        view_projections: usize,
        worlds: Vec<Mat4>,
    }

    impl DrawRecorder for Recording {
        fn set_view_projection(&mut self, _: &Mat4) {
            self.view_projections += 1;
        }

        fn draw_mesh(&mut self, mesh: MeshHandle, world: &Mat4) -> Option<u32> {
            let count = *self.store.get(mesh)?;
            self.worlds.push(*world);
            Some(count)
        }
    }

    #[test]
    fn unknown_handles_are_skipped() {
        let mut rec = Recording::default();
        let a = rec.store.insert(36);
        let stale = rec.store.insert(6);
        rec.store.remove(stale);

        let world = Mat4::from_translation(glam::Vec3::X);
        let draws = [
            RenderData::new(a, &world),
            RenderData::new(stale, &world),
            RenderData::new(a, &Mat4::IDENTITY),
        ];
        let stats = record_draw_list(&mut rec, &draws, &Mat4::IDENTITY);

        assert_eq!(
            stats,
            DrawStats {
                draws: 2,
                skipped: 1,
                indices: 72
            }
        );
        assert_eq!(rec.view_projections, 1);
        assert_eq!(rec.worlds, vec![world, Mat4::IDENTITY]);
    }

    #[test]
    fn empty_list_records_nothing() {
        let mut rec = Recording::default();
        let stats = record_draw_list(&mut rec, &[], &Mat4::IDENTITY);
        assert_eq!(stats, DrawStats::default());
        assert_eq!(rec.view_projections, 0);
    }
}
