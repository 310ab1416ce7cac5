//! Solid rectangle fills drawn as indexed quads.

use super::AaType;
use crate::caps::Caps;
use crate::draw_op::{
    AppliedClip, ClampType, CombineResult, CoverageType, DrawOp, ProcessorAnalysis, ProcessorSet,
};
use crate::geometry::Rect;
use crate::render_task::{DrawRecord, FlushState};
use crate::resource::{BufferKind, KeyDomain, KeyReuse, UniqueKey};
use anyhow::{Result as AnyResult, anyhow};
use bytemuck::{Pod, Zeroable};
use core::any::Any;
use std::sync::LazyLock;

/// Quads drawn by one indexed draw call.
pub const MAX_QUADS_PER_DRAW: usize = 1024;

const INDICES_PER_QUAD: usize = 6;
const VERTICES_PER_QUAD: usize = 4;

/// Key of the index buffer shared by every quad draw.
static QUAD_INDEX_KEY: LazyLock<UniqueKey> = LazyLock::new(|| {
    UniqueKey::builder(KeyDomain::generate(KeyReuse::Exclusive))
        .push_u32(MAX_QUADS_PER_DRAW as u32)
        .tag("quad-index-buffer")
        .finish()
});

/// Two triangles per quad, for [`MAX_QUADS_PER_DRAW`] quads.
static QUAD_INDICES: LazyLock<Vec<u16>> = LazyLock::new(|| {
    (0..MAX_QUADS_PER_DRAW)
        .flat_map(|quad| {
            let base = (quad * VERTICES_PER_QUAD) as u16;
            [base, base + 1, base + 2, base + 2, base + 1, base + 3]
        })
        .collect()
});

/// Vertex layout of a filled quad.
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct QuadVertex {
    pub position: [f32; 2],
    pub color: [f32; 4],
    pub coverage: f32,
}

/// One or more rectangles sharing paint and antialiasing.
#[derive(Debug)]
pub struct FillRectOp {
    rects: Vec<Rect>,
    processors: ProcessorSet,
    aa: AaType,
    bounds: Rect,
    analysis: Option<ProcessorAnalysis>,
}

impl FillRectOp {
    pub fn new(rect: Rect, processors: ProcessorSet, aa: AaType) -> Self {
        Self {
            rects: vec![rect],
            processors,
            aa,
            bounds: rect,
            analysis: None,
        }
    }

    /// Rectangles drawn by this op, including merged ones.
    #[inline]
    pub fn rects(&self) -> &[Rect] {
        &self.rects
    }

    #[inline]
    pub const fn processors(&self) -> &ProcessorSet {
        &self.processors
    }

    fn coverage(&self) -> CoverageType {
        let fractional = self.rects.iter().any(|rect| !rect.is_pixel_aligned());
        if self.aa == AaType::Coverage && fractional {
            CoverageType::SingleChannel
        } else {
            CoverageType::None
        }
    }

    fn vertices(&self, rects: &[Rect]) -> Vec<QuadVertex> {
        let paint = self.processors.color();
        let color = [paint.red, paint.green, paint.blue, paint.alpha];
        rects
            .iter()
            .flat_map(|rect| {
                [
                    [rect.x, rect.y],
                    [rect.right(), rect.y],
                    [rect.x, rect.bottom()],
                    [rect.right(), rect.bottom()],
                ]
                .map(|position| QuadVertex {
                    position,
                    color,
                    coverage: 1.0,
                })
            })
            .collect()
    }
}

impl DrawOp for FillRectOp {
    fn name(&self) -> &'static str {
        "FillRectOp"
    }

    fn bounds(&self) -> Rect {
        self.bounds
    }

    fn uses_msaa(&self) -> bool {
        self.aa == AaType::Msaa
    }

    fn finalize(
        &mut self,
        caps: &Caps,
        clip: &AppliedClip,
        clamp: ClampType,
    ) -> ProcessorAnalysis {
        debug_assert!(self.analysis.is_none(), "FillRectOp finalized twice");
        let analysis = self
            .processors
            .finalize(self.coverage(), clip, caps, clamp);
        self.analysis = Some(analysis);
        analysis
    }

    fn analysis(&self) -> Option<&ProcessorAnalysis> {
        self.analysis.as_ref()
    }

    fn combine_if_possible(&mut self, other: &mut dyn DrawOp, _caps: &Caps) -> CombineResult {
        let Some(other) = other.as_any_mut().downcast_mut::<Self>() else {
            return CombineResult::CannotCombine;
        };
        if self.aa != other.aa
            || self.analysis != other.analysis
            || !self.processors.is_compatible(&other.processors)
        {
            return CombineResult::CannotCombine;
        }
        self.rects.append(&mut other.rects);
        self.bounds.union(other.bounds);
        CombineResult::Merged
    }

    fn on_execute(&mut self, state: &mut FlushState<'_>) -> AnyResult<()> {
        let indices: &[u8] = bytemuck::cast_slice(QUAD_INDICES.as_slice());
        let index_buffer = state
            .resource_provider()
            .find_or_make_static_buffer(BufferKind::Index, indices.len(), indices, &QUAD_INDEX_KEY)
            .ok_or_else(|| anyhow!("quad index buffer unavailable"))?;
        for chunk in self.rects.chunks(MAX_QUADS_PER_DRAW) {
            let vertices = self.vertices(chunk);
            let vertex_buffer = state
                .make_vertex_buffer(bytemuck::cast_slice(&vertices))
                .ok_or_else(|| anyhow!("vertex buffer for {} quads unavailable", chunk.len()))?;
            state.record_draw(DrawRecord {
                vertex_buffer: Some(vertex_buffer.id()),
                index_buffer: Some(index_buffer.id()),
                element_count: (chunk.len() * INDICES_PER_QUAD) as u32,
                instance_count: 1,
            });
        }
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::color::Color4f;

    fn red() -> ProcessorSet {
        ProcessorSet::solid(Color4f::new(1.0, 0.0, 0.0, 1.0))
    }

    fn finalized(rect: Rect, aa: AaType) -> FillRectOp {
        let mut op = FillRectOp::new(rect, red(), aa);
        op.finalize(&Caps::default(), &AppliedClip::default(), ClampType::Auto);
        op
    }

    /// # Panics
    /// Panics if the shared index pattern is wrong.
    #[test]
    fn quad_indices_pattern() {
        assert_eq!(QUAD_INDICES.len(), MAX_QUADS_PER_DRAW * INDICES_PER_QUAD);
        assert_eq!(&QUAD_INDICES[..12], &[0, 1, 2, 2, 1, 3, 4, 5, 6, 6, 5, 7]);
    }

    /// # Panics
    /// Panics if compatible fills do not merge.
    #[test]
    fn compatible_fills_merge() {
        let mut first = finalized(Rect::new(0.0, 0.0, 10.0, 10.0), AaType::None);
        let mut second = finalized(Rect::new(20.0, 0.0, 10.0, 10.0), AaType::None);
        let result = first.combine_if_possible(&mut second, &Caps::default());
        assert_eq!(result, CombineResult::Merged);
        assert_eq!(first.rects().len(), 2);
        assert_eq!(first.bounds(), Rect::new(0.0, 0.0, 30.0, 10.0));
    }

    /// # Panics
    /// Panics if fills with different antialiasing merge.
    #[test]
    fn different_aa_does_not_merge() {
        let mut first = finalized(Rect::new(0.0, 0.0, 10.0, 10.0), AaType::None);
        let mut second = finalized(Rect::new(20.0, 0.0, 10.0, 10.0), AaType::Msaa);
        assert_eq!(
            first.combine_if_possible(&mut second, &Caps::default()),
            CombineResult::CannotCombine
        );
    }

    /// # Panics
    /// Panics if stencil is reported before finalize.
    #[test]
    fn stencil_unknown_before_finalize() {
        let mut op = FillRectOp::new(Rect::new(0.0, 0.0, 4.0, 4.0), red(), AaType::None);
        assert_eq!(op.uses_stencil(), None);
        let clip = AppliedClip {
            stencil: true,
            ..AppliedClip::default()
        };
        let analysis = op.finalize(&Caps::default(), &clip, ClampType::Auto);
        assert_eq!(op.uses_stencil(), Some(analysis.uses_stencil));
        assert_eq!(op.uses_stencil(), Some(true));
    }

    /// # Panics
    /// Panics if aligned coverage-AA rects report coverage.
    #[test]
    fn aligned_rects_need_no_coverage() {
        let aligned = FillRectOp::new(Rect::new(1.0, 1.0, 4.0, 4.0), red(), AaType::Coverage);
        let fractional = FillRectOp::new(Rect::new(1.5, 1.0, 4.0, 4.0), red(), AaType::Coverage);
        assert_eq!(aligned.coverage(), CoverageType::None);
        assert_eq!(fractional.coverage(), CoverageType::SingleChannel);
    }
}
