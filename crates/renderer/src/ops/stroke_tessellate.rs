//! Polyline strokes expanded by hardware tessellation.
//!
//! Each segment becomes one instance. The vertex count per instance comes from
//! the resolve level: `2^level` parametric edges, enough to hit the device's
//! maximum tessellation segment count.

use super::next_log2;
use crate::caps::Caps;
use crate::draw_op::{
    AppliedClip, ClampType, CombineResult, CoverageType, DrawOp, ProcessorAnalysis, ProcessorSet,
};
use crate::geometry::Rect;
use crate::render_task::{DrawRecord, FlushState};
use anyhow::{Result as AnyResult, anyhow, bail};
use bytemuck::{Pod, Zeroable};
use core::any::Any;
use log::debug;

/// Instance data for one stroked segment.
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct StrokeInstance {
    pub start: [f32; 2],
    pub end: [f32; 2],
    pub half_width: f32,
    pub padding: f32,
}

/// Strokes of one or more polylines sharing width and paint.
#[derive(Debug)]
pub struct StrokeTessellateOp {
    contours: Vec<Vec<[f32; 2]>>,
    width: f32,
    anti_alias: bool,
    processors: ProcessorSet,
    bounds: Rect,
    analysis: Option<ProcessorAnalysis>,
    resolve_level: Option<u32>,
}

impl StrokeTessellateOp {
    pub fn new(points: Vec<[f32; 2]>, width: f32, anti_alias: bool, processors: ProcessorSet) -> Self {
        let bounds = stroke_bounds(&points, width);
        Self {
            contours: vec![points],
            width,
            anti_alias,
            processors,
            bounds,
            analysis: None,
            resolve_level: None,
        }
    }

    #[inline]
    pub fn contours(&self) -> &[Vec<[f32; 2]>] {
        &self.contours
    }

    /// Tessellation resolve level chosen at finalize.
    #[inline]
    pub const fn resolve_level(&self) -> Option<u32> {
        self.resolve_level
    }

    fn instances(&self) -> Vec<StrokeInstance> {
        let half_width = self.width * 0.5;
        self.contours
            .iter()
            .flat_map(|contour| contour.windows(2))
            .filter_map(|pair| match pair {
                [start, end] => Some(StrokeInstance {
                    start: *start,
                    end: *end,
                    half_width,
                    padding: 0.0,
                }),
                _ => None,
            })
            .collect()
    }
}

fn stroke_bounds(points: &[[f32; 2]], width: f32) -> Rect {
    let Some(first) = points.first() else {
        return Rect::default();
    };
    let mut bounds = Rect::new(first[0], first[1], 0.0, 0.0);
    for point in points.iter().skip(1) {
        bounds.union(Rect::new(point[0], point[1], 0.0, 0.0));
    }
    let outset = width * 0.5;
    Rect::new(
        bounds.x - outset,
        bounds.y - outset,
        bounds.width + width,
        bounds.height + width,
    )
}

impl DrawOp for StrokeTessellateOp {
    fn name(&self) -> &'static str {
        "StrokeTessellateOp"
    }

    fn bounds(&self) -> Rect {
        self.bounds
    }

    fn uses_msaa(&self) -> bool {
        self.anti_alias
    }

    fn finalize(
        &mut self,
        caps: &Caps,
        clip: &AppliedClip,
        clamp: ClampType,
    ) -> ProcessorAnalysis {
        debug_assert!(self.analysis.is_none(), "StrokeTessellateOp finalized twice");
        if self.anti_alias && !clip.hw_aa {
            debug!(target: "renderer", "antialiased stroke drawn without multisampling");
        }
        self.resolve_level = Some(next_log2(caps.max_tessellation_segments.max(1)));
        let analysis = self
            .processors
            .finalize(CoverageType::None, clip, caps, clamp);
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
        if self.width.to_bits() != other.width.to_bits()
            || self.anti_alias != other.anti_alias
            || self.analysis != other.analysis
            || self.resolve_level != other.resolve_level
            || !self.processors.is_compatible(&other.processors)
        {
            return CombineResult::CannotCombine;
        }
        self.contours.append(&mut other.contours);
        self.bounds.union(other.bounds);
        CombineResult::Merged
    }

    fn on_execute(&mut self, state: &mut FlushState<'_>) -> AnyResult<()> {
        let Some(level) = self.resolve_level else {
            bail!("stroke executed without a resolve level");
        };
        let instances = self.instances();
        if instances.is_empty() {
            return Ok(());
        }
        let buffer = state
            .make_vertex_buffer(bytemuck::cast_slice(&instances))
            .ok_or_else(|| anyhow!("instance buffer for {} segments unavailable", instances.len()))?;
        // A triangle strip with two vertices per parametric edge boundary.
        let edges = 1u32 << level;
        state.record_draw(DrawRecord {
            vertex_buffer: Some(buffer.id()),
            index_buffer: None,
            element_count: (edges + 1) * 2,
            instance_count: instances.len() as u32,
        });
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

    fn stroke(points: Vec<[f32; 2]>) -> StrokeTessellateOp {
        StrokeTessellateOp::new(
            points,
            2.0,
            true,
            ProcessorSet::solid(Color4f::new(0.0, 0.0, 0.0, 1.0)),
        )
    }

    /// # Panics
    /// Panics if the bounds ignore the stroke width.
    #[test]
    fn bounds_include_width() {
        let op = stroke(vec![[0.0, 0.0], [10.0, 0.0]]);
        assert_eq!(op.bounds(), Rect::new(-1.0, -1.0, 12.0, 2.0));
        assert!(op.uses_msaa());
    }

    /// # Panics
    /// Panics if the resolve level does not follow the caps.
    #[test]
    fn resolve_level_from_caps() {
        let mut op = stroke(vec![[0.0, 0.0], [10.0, 0.0]]);
        assert_eq!(op.resolve_level(), None);
        let caps = Caps {
            max_tessellation_segments: 64,
            ..Caps::default()
        };
        op.finalize(&caps, &AppliedClip::unclipped(true), ClampType::Auto);
        assert_eq!(op.resolve_level(), Some(6));

        let mut small = stroke(vec![[0.0, 0.0], [10.0, 0.0]]);
        let caps = Caps {
            max_tessellation_segments: 5,
            ..Caps::default()
        };
        small.finalize(&caps, &AppliedClip::unclipped(true), ClampType::Auto);
        assert_eq!(small.resolve_level(), Some(3));
    }

    /// # Panics
    /// Panics if one instance is not produced per segment.
    #[test]
    fn one_instance_per_segment() {
        let op = stroke(vec![[0.0, 0.0], [10.0, 0.0], [10.0, 10.0]]);
        assert_eq!(op.instances().len(), 2);
    }

    /// # Panics
    /// Panics if strokes with different widths merge.
    #[test]
    fn width_blocks_merge() {
        let caps = Caps::default();
        let clip = AppliedClip::unclipped(true);
        let mut first = stroke(vec![[0.0, 0.0], [10.0, 0.0]]);
        let mut second = StrokeTessellateOp::new(
            vec![[0.0, 5.0], [10.0, 5.0]],
            4.0,
            true,
            ProcessorSet::solid(Color4f::new(0.0, 0.0, 0.0, 1.0)),
        );
        first.finalize(&caps, &clip, ClampType::Auto);
        second.finalize(&caps, &clip, ClampType::Auto);
        assert_eq!(
            first.combine_if_possible(&mut second, &caps),
            CombineResult::CannotCombine
        );

        let mut third = stroke(vec![[0.0, 8.0], [10.0, 8.0]]);
        third.finalize(&caps, &clip, ClampType::Auto);
        assert_eq!(first.combine_if_possible(&mut third, &caps), CombineResult::Merged);
        assert_eq!(first.contours().len(), 2);
    }
}
