// Copyright (c) 2019-present Dmitry Stepanov and Fyrox Engine contributors.
//
// Permission is hereby granted, free of charge, to any person obtaining a copy
// of this software and associated documentation files (the "Software"), to deal
// in the Software without restriction, including without limitation the rights
// to use, copy, modify, merge, publish, distribute, sublicense, and/or sell
// copies of the Software, and to permit persons to whom the Software is
// furnished to do so, subject to the following conditions:
//
// The above copyright notice and this permission notice shall be included in all
// copies or substantial portions of the Software.
//
// THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND, EXPRESS OR
// IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY,
// FITNESS FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL THE
// AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER
// LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING FROM,
// OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER DEALINGS IN THE
// SOFTWARE.

//! `AddToRenderTask`: the filtering insertion point every pass uses to populate a
//! [`super::RenderTask`] from a [`crate::collide_list::CollideList`] (§4's Render Task Builder).

use super::{InstanceRow, RenderTask};
use crate::gapi::{ElementKind, GpuGeometryBuffer};
use crate::interfaces::{Drawable, DrawableFlags};
use crate::pipeline::Pipeline;
use crate::texture_config::TextureUnitConfig;
use std::rc::Rc;

/// Which partition of the scene a render task is being built for; drives
/// [`RenderTaskFilter::accepts`].
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum RenderPass {
    /// Opaque/alpha-tested geometry into the G-buffer.
    Solid,
    /// Alpha-blended geometry, composited after lighting.
    Transparent,
    /// Depth-only submission into a [`crate::shadow::ShadowTier::Solid`] map.
    ShadowSolid,
    /// Depth (+ color modulation) submission into a [`crate::shadow::ShadowTier::Transparent`]
    /// map.
    ShadowTransparent,
    /// Depth-only submission into the [`crate::shadow::ShadowTier::Ambient`] occlusion-mesh
    /// stream.
    ShadowAmbient,
    /// Decal geometry, drawn after the G-buffer pass with its own blend state.
    Decal,
    /// Silhouette geometry for the outline post-process.
    Outline,
}

/// The accept/reject predicate for one render task build, combining the active [`RenderPass`]
/// with the plan's layer mask (§4.3).
#[derive(Debug, Copy, Clone)]
pub struct RenderTaskFilter {
    pub pass: RenderPass,
    pub layer_mask: u32,
    /// Set when building a reflection-probe/env-map capture task; applies the not-reflected
    /// exclusion on top of the pass's usual predicate.
    pub reflection_probe: bool,
    /// Set by the Shadow Renderer's combined depth-only bucket (§4.6 step 4, `ForceDoubleSided`);
    /// lets double-sided-flagged drawables into a `ShadowSolid`/`ShadowAmbient` task. Without it
    /// those drawables are held back for their own dedicated double-sided pass so a single-sided
    /// front-face cull isn't applied to them by mistake.
    pub force_double_sided: bool,
}

impl RenderTaskFilter {
    pub fn new(pass: RenderPass, layer_mask: u32) -> Self {
        Self {
            pass,
            layer_mask,
            reflection_probe: false,
            force_double_sided: false,
        }
    }

    /// Builds a filter for a reflection-probe/env-map capture render task, see
    /// [`Self::reflection_probe`].
    pub fn for_reflection_probe(pass: RenderPass, layer_mask: u32) -> Self {
        Self {
            reflection_probe: true,
            ..Self::new(pass, layer_mask)
        }
    }

    /// Builds a filter for the Shadow Renderer's combined solid + double-sided depth-only bucket,
    /// see [`Self::force_double_sided`].
    pub fn for_combined_shadow_depth(pass: RenderPass, layer_mask: u32) -> Self {
        Self {
            force_double_sided: true,
            ..Self::new(pass, layer_mask)
        }
    }

    /// `true` if a drawable with `flags` on `layer` belongs in this task.
    pub fn accepts(&self, flags: DrawableFlags, layer: u32) -> bool {
        if layer & self.layer_mask == 0 {
            return false;
        }
        if flags.contains(DrawableFlags::DYNAMICALLY_RENDERED) {
            return false;
        }
        if self.reflection_probe && flags.contains(DrawableFlags::NOT_REFLECTED) {
            return false;
        }
        let transparent = flags.contains(DrawableFlags::TRANSPARENT);
        let decal = flags.contains(DrawableFlags::DECAL);
        let shadow_none = flags.contains(DrawableFlags::SHADOW_NONE);
        match self.pass {
            RenderPass::Solid => !transparent && !decal,
            RenderPass::Transparent => transparent && !decal,
            RenderPass::ShadowSolid => {
                if shadow_none || transparent || decal {
                    return false;
                }
                self.force_double_sided || !flags.contains(DrawableFlags::DOUBLE_SIDED)
            }
            RenderPass::ShadowTransparent => !shadow_none && transparent,
            RenderPass::ShadowAmbient => {
                if shadow_none {
                    return false;
                }
                self.force_double_sided || !flags.contains(DrawableFlags::DOUBLE_SIDED)
            }
            RenderPass::Decal => decal,
            RenderPass::Outline => flags.contains(DrawableFlags::OUTLINE),
        }
    }
}

/// Accumulates drawables into a [`RenderTask`], applying `filter` and coalescing identical
/// `{pipeline, TUC, VAO, instance-shared}` tuples as it goes.
pub struct AddToRenderTask<'a> {
    task: &'a mut RenderTask,
    filter: RenderTaskFilter,
}

impl<'a> AddToRenderTask<'a> {
    pub fn new(task: &'a mut RenderTask, filter: RenderTaskFilter) -> Self {
        Self { task, filter }
    }

    /// Adds one drawable's draw, returning `false` without touching the tree if the filter
    /// rejected it. `geometry` is only invoked the first time this `geometry_id` is seen in this
    /// TUC this frame.
    #[allow(clippy::too_many_arguments)]
    pub fn add<D: Drawable + ?Sized>(
        &mut self,
        drawable: &D,
        layer: u32,
        pipeline: &Rc<Pipeline>,
        tuc: &Rc<TextureUnitConfig>,
        element_kind: ElementKind,
        row: InstanceRow,
        geometry: impl FnOnce() -> GpuGeometryBuffer,
    ) -> bool {
        if !self.filter.accepts(drawable.flags(), layer) {
            return false;
        }
        let vao = self
            .task
            .pipeline_mut(pipeline)
            .tuc_mut(tuc)
            .vao_mut(drawable.geometry_id(), geometry);
        vao.push(
            drawable.instance_shared_id(),
            element_kind,
            0,
            drawable.element_count(),
            None,
            row,
        );
        true
    }

    /// Like [`Self::add`], but additionally rejects drawables whose cached
    /// [`Drawable::cube_face_mask`] does not touch `face` — used when building one face of a
    /// point-light cube shadow render (§4.6).
    #[allow(clippy::too_many_arguments)]
    pub fn add_for_cube_face<D: Drawable + ?Sized>(
        &mut self,
        drawable: &D,
        layer: u32,
        face: u8,
        pipeline: &Rc<Pipeline>,
        tuc: &Rc<TextureUnitConfig>,
        element_kind: ElementKind,
        row: InstanceRow,
        geometry: impl FnOnce() -> GpuGeometryBuffer,
    ) -> bool {
        if drawable.cube_face_mask() & (1 << face) == 0 {
            return false;
        }
        self.add(drawable, layer, pipeline, tuc, element_kind, row, geometry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flags(transparent: bool, shadow_none: bool, decal: bool) -> DrawableFlags {
        let mut f = DrawableFlags::empty();
        f.set(DrawableFlags::TRANSPARENT, transparent);
        f.set(DrawableFlags::SHADOW_NONE, shadow_none);
        f.set(DrawableFlags::DECAL, decal);
        f
    }

    #[test]
    fn solid_pass_rejects_transparent_and_decal() {
        let filter = RenderTaskFilter::new(RenderPass::Solid, 0xFFFF_FFFF);
        assert!(filter.accepts(flags(false, false, false), 1));
        assert!(!filter.accepts(flags(true, false, false), 1));
        assert!(!filter.accepts(flags(false, false, true), 1));
    }

    #[test]
    fn shadow_solid_pass_rejects_shadow_none() {
        let filter = RenderTaskFilter::new(RenderPass::ShadowSolid, 0xFFFF_FFFF);
        assert!(!filter.accepts(flags(false, true, false), 1));
        assert!(filter.accepts(flags(false, false, false), 1));
    }

    #[test]
    fn layer_mask_mismatch_rejects_regardless_of_flags() {
        let filter = RenderTaskFilter::new(RenderPass::Solid, 0b0001);
        assert!(!filter.accepts(flags(false, false, false), 0b0010));
    }

    #[test]
    fn dynamically_rendered_drawables_are_always_rejected() {
        let filter = RenderTaskFilter::new(RenderPass::Solid, 0xFFFF_FFFF);
        let mut f = flags(false, false, false);
        f.insert(DrawableFlags::DYNAMICALLY_RENDERED);
        assert!(!filter.accepts(f, 1));
    }

    #[test]
    fn decal_pass_only_accepts_decals() {
        let filter = RenderTaskFilter::new(RenderPass::Decal, 0xFFFF_FFFF);
        assert!(filter.accepts(flags(false, false, true), 1));
        assert!(!filter.accepts(flags(false, false, false), 1));
    }

    #[test]
    fn reflection_probe_filter_rejects_not_reflected() {
        let filter = RenderTaskFilter::for_reflection_probe(RenderPass::Solid, 0xFFFF_FFFF);
        let mut not_reflected = flags(false, false, false);
        not_reflected.insert(DrawableFlags::NOT_REFLECTED);
        assert!(!filter.accepts(not_reflected, 1));
        assert!(filter.accepts(flags(false, false, false), 1));
    }

    #[test]
    fn regular_render_filter_ignores_not_reflected() {
        let filter = RenderTaskFilter::new(RenderPass::Solid, 0xFFFF_FFFF);
        let mut not_reflected = flags(false, false, false);
        not_reflected.insert(DrawableFlags::NOT_REFLECTED);
        assert!(filter.accepts(not_reflected, 1));
    }

    #[test]
    fn shadow_solid_pass_holds_back_double_sided_unless_combined() {
        let mut double_sided = flags(false, false, false);
        double_sided.insert(DrawableFlags::DOUBLE_SIDED);

        let plain = RenderTaskFilter::new(RenderPass::ShadowSolid, 0xFFFF_FFFF);
        assert!(!plain.accepts(double_sided, 1));
        assert!(plain.accepts(flags(false, false, false), 1));

        let combined = RenderTaskFilter::for_combined_shadow_depth(RenderPass::ShadowSolid, 0xFFFF_FFFF);
        assert!(combined.accepts(double_sided, 1));
    }
}
