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

//! Per-light shadow caster cache (§4.5): three tiers (Solid, Transparent, Ambient), each with
//! Static/Dynamic/Temporary slots, plus the size-driven invalidation and aging policy that keeps
//! only the casters still being touched resident.

use crate::collide_list::CollideList;
use crate::core::algebra::{Matrix4, Point3, Vector3};
use crate::core::log::{Log, MessageKind};
use crate::error::RenderError;
use crate::gapi::{CubeMapFace, ElementKind, GpuGeometryBuffer, GpuTexture, GpuTextureDescriptor, GpuTextureKind, PixelKind};
use crate::gpu::{BufferDataUsage, Color, GpuBuffer, GpuFrameBuffer, GraphicsServer, Rect};
use crate::interfaces::{Drawable, TextureTargetMap};
use crate::param_block::ParamBlockHandle;
use crate::pipeline::Pipeline;
use crate::render_task::builder::{AddToRenderTask, RenderPass, RenderTaskFilter};
use crate::render_task::executor;
use crate::render_task::{InstanceRow, RenderTask};
use crate::stats::BindStatistics;
use crate::texture_config::{SamplerCache, TextureUnitConfig};
use std::rc::Rc;

/// Whether a light uses only its long-lived Static map, only rebuilds Dynamic every frame, or
/// keeps both and composites them; see §3's Shadow caster invariant (iii).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum ShadowType {
    /// Only the Static slot is ever rendered; used for lights whose casters never move.
    StaticOnly,
    /// Only the Dynamic slot is rendered, every frame. Forced when a layer-mask refilter is
    /// active (§3, invariant iii).
    #[default]
    DynamicOnly,
    /// Both slots are rendered and composited; Static holds the non-moving casters, Dynamic holds
    /// the rest.
    StaticAndDynamic,
}

/// One of the three shadow tiers a [`ShadowCaster`] keeps separately (§3, §GLOSSARY).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum ShadowTier {
    /// Depth/depth-cube for opaque geometry.
    Solid,
    /// Depth + modulation color for alpha-testable/colored-transparent casters.
    Transparent,
    /// Depth-only, rendered from the coarser occlusion-mesh stream, used to spatially modulate
    /// the fixed ambient term (§2b's supplemented behavior).
    Ambient,
}

/// Which of the three slots inside a tier a map belongs to (§GLOSSARY).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum ShadowSlotKind {
    Static,
    Dynamic,
    Temporary,
}

/// Geometry for one cube-map face render pass: the direction to look and the up vector, in the
/// conventional cube-map face order matching [`crate::collide_list::cube_face_mask_for`].
#[derive(Debug, Copy, Clone)]
pub struct CubeFaceDescriptor {
    pub face: CubeMapFace,
    pub look: Vector3<f32>,
    pub up: Vector3<f32>,
}

impl CubeFaceDescriptor {
    /// The six faces, in bitmask order (+X, -X, +Y, -Y, +Z, -Z).
    pub fn cube_faces() -> [CubeFaceDescriptor; 6] {
        [
            CubeFaceDescriptor {
                face: CubeMapFace::PositiveX,
                look: Vector3::new(1.0, 0.0, 0.0),
                up: Vector3::new(0.0, -1.0, 0.0),
            },
            CubeFaceDescriptor {
                face: CubeMapFace::NegativeX,
                look: Vector3::new(-1.0, 0.0, 0.0),
                up: Vector3::new(0.0, -1.0, 0.0),
            },
            CubeFaceDescriptor {
                face: CubeMapFace::PositiveY,
                look: Vector3::new(0.0, 1.0, 0.0),
                up: Vector3::new(0.0, 0.0, 1.0),
            },
            CubeFaceDescriptor {
                face: CubeMapFace::NegativeY,
                look: Vector3::new(0.0, -1.0, 0.0),
                up: Vector3::new(0.0, 0.0, -1.0),
            },
            CubeFaceDescriptor {
                face: CubeMapFace::PositiveZ,
                look: Vector3::new(0.0, 0.0, 1.0),
                up: Vector3::new(0.0, -1.0, 0.0),
            },
            CubeFaceDescriptor {
                face: CubeMapFace::NegativeZ,
                look: Vector3::new(0.0, 0.0, -1.0),
                up: Vector3::new(0.0, -1.0, 0.0),
            },
        ]
    }
}

/// Whether a tier's map is a flat 2D depth map (spot/projector/sky) or a depth cube (point
/// lights).
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ShadowMapShape {
    Flat,
    Cube,
}

/// Which GPU code path renders a cube shadow map: a single layered pass writing all six faces
/// from one render task via a geometry-shader face selection, or six independent per-face passes
/// (§4.6). Flat maps never consult this; they always render as a single pass.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ShadowRenderPath {
    Layered,
    PerFace,
}

/// Picks the code path for a cube shadow render from the active backend's layered-rendering
/// capability.
pub fn select_shadow_render_path(shape: ShadowMapShape, layered_rendering_supported: bool) -> ShadowRenderPath {
    if shape == ShadowMapShape::Cube && layered_rendering_supported {
        ShadowRenderPath::Layered
    } else {
        ShadowRenderPath::PerFace
    }
}

/// The depth value that represents "nothing rendered here yet": `0.0` under reversed/inverse
/// depth, `1.0` for a conventional depth buffer (§4.6 step 2).
pub fn inverse_depth_clear_value(inverse_depth: bool) -> f32 {
    if inverse_depth {
        0.0
    } else {
        1.0
    }
}

/// Bakes a polygon-offset bias into a light's projection matrix by nudging the eye-space Z of
/// every vertex before projection, the way this crate applies [`crate::pipeline::PipelineConfig::
/// polygon_offset_factor`] since `DrawParameters` has no native rasterizer-level offset to carry
/// it instead (§4.6 step 3). Pushes casters away from the light so self-shadowing acne at a
/// grazing angle clears the compare against the already-written depth.
pub fn bake_polygon_offset(projection: Matrix4<f32>, factor: (f32, f32), inverse_depth: bool) -> Matrix4<f32> {
    let (slope_scale, constant) = factor;
    let bias = constant + slope_scale;
    let sign = if inverse_depth { 1.0 } else { -1.0 };
    projection * Matrix4::new_translation(&Vector3::new(0.0, 0.0, sign * bias))
}

/// View matrix looking out of `position` along one cube face's direction, used to build the
/// per-face view-projection for a point-light cube shadow render (§4.6).
pub fn cube_face_view_matrix(position: Vector3<f32>, face: &CubeFaceDescriptor) -> Matrix4<f32> {
    Matrix4::look_at_lh(
        &Point3::from(position),
        &Point3::from(position + face.look),
        &face.up,
    )
}

/// Renders one depth-only submission of a shadow tier into `framebuffer`: activates the cube face
/// (if any), clears depth (plus color for the [`ShadowTier::Transparent`] tier) with an
/// inverse-depth-aware clear value, builds the combined solid/double-sided depth task from
/// `collide_list` and executes it (§4.6 steps 1, 2, 4 and 5). `cube_face` is `(bit index, face)`
/// from [`CubeFaceDescriptor::cube_faces`]; `None` renders a flat map.
#[allow(clippy::too_many_arguments)]
pub fn render_shadow_face<D: Drawable>(
    server: &dyn GraphicsServer,
    framebuffer: &GpuFrameBuffer,
    viewport: Rect<i32>,
    cube_face: Option<(u8, CubeMapFace)>,
    tier: ShadowTier,
    pipeline: &Rc<Pipeline>,
    tuc: &Rc<TextureUnitConfig>,
    layer_mask: u32,
    task: &mut RenderTask,
    collide_list: &CollideList<D>,
    targets: &TextureTargetMap,
    samplers: &mut SamplerCache,
    row_of: &mut dyn FnMut(&D) -> InstanceRow,
    geometry_of: &dyn Fn(&D) -> GpuGeometryBuffer,
    buffer_of: &dyn Fn(ParamBlockHandle) -> (GpuBuffer, BufferDataUsage),
) -> Result<BindStatistics, RenderError> {
    if let Some((_, face)) = cube_face {
        framebuffer.set_cubemap_face(0, face);
    }
    let clear_depth = inverse_depth_clear_value(pipeline.config.inverse_depth);
    let clear_color = (tier == ShadowTier::Transparent).then_some(Color::TRANSPARENT);
    framebuffer.clear(viewport, clear_color, Some(clear_depth), None);

    task.clear();
    let pass = match tier {
        ShadowTier::Solid => RenderPass::ShadowSolid,
        ShadowTier::Transparent => RenderPass::ShadowTransparent,
        ShadowTier::Ambient => RenderPass::ShadowAmbient,
    };
    let filter = RenderTaskFilter::for_combined_shadow_depth(pass, layer_mask);
    {
        let mut add = AddToRenderTask::new(task, filter);
        for entry in collide_list.components() {
            let drawable = &entry.object;
            if !filter.accepts(drawable.flags(), layer_mask) {
                continue;
            }
            if let Some((bit, _)) = cube_face {
                if drawable.cube_face_mask() & (1 << bit) == 0 {
                    continue;
                }
            }
            let row = row_of(drawable);
            add.add(
                drawable,
                layer_mask,
                pipeline,
                tuc,
                ElementKind::Triangle,
                row,
                || geometry_of(drawable),
            );
        }
    }

    let draw_params = pipeline.config.to_draw_parameters();
    executor::execute(
        server,
        framebuffer,
        viewport,
        task,
        &draw_params,
        targets,
        samplers,
        buffer_of,
    )
}

/// One GPU-backed shadow map slot and its bookkeeping (§4.5).
pub struct ShadowSlot {
    texture: Option<GpuTexture>,
    /// Color texture alongside the depth texture; only populated for [`ShadowTier::Transparent`].
    color_texture: Option<GpuTexture>,
    size: usize,
    shape: ShadowMapShape,
    mipmapped: bool,
    inverse_depth: bool,
    /// Reset at most once per frame; gates whether a Dynamic slot actually needs to be re-rendered
    /// this frame even though it is rebuilt-on-demand every frame in principle.
    dirty_dynamic: bool,
    /// Frames since this slot was last touched (read from or rendered into). Used by the aging
    /// policy to reclaim slots nobody has asked for in a while.
    last_use_static: u32,
    last_use_dynamic: u32,
}

impl ShadowSlot {
    fn empty(shape: ShadowMapShape) -> Self {
        Self {
            texture: None,
            color_texture: None,
            size: 0,
            shape,
            mipmapped: false,
            inverse_depth: false,
            dirty_dynamic: true,
            last_use_static: 0,
            last_use_dynamic: 0,
        }
    }

    /// `true` if this slot currently has a map of the requested size; per §3's invariant (i), a
    /// mismatch must drop the slot and force a rebuild.
    pub fn matches_size(&self, requested_size: usize) -> bool {
        self.texture.is_some() && self.size == requested_size
    }

    /// Drops the cached map so the caller is forced to rebuild it at `requested_size`.
    pub fn invalidate(&mut self) {
        self.texture = None;
        self.color_texture = None;
        self.size = 0;
    }

    pub fn texture(&self) -> Option<&GpuTexture> {
        self.texture.as_ref()
    }

    pub fn color_texture(&self) -> Option<&GpuTexture> {
        self.color_texture.as_ref()
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Ensures a depth (and, for the Transparent tier, color) texture of `size` exists, creating
    /// one if the slot is empty or was invalidated by a size mismatch. Returns `true` if a new
    /// texture was created (the caller must re-render the full map).
    pub fn ensure_allocated(
        &mut self,
        server: &dyn GraphicsServer,
        size: usize,
        precision_bits: PixelKind,
        with_color: bool,
        inverse_depth: bool,
    ) -> Result<bool, RenderError> {
        if self.matches_size(size) && with_color == self.color_texture.is_some() {
            return Ok(false);
        }
        if size == 0 {
            return Err(RenderError::Parameter(
                "shadow map size must be non-zero".into(),
            ));
        }
        if self.texture.is_some() {
            Log::writeln(
                MessageKind::Information,
                format!(
                    "Shadow slot resized from {} to {}, dropping cached map and forcing a rebuild",
                    self.size, size
                ),
            );
        }
        let kind = match self.shape {
            ShadowMapShape::Flat => GpuTextureKind::Rectangle {
                width: size,
                height: size,
            },
            ShadowMapShape::Cube => GpuTextureKind::Cube {
                width: size,
                height: size,
            },
        };
        self.texture = Some(server.create_texture(GpuTextureDescriptor {
            kind,
            pixel_kind: precision_bits,
            ..Default::default()
        })?);
        self.color_texture = if with_color {
            Some(server.create_texture(GpuTextureDescriptor {
                kind,
                pixel_kind: PixelKind::RGBA8,
                ..Default::default()
            })?)
        } else {
            None
        };
        self.size = size;
        self.inverse_depth = inverse_depth;
        self.dirty_dynamic = true;
        Ok(true)
    }

    /// Called once per frame by the Dynamic slot's owner at frame start: the dynamic map is
    /// eligible to be re-rendered again, having been marked clean at the end of the previous
    /// frame's render.
    pub fn mark_dynamic_dirty(&mut self) {
        self.dirty_dynamic = true;
    }

    pub fn is_dynamic_dirty(&self) -> bool {
        self.dirty_dynamic
    }

    /// Marks the Dynamic slot as rendered this frame, so a second request within the same frame
    /// does not re-render it (§4.5: "rebuilds are gated by dirtyDynamic, reset at most once per
    /// frame").
    pub fn clear_dynamic_dirty(&mut self) {
        self.dirty_dynamic = false;
        self.last_use_dynamic = 0;
    }

    pub fn touch_static(&mut self) {
        self.last_use_static = 0;
    }

    /// Advances the aging counters; called once per frame for every slot that was *not* touched
    /// this frame.
    pub fn age(&mut self) {
        self.last_use_static = self.last_use_static.saturating_add(1);
        self.last_use_dynamic = self.last_use_dynamic.saturating_add(1);
    }

    pub fn last_use_static(&self) -> u32 {
        self.last_use_static
    }
}

/// Per-light aggregate owning the Solid/Transparent/Ambient tiers (§3 "Shadow caster").
pub struct ShadowCaster {
    shape: ShadowMapShape,
    pub shadow_type: ShadowType,
    pub solid: TierSlots,
    pub transparent: TierSlots,
    pub ambient: TierSlots,
    /// Whether this caster has any caster at all flagged transparent this frame; the renderer
    /// skips the Transparent tier entirely when this is `false` (§4.6 step 6).
    pub has_transparent_casters: bool,
}

/// The Static/Dynamic/Temporary slots shared by every tier.
pub struct TierSlots {
    pub static_slot: ShadowSlot,
    pub dynamic_slot: ShadowSlot,
    pub temporary_slot: Option<ShadowSlot>,
}

impl TierSlots {
    fn new(shape: ShadowMapShape) -> Self {
        Self {
            static_slot: ShadowSlot::empty(shape),
            dynamic_slot: ShadowSlot::empty(shape),
            temporary_slot: None,
        }
    }
}

impl ShadowCaster {
    pub fn new(shape: ShadowMapShape) -> Self {
        Self {
            shape,
            shadow_type: ShadowType::default(),
            solid: TierSlots::new(shape),
            transparent: TierSlots::new(shape),
            ambient: TierSlots::new(shape),
            has_transparent_casters: false,
        }
    }

    pub fn shape(&self) -> ShadowMapShape {
        self.shape
    }

    fn tier_mut(&mut self, tier: ShadowTier) -> &mut TierSlots {
        match tier {
            ShadowTier::Solid => &mut self.solid,
            ShadowTier::Transparent => &mut self.transparent,
            ShadowTier::Ambient => &mut self.ambient,
        }
    }

    /// Effective shadow type for this frame: an active `force_shadow_type` plan override always
    /// wins, and any layer-mask-restricted (temporary) render always uses `DynamicOnly` per §3's
    /// invariant (iii).
    pub fn effective_shadow_type(
        &self,
        force: Option<ShadowType>,
        layer_mask_refiltered: bool,
    ) -> ShadowType {
        if layer_mask_refiltered {
            return ShadowType::DynamicOnly;
        }
        force.unwrap_or(self.shadow_type)
    }

    /// Runs the per-frame aging pass over every slot in every tier, incrementing `last_use_*`
    /// counters for slots not explicitly touched by the caller this frame (§4.5's aging policy).
    /// The caller is responsible for calling `touch_static`/`clear_dynamic_dirty` *before* this
    /// runs for any slot that *was* used.
    pub fn age_untouched(&mut self) {
        for tier in [
            &mut self.solid,
            &mut self.transparent,
            &mut self.ambient,
        ] {
            tier.static_slot.age();
            tier.dynamic_slot.age();
        }
    }

    /// Ensures the requested tier/slot has a map of `size` allocated, dropping and recreating it
    /// if the stored size does not match (§3 invariant (i)). Returns whether a rebuild is needed.
    pub fn ensure_slot(
        &mut self,
        server: &dyn GraphicsServer,
        tier: ShadowTier,
        slot: ShadowSlotKind,
        size: usize,
        precision_bits: PixelKind,
        inverse_depth: bool,
    ) -> Result<bool, RenderError> {
        let with_color = tier == ShadowTier::Transparent;
        let tier_slots = self.tier_mut(tier);
        let target = match slot {
            ShadowSlotKind::Static => &mut tier_slots.static_slot,
            ShadowSlotKind::Dynamic => &mut tier_slots.dynamic_slot,
            ShadowSlotKind::Temporary => {
                let s = tier_slots
                    .temporary_slot
                    .get_or_insert_with(|| ShadowSlot::empty(self.shape));
                s
            }
        };
        target.ensure_allocated(server, size, precision_bits, with_color, inverse_depth)
    }

    /// Releases the Temporary slot back to the pool, matching §4.5's "acquired from a pool each
    /// frame and returned at end of frame".
    pub fn release_temporary(&mut self, tier: ShadowTier) {
        self.tier_mut(tier).temporary_slot = None;
    }
}

/// Pool of reusable Temporary shadow-map allocations, shared by every light that needs a one-shot
/// map this frame (masked reflection renders, etc.); borrowed at the start of use and returned at
/// end-of-frame, so the pool never grows past the peak concurrent temporary usage.
#[derive(Default)]
pub struct TemporaryShadowMapPool {
    free: Vec<ShadowSlot>,
}

impl TemporaryShadowMapPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Borrows a slot, reusing a freed one if its shape matches.
    pub fn acquire(&mut self, shape: ShadowMapShape) -> ShadowSlot {
        if let Some(index) = self.free.iter().position(|s| s.shape == shape) {
            self.free.remove(index)
        } else {
            ShadowSlot::empty(shape)
        }
    }

    /// Returns a slot at end-of-frame, keeping its GPU texture allocation alive for reuse next
    /// frame instead of freeing and reallocating every frame.
    pub fn release(&mut self, slot: ShadowSlot) {
        self.free.push(slot);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layer_mask_refilter_forces_dynamic_only() {
        let caster = ShadowCaster::new(ShadowMapShape::Cube);
        assert_eq!(
            caster.effective_shadow_type(None, true),
            ShadowType::DynamicOnly
        );
    }

    #[test]
    fn force_shadow_type_overrides_light_preference() {
        let mut caster = ShadowCaster::new(ShadowMapShape::Flat);
        caster.shadow_type = ShadowType::StaticOnly;
        assert_eq!(
            caster.effective_shadow_type(Some(ShadowType::StaticAndDynamic), false),
            ShadowType::StaticAndDynamic
        );
    }

    #[test]
    fn empty_slot_never_matches_any_size() {
        let slot = ShadowSlot::empty(ShadowMapShape::Flat);
        assert!(!slot.matches_size(512));
        assert!(!slot.matches_size(0));
    }

    #[test]
    fn aging_increments_both_counters_until_touched() {
        let mut slot = ShadowSlot::empty(ShadowMapShape::Flat);
        slot.age();
        slot.age();
        assert_eq!(slot.last_use_static(), 2);
        slot.touch_static();
        assert_eq!(slot.last_use_static(), 0);
    }

    #[test]
    fn cube_faces_cover_all_six_bits_of_the_face_mask_order() {
        let faces = CubeFaceDescriptor::cube_faces();
        assert_eq!(faces.len(), 6);
        assert_eq!(faces[0].face, CubeMapFace::PositiveX);
        assert_eq!(faces[5].face, CubeMapFace::NegativeZ);
    }

    #[test]
    fn inverse_depth_clears_to_zero_instead_of_one() {
        assert_eq!(inverse_depth_clear_value(false), 1.0);
        assert_eq!(inverse_depth_clear_value(true), 0.0);
    }

    #[test]
    fn cube_map_always_prefers_layered_when_supported() {
        assert_eq!(
            select_shadow_render_path(ShadowMapShape::Cube, true),
            ShadowRenderPath::Layered
        );
        assert_eq!(
            select_shadow_render_path(ShadowMapShape::Cube, false),
            ShadowRenderPath::PerFace
        );
    }

    #[test]
    fn flat_maps_never_use_the_layered_path() {
        assert_eq!(
            select_shadow_render_path(ShadowMapShape::Flat, true),
            ShadowRenderPath::PerFace
        );
    }

    #[test]
    fn polygon_offset_bias_flips_sign_under_inverse_depth() {
        let projection = Matrix4::identity();
        let regular = bake_polygon_offset(projection, (1.0, 1.0), false);
        let inverse = bake_polygon_offset(projection, (1.0, 1.0), true);
        // The translation component is negated between the two conventions; since the input
        // projection is the identity, the resulting Z translation entry is directly comparable.
        assert_eq!(regular[(2, 3)], -inverse[(2, 3)]);
        assert_ne!(regular, Matrix4::identity());
    }

    #[test]
    fn cube_face_view_matrix_looks_along_the_face_direction() {
        let faces = CubeFaceDescriptor::cube_faces();
        let view = cube_face_view_matrix(Vector3::new(0.0, 0.0, 0.0), &faces[0]);
        let forward = view.transform_vector(&faces[0].look);
        // Looking down its own forward axis must project to the camera-space +Z (or -Z,
        // depending on handedness) rather than sideways.
        assert!(forward.x.abs() < 1e-4 && forward.y.abs() < 1e-4);
    }
}
