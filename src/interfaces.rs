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

//! Contracts this crate uses to talk to things it does not own: the scene graph, the
//! shader-source compilation system and resource loaders. None of those are part of this crate;
//! by making them traits, the render-task pipeline has no compile-time dependency on a concrete
//! scene-graph or asset crate, the same way `fyrox_graphics` has no dependency on `fyrox-impl`'s
//! scene types.

use crate::core::{algebra::Matrix4, math::aabb::AxisAlignedBoundingBox};
use crate::error::RenderError;
use crate::gapi::GpuProgram;
use crate::gpu::GraphicsServer;
use bitflags::bitflags;
use fxhash::FxHashMap;

/// Requests a compiled GPU program by symbolic shader-source name and a set of preprocessor
/// defines, e.g. `("DefRen Shape", &["INVERSE_DEPTH", "GS_RENDER_CUBE"])`. The concrete shader
/// source compilation system lives outside this crate.
pub trait ShaderSourceProvider {
    /// Compiles (or returns an already compiled) program for the given symbolic name and define
    /// set. The returned program's binary identity should be stable for the same inputs so the
    /// [`crate::pipeline::PipelineCache`] can safely cache around it.
    fn program(
        &self,
        server: &dyn GraphicsServer,
        symbolic_name: &str,
        defines: &[&str],
    ) -> Result<GpuProgram, RenderError>;
}

/// Stable identity of a drawable's geometry, used as the VAO level of the render-task tree. Two
/// drawables that reference the same mesh/index data share identity here.
pub type GeometryId = u64;

/// Stable identity of a drawable's shared per-instance descriptor (material + skin + render
/// path). Used to detect whether two draws coalesce into a single instanced leaf.
pub type InstanceSharedId = u64;

bitflags! {
    /// Flags a scene-graph drawable exposes about itself; the render task builder's filters (§4.3)
    /// consult these instead of reaching into the scene graph's own material/skin types.
    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
    pub struct DrawableFlags: u8 {
        /// The skin texture has an alpha channel that participates in blending (puts the
        /// drawable in the transparent partition instead of solid).
        const TRANSPARENT = 0b0000_0001;
        /// Casts no shadow at all; excluded by the shadow-none filter.
        const SHADOW_NONE = 0b0000_0010;
        /// Must never appear in reflection probe renders.
        const NOT_REFLECTED = 0b0000_0100;
        /// Render both faces (used for the double-sided depth-only bucket).
        const DOUBLE_SIDED = 0b0000_1000;
        /// Is a decal (participates only in the decal pass).
        const DECAL = 0b0001_0000;
        /// Is itself a render target of a dynamically-rendered pass (e.g. a portal camera);
        /// skipped when rendering into that same target would create a feedback loop.
        const DYNAMICALLY_RENDERED = 0b0010_0000;
        /// Matches the outline predicate for the outline pass.
        const OUTLINE = 0b0100_0000;
    }
}

/// One entity a [`crate::render_task::builder::RenderTaskBuilder`] can add to a render task. This
/// is the minimal contract `AddToRenderTask` needs from a scene-graph node; everything about how
/// the node is authored, animated or edited lives outside this crate.
pub trait Drawable {
    /// Stable identity of this drawable's vertex/index data.
    fn geometry_id(&self) -> GeometryId;
    /// Stable identity of the shared per-instance descriptor (material, skin, render path).
    fn instance_shared_id(&self) -> InstanceSharedId;
    /// World transform.
    fn world_transform(&self) -> Matrix4<f32>;
    /// Number of indices/points to draw, or `None` to draw the full buffer.
    fn element_count(&self) -> Option<u32>;
    /// Filter flags, see [`DrawableFlags`].
    fn flags(&self) -> DrawableFlags;
    /// World-space bounding box, used by occlusion and cube-face visibility tests.
    fn world_bounding_box(&self) -> AxisAlignedBoundingBox;
    /// Six-bit cube-face visibility mask cached on the collide list entry for this drawable
    /// against the currently active point-light cube render. Bit `i` set means face `i` is
    /// touched by this drawable's bounding box.
    fn cube_face_mask(&self) -> u8;
}

/// A cheap lookup from symbolic texture-unit semantic name (`"ColorCubemap"`, `"Shadow1SolidDepth"`,
/// ...) to a texture-unit slot index, published per shader variant, per §6.
pub type TextureTargetMap = FxHashMap<&'static str, u32>;
