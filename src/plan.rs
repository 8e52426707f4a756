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

//! The render plan: an immutable-per-frame description of the camera, viewport and lighting
//! options that the scene traversal produces and the [`crate::orchestrator::PlanOrchestrator`]
//! consumes. Lives for exactly one frame.

use crate::collide_list::CollideList;
use crate::core::{
    algebra::Matrix4,
    math::{frustum::Frustum, Rect},
};
use crate::shadow::ShadowType;

/// Stereo submission mode a plan was built for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StereoMode {
    /// Single eye, ordinary monoscopic rendering.
    #[default]
    Mono,
    /// Two eyes, single-pass vertex-shader instanced stereo (`VS_RENDER_STEREO`).
    VertexShaderStereo,
    /// Two eyes, single-pass geometry-shader layered stereo (`GS_RENDER_STEREO`).
    GeometryShaderStereo,
}

impl StereoMode {
    /// Whether this mode renders both eyes from one render task submission.
    pub fn is_single_pass(self) -> bool {
        !matches!(self, StereoMode::Mono)
    }
}

/// Per-frame toggles that affect which passes the orchestrator runs, independent of what is
/// actually visible.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct LightingOptions {
    /// Disables the reflection/GI pass entirely for this frame (e.g. a reflection probe render
    /// of the scene must not recurse into its own reflections).
    pub no_reflections: bool,
    /// Disables the fixed ambient term.
    pub no_ambient: bool,
    /// When set, forces every light to use this shadow type for the frame regardless of its own
    /// per-light preference (used by masked/temporary renders, see §4.5).
    pub force_shadow_type: Option<ShadowType>,
}

/// Projection matrix pair: a regular finite-far-plane projection and an infinite/inverse-depth
/// variant used when the capability is available and enabled.
#[derive(Debug, Clone, Copy)]
pub struct ProjectionSet {
    /// Regular, finite far-plane projection matrix.
    pub regular: Matrix4<f32>,
    /// Infinite-far-plane, inverse-depth projection matrix. `None` if the capability or setting
    /// is not in use this frame.
    pub infinite_inverse_depth: Option<Matrix4<f32>>,
}

impl ProjectionSet {
    /// Returns the inverse-depth variant if present, else the regular one, and reports whether
    /// inverse depth is active. This is the single place pass code should ask "which projection
    /// do I use", so inverse-depth clear/compare flips stay consistent everywhere.
    pub fn active(&self) -> (Matrix4<f32>, bool) {
        match self.infinite_inverse_depth {
            Some(m) => (m, true),
            None => (self.regular, false),
        }
    }
}

/// Immutable-per-frame description of camera, viewport, stereo mode, projection, frustum, layer
/// mask, flip-culling flag, collide list and lighting options. Produced by the scene traversal,
/// consumed by the [`crate::orchestrator::PlanOrchestrator`], destroyed at end of frame.
pub struct RenderPlan {
    /// Left-eye (or mono) view matrix.
    pub view: Matrix4<f32>,
    /// Right-eye view matrix; equals `view` in [`StereoMode::Mono`].
    pub view_right: Matrix4<f32>,
    /// Projection matrices, see [`ProjectionSet`].
    pub projection: ProjectionSet,
    /// Viewport rectangle in pixels.
    pub viewport: Rect<i32>,
    /// Stereo submission mode.
    pub stereo: StereoMode,
    /// View frustum, built from `view * projection.active().0`.
    pub frustum: Frustum,
    /// Bitmask of visible layers; components outside this mask are never collected.
    pub layer_mask: u32,
    /// Whether winding/culling should be flipped (used when rendering into a mirrored target).
    pub flip_culling: bool,
    /// The visible-object collide list for this frame.
    pub collide_list: CollideList,
    /// Per-frame lighting toggles.
    pub lighting: LightingOptions,
}

impl RenderPlan {
    /// Combined view-projection matrix using the active (possibly inverse-depth) projection.
    pub fn view_projection(&self) -> Matrix4<f32> {
        self.projection.active().0 * self.view
    }
}
