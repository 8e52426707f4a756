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

//! The debug-information surface from §6: a per-frame counter tree the orchestrator fills in as
//! it runs and exposes read-only after the frame, mirroring
//! `fyrox-impl::renderer::stats::SceneStatistics`.

pub use crate::gapi::stats::PipelineStatistics;
use std::fmt::{Display, Formatter};
use std::ops::AddAssign;

/// Bind counts for one frame, used to check the "no duplicate binds" testable property in §8.
#[derive(Debug, Copy, Clone, Default)]
pub struct BindStatistics {
    pub pipeline_binds: usize,
    pub tuc_binds: usize,
    pub vao_binds: usize,
    pub draw_calls: usize,
    pub triangles_rendered: usize,
}

impl AddAssign for BindStatistics {
    fn add_assign(&mut self, rhs: Self) {
        self.pipeline_binds += rhs.pipeline_binds;
        self.tuc_binds += rhs.tuc_binds;
        self.vao_binds += rhs.vao_binds;
        self.draw_calls += rhs.draw_calls;
        self.triangles_rendered += rhs.triangles_rendered;
    }
}

/// How many lights of each type were rendered, and how many of their shadow maps were rebuilt.
#[derive(Debug, Copy, Clone, Default)]
pub struct LightingStatistics {
    pub point_lights_rendered: usize,
    pub spot_lights_rendered: usize,
    pub projector_lights_rendered: usize,
    pub sky_lights_rendered: usize,
    pub shadow_maps_rebuilt_this_frame: usize,
    pub gi_probes_relit_this_frame: usize,
}

impl AddAssign for LightingStatistics {
    fn add_assign(&mut self, rhs: Self) {
        self.point_lights_rendered += rhs.point_lights_rendered;
        self.spot_lights_rendered += rhs.spot_lights_rendered;
        self.projector_lights_rendered += rhs.projector_lights_rendered;
        self.sky_lights_rendered += rhs.sky_lights_rendered;
        self.shadow_maps_rebuilt_this_frame += rhs.shadow_maps_rebuilt_this_frame;
        self.gi_probes_relit_this_frame += rhs.gi_probes_relit_this_frame;
    }
}

/// Accumulated per-frame debug information; see §4.11 and §6's "hierarchical debug-information
/// tree". The orchestrator owns one instance, resets it at the start of each frame, and hands out
/// `&mut` slices of it to each pass as the frame runs.
#[derive(Debug, Copy, Clone, Default)]
pub struct DebugInfo {
    pub objects_rendered: usize,
    pub lights_rendered: usize,
    pub binds: BindStatistics,
    pub lighting: LightingStatistics,
    pub pipeline: PipelineStatistics,
}

impl DebugInfo {
    /// Resets every counter to zero; called once at the start of each frame by the orchestrator.
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

impl AddAssign<BindStatistics> for DebugInfo {
    fn add_assign(&mut self, rhs: BindStatistics) {
        self.binds += rhs;
    }
}

impl AddAssign<LightingStatistics> for DebugInfo {
    fn add_assign(&mut self, rhs: LightingStatistics) {
        self.lighting += rhs;
    }
}

impl Display for DebugInfo {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "RenderedObjects: {}\nRenderedLights: {}\nDrawCalls: {}\nTriangles: {}\n\
            PipelineBinds: {}\nTUCBinds: {}\nVAOBinds: {}\nShadowMapsRebuilt: {}\nGIProbesRelit: {}\n",
            self.objects_rendered,
            self.lights_rendered,
            self.binds.draw_calls,
            self.binds.triangles_rendered,
            self.binds.pipeline_binds,
            self.binds.tuc_binds,
            self.binds.vao_binds,
            self.lighting.shadow_maps_rebuilt_this_frame,
            self.lighting.gi_probes_relit_this_frame,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reset_clears_every_counter() {
        let mut info = DebugInfo {
            objects_rendered: 5,
            ..Default::default()
        };
        info.binds.draw_calls = 3;
        info.reset();
        assert_eq!(info.objects_rendered, 0);
        assert_eq!(info.binds.draw_calls, 0);
    }
}
