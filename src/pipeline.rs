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

//! The top level of the render-task tree: the full rasterization state plus shader program a
//! batch of draws shares. Pipelines are content-addressed and cached so that two draws asking for
//! the same configuration always get back the identical, already-bound-ready `Pipeline`.

use crate::gapi::{
    ColorMask, CompareFunc, CullFace, DrawParameters, GpuProgram, StencilFunc, StencilOp,
};
use fxhash::FxHashMap;
use std::rc::Rc;

/// Everything about one pipeline's rasterization state that participates in its cache identity.
/// Mirrors `fyrox_graphics::DrawParameters` field-for-field, plus the extra knobs the render task
/// tree needs that the graphics abstraction layer does not model directly.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    /// Depth comparison function, or `None` to disable the depth test.
    pub depth_test: Option<CompareFunc>,
    /// Whether depth values are written back to the depth buffer.
    pub depth_write: bool,
    /// Color/alpha channel write mask.
    pub color_write: ColorMask,
    /// Face culling mode, or `None` to disable culling.
    pub cull_face: Option<CullFace>,
    /// Blend function, or `None` to disable blending.
    pub blend: Option<crate::gapi::BlendParameters>,
    /// Stencil test function, or `None` to disable the stencil test.
    pub stencil_test: Option<StencilFunc>,
    /// Stencil read/write operation.
    pub stencil_op: StencilOp,
    /// Depth-bias applied by baking it into the projection matrix at draw-submission time, since
    /// `DrawParameters` has no native polygon-offset field. Kept here so the pipeline key still
    /// captures "this pipeline renders with bias X" even though the actual effect is applied
    /// upstream of `DrawParameters`.
    pub polygon_offset_factor: Option<(f32, f32)>,
    /// `true` when this pipeline was built for a reversed/inverse-depth projection (clip-space Z
    /// in `[1, 0]` instead of `[-1, 1]`); flips the default depth-test direction and clear value
    /// at the sites that build `DrawParameters` from this config.
    pub inverse_depth: bool,
    /// Vertices per patch for tessellation pipelines, `None` for ordinary triangle pipelines.
    pub patch_vertex_count: Option<u32>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            depth_test: Some(CompareFunc::Less),
            depth_write: true,
            color_write: ColorMask::default(),
            cull_face: Some(CullFace::Back),
            blend: None,
            stencil_test: None,
            stencil_op: StencilOp::default(),
            polygon_offset_factor: None,
            inverse_depth: false,
            patch_vertex_count: None,
        }
    }
}

impl PipelineConfig {
    /// Builds the `DrawParameters` this configuration maps to, flipping the depth compare
    /// function when `inverse_depth` is set (reversed-Z uses `Greater`/`GreaterOrEqual` where a
    /// regular depth buffer uses `Less`/`LessOrEqual`).
    pub fn to_draw_parameters(&self) -> DrawParameters {
        let depth_test = self.depth_test.map(|cmp| {
            if self.inverse_depth {
                flip_for_inverse_depth(cmp)
            } else {
                cmp
            }
        });
        DrawParameters {
            cull_face: self.cull_face,
            color_write: self.color_write,
            depth_write: self.depth_write,
            stencil_test: self.stencil_test,
            depth_test,
            blend: self.blend.clone(),
            stencil_op: self.stencil_op,
            scissor_box: None,
        }
    }
}

fn flip_for_inverse_depth(cmp: CompareFunc) -> CompareFunc {
    match cmp {
        CompareFunc::Less => CompareFunc::Greater,
        CompareFunc::LessOrEqual => CompareFunc::GreaterOrEqual,
        CompareFunc::Greater => CompareFunc::Less,
        CompareFunc::GreaterOrEqual => CompareFunc::LessOrEqual,
        other => other,
    }
}

/// Per-draw instance indexing parameters a pipeline may carry: the base index into the SPBL
/// instance array (`SPBInstanceIndexBase`) and a `DrawID` offset for multi-draw-indirect
/// submissions where `gl_DrawID` needs to be remapped into the same instance array.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct InstanceIndexing {
    /// Base offset added to `gl_InstanceID` before indexing the shared parameter block's
    /// per-instance array.
    pub instance_index_base: Option<u32>,
    /// Offset added to `gl_DrawID` for multi-draw-indirect submissions.
    pub draw_id_offset: Option<u32>,
}

/// A compiled program, a fixed rasterization state and optional instance-indexing parameters,
/// shared by every draw that asks for the identical configuration.
#[derive(Clone)]
pub struct Pipeline {
    /// Compiled shader program.
    pub program: GpuProgram,
    /// Rasterization state.
    pub config: PipelineConfig,
    /// Instance-indexing parameters, if this pipeline is used for instanced/multi-draw rendering.
    pub instancing: InstanceIndexing,
}

#[derive(Clone, PartialEq)]
struct PipelineKey {
    program_ptr: usize,
    config: PipelineConfig,
    instancing: InstanceIndexing,
}

impl std::hash::Hash for PipelineKey {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.program_ptr.hash(state);
        // PipelineConfig/InstanceIndexing are PartialEq-only (they embed floats), so hash on the
        // bit patterns of their constituent fields instead of deriving Hash on the structs.
        self.config.depth_test.hash(state);
        self.config.depth_write.hash(state);
        self.config.cull_face.hash(state);
        self.config.stencil_test.hash(state);
        self.config.stencil_op.hash(state);
        self.config.inverse_depth.hash(state);
        self.config.patch_vertex_count.hash(state);
        self.instancing.hash(state);
    }
}

impl Eq for PipelineKey {}

/// Content-addressed cache of [`Pipeline`]s. Two requests for the identical program + config +
/// instancing parameters return the same `Pipeline` without re-deriving `DrawParameters`.
#[derive(Default)]
pub struct PipelineCache {
    entries: FxHashMap<usize, Vec<(PipelineKey, Rc<Pipeline>)>>,
}

impl PipelineCache {
    /// Creates an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cached pipeline for this configuration, building and inserting it if absent.
    pub fn get_or_insert_with(
        &mut self,
        program: &GpuProgram,
        config: PipelineConfig,
        instancing: InstanceIndexing,
    ) -> Rc<Pipeline> {
        let program_ptr = Rc::as_ptr(&program.0) as *const () as usize;
        let key = PipelineKey {
            program_ptr,
            config: config.clone(),
            instancing,
        };
        let bucket = self.entries.entry(program_ptr).or_default();
        if let Some((_, pipeline)) = bucket.iter().find(|(k, _)| *k == key) {
            return pipeline.clone();
        }
        let pipeline = Rc::new(Pipeline {
            program: program.clone(),
            config,
            instancing,
        });
        bucket.push((key, pipeline.clone()));
        pipeline
    }

    /// Number of distinct pipelines currently cached, across all programs.
    pub fn len(&self) -> usize {
        self.entries.values().map(|v| v.len()).sum()
    }

    /// `true` if no pipelines are cached.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drops every cached pipeline. Call when a shader hot-reload invalidates program identities.
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inverse_depth_flips_less_to_greater() {
        assert_eq!(flip_for_inverse_depth(CompareFunc::Less), CompareFunc::Greater);
        assert_eq!(
            flip_for_inverse_depth(CompareFunc::LessOrEqual),
            CompareFunc::GreaterOrEqual
        );
        assert_eq!(flip_for_inverse_depth(CompareFunc::Greater), CompareFunc::Less);
    }

    #[test]
    fn default_config_is_opaque_depth_tested_back_culled() {
        let config = PipelineConfig::default();
        assert_eq!(config.depth_test, Some(CompareFunc::Less));
        assert!(config.depth_write);
        assert_eq!(config.cull_face, Some(CullFace::Back));
    }
}
