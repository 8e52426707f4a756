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

//! Walks a [`super::RenderTask`] and submits its draws, binding a pipeline/TUC/VAO only when it
//! actually changes from the previous leaf (§4's Render Task Executor, §9's `RenderThreadContext`
//! binding-state tracker).

use super::RenderTask;
use crate::error::RenderError;
use crate::gapi::{DrawParameters, ElementKind, ElementRange};
use crate::gpu::{
    BufferDataUsage, GpuFrameBuffer, GraphicsServer, Rect, ResourceBinding, ResourceBindGroup,
};
use crate::interfaces::TextureTargetMap;
use crate::stats::BindStatistics;
use crate::texture_config::{SamplerCache, TextureUnitConfig};
use std::rc::Rc;

/// Picks the `DrawParameters` one leaf actually draws with: lines and points have no front/back
/// distinction, so culling is disabled for them regardless of the active pipeline's configured
/// cull face, matching §4.4's "running current double-sided flag" cull batching. Returns `base`
/// unchanged (no clone) when the leaf doesn't need an override, so the common triangle-leaf path
/// never allocates.
fn draw_parameters_for_leaf<'a>(
    base: &'a DrawParameters,
    element_kind: ElementKind,
) -> std::borrow::Cow<'a, DrawParameters> {
    if element_kind == ElementKind::Triangle || base.cull_face.is_none() {
        std::borrow::Cow::Borrowed(base)
    } else {
        let mut overridden = base.clone();
        overridden.cull_face = None;
        std::borrow::Cow::Owned(overridden)
    }
}

/// Currently-bound GPU state, tracked so the executor only issues a bind call when the resource
/// actually differs from what is already bound; mirrors `fyrox`'s own `GraphicsServer` binding
/// cache but scoped to one render-task execution.
#[derive(Default)]
struct BoundState {
    pipeline_ptr: Option<usize>,
    tuc_ptr: Option<usize>,
    vao_ptr: Option<usize>,
}

/// Resolves a [`TextureUnitConfig`]'s symbolic bindings into live GPU resource handles, owned for
/// the lifetime of one draw call so the borrowed [`ResourceBinding`] slice handed to the backend
/// stays valid. Built fresh per TUC change rather than cached: the resolved handles are cheap
/// `Rc` clones and the bind group only needs to live for the duration of the bind, unlike the TUC
/// itself which persists across the whole task.
#[derive(Default)]
struct ResolvedBindGroup {
    textures: Vec<(crate::gapi::GpuTexture, crate::gapi::GpuSampler, u32)>,
    buffers: Vec<(crate::gapi::GpuBuffer, u32, BufferDataUsage)>,
}

impl ResolvedBindGroup {
    fn bindings(&self) -> Vec<ResourceBinding<'_>> {
        let mut out = Vec::with_capacity(self.textures.len() + self.buffers.len());
        for (texture, sampler, binding) in &self.textures {
            out.push(ResourceBinding::Texture {
                texture,
                sampler,
                binding: *binding,
            });
        }
        for (buffer, binding, data_usage) in &self.buffers {
            out.push(ResourceBinding::Buffer {
                buffer,
                binding: *binding,
                data_usage: *data_usage,
            });
        }
        out
    }
}

/// Resolves every texture and buffer binding in `tuc` to a slot index via `targets`, creating
/// samplers through `samplers` as needed. A semantic name absent from `targets` means the active
/// shader variant does not declare that slot; such bindings are skipped rather than treated as an
/// error, since a TUC is shared across pipeline variants that do not all consume every binding.
fn resolve_bind_group(
    server: &dyn GraphicsServer,
    tuc: &TextureUnitConfig,
    targets: &TextureTargetMap,
    samplers: &mut SamplerCache,
    buffer_of: &dyn Fn(crate::param_block::ParamBlockHandle) -> (crate::gapi::GpuBuffer, BufferDataUsage),
) -> Result<ResolvedBindGroup, RenderError> {
    let mut resolved = ResolvedBindGroup::default();
    for binding in tuc.textures() {
        let Some(&slot) = targets.get(binding.semantic) else {
            continue;
        };
        let sampler = samplers.get_or_insert(server, &binding.sampler)?;
        resolved
            .textures
            .push((binding.texture.clone(), sampler, slot));
    }
    for binding in tuc.buffers() {
        let Some(&slot) = targets.get(binding.semantic) else {
            continue;
        };
        let (buffer, data_usage) = buffer_of(binding.block);
        resolved.buffers.push((buffer, slot, data_usage));
    }
    Ok(resolved)
}

/// Executes every leaf of `task` against `framebuffer`, returning accumulated bind/draw-call
/// statistics. A [`RenderError::TransientGpu`] from any single draw call aborts the remainder of
/// the task immediately (§7: transient GPU errors drop the frame).
#[allow(clippy::too_many_arguments)]
pub fn execute(
    server: &dyn GraphicsServer,
    framebuffer: &GpuFrameBuffer,
    viewport: Rect<i32>,
    task: &RenderTask,
    draw_params: &DrawParameters,
    targets: &TextureTargetMap,
    samplers: &mut SamplerCache,
    buffer_of: &dyn Fn(crate::param_block::ParamBlockHandle) -> (crate::gapi::GpuBuffer, BufferDataUsage),
) -> Result<BindStatistics, RenderError> {
    let mut bound = BoundState::default();
    let mut stats = BindStatistics::default();

    for pipeline_node in task.pipelines() {
        let Some(pipeline) = pipeline_node.pipeline.as_ref() else {
            continue;
        };
        let pipeline_ptr = Rc::as_ptr(pipeline) as usize;
        if bound.pipeline_ptr != Some(pipeline_ptr) {
            bound.pipeline_ptr = Some(pipeline_ptr);
            bound.tuc_ptr = None;
            bound.vao_ptr = None;
            stats.pipeline_binds += 1;
        }

        for tuc_node in pipeline_node.tucs() {
            let Some(tuc) = tuc_node.config.as_ref() else {
                continue;
            };
            let tuc_ptr = Rc::as_ptr(tuc) as usize;
            if bound.tuc_ptr != Some(tuc_ptr) {
                bound.tuc_ptr = Some(tuc_ptr);
                bound.vao_ptr = None;
                stats.tuc_binds += 1;
            }
            let resolved = resolve_bind_group(server, tuc, targets, samplers, buffer_of)?;
            let bindings = resolved.bindings();
            let resources = [ResourceBindGroup {
                bindings: &bindings,
            }];

            for (_, vao_node) in tuc_node.vaos() {
                let Some(geometry) = vao_node.geometry.as_ref() else {
                    continue;
                };
                let vao_ptr = geometry_identity(geometry);
                if bound.vao_ptr != Some(vao_ptr) {
                    bound.vao_ptr = Some(vao_ptr);
                    stats.vao_binds += 1;
                }

                for leaf in vao_node.leaves() {
                    // A leaf carrying a patch-vertex-count must have been built for a pipeline
                    // that actually requested tessellation; a mismatch here means the builder put
                    // a tessellated draw under the wrong pipeline key (§7 logic error).
                    debug_assert_eq!(
                        leaf.patch_vertex_count.is_some(),
                        pipeline.config.patch_vertex_count.is_some(),
                        "leaf patch-vertex-count disagrees with its pipeline's tessellation state"
                    );
                    let element_range = match leaf.count {
                        Some(count) => ElementRange::Specific {
                            offset: leaf.first as usize,
                            count: count as usize,
                        },
                        None => ElementRange::Full,
                    };
                    let leaf_params = draw_parameters_for_leaf(draw_params, leaf.element_kind);
                    let instance_count = leaf.subinstance_count().max(1) as usize;
                    let draw_stats = if instance_count > 1 {
                        framebuffer.draw_instances(
                            instance_count,
                            geometry,
                            viewport,
                            &pipeline.program,
                            &leaf_params,
                            &resources,
                            element_range,
                        )?
                    } else {
                        framebuffer.draw(
                            geometry,
                            viewport,
                            &pipeline.program,
                            &leaf_params,
                            &resources,
                            element_range,
                        )?
                    };
                    stats.draw_calls += 1;
                    stats.triangles_rendered += draw_stats.triangles;
                }
            }
        }
    }

    Ok(stats)
}

fn geometry_identity(geometry: &crate::gapi::GpuGeometryBuffer) -> usize {
    Rc::as_ptr(&geometry.0) as *const () as usize
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render_task::RenderTask;

    #[test]
    fn triangle_leaves_keep_the_pipeline_cull_face() {
        let base = DrawParameters::default();
        assert!(base.cull_face.is_some());
        let params = draw_parameters_for_leaf(&base, ElementKind::Triangle);
        assert_eq!(params.cull_face, base.cull_face);
    }

    #[test]
    fn line_and_point_leaves_disable_culling() {
        let base = DrawParameters::default();
        assert!(draw_parameters_for_leaf(&base, ElementKind::Line).cull_face.is_none());
        assert!(draw_parameters_for_leaf(&base, ElementKind::Point).cull_face.is_none());
    }

    #[test]
    fn empty_task_produces_zero_binds() {
        let task = RenderTask::new();
        let mut stats = BindStatistics::default();
        for pipeline_node in task.pipelines() {
            let _ = pipeline_node;
            stats.pipeline_binds += 1;
        }
        assert_eq!(stats.pipeline_binds, 0);
    }
}
