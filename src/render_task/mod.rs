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

//! The render-task tree: a four-level forest `Pipeline → TUC → VAO → Instance` (§3 "Render task
//! tree"). Built fresh every frame by [`builder::AddToRenderTask`], walked by [`executor`], and
//! mirrored in a pool-backed, cross-frame form by [`persistent`].

pub mod builder;
pub mod executor;
pub mod persistent;

use crate::gapi::{ElementKind, GpuGeometryBuffer};
use crate::interfaces::{GeometryId, InstanceSharedId};
use crate::param_block::ParamBlockHandle;
use crate::pipeline::Pipeline;
use crate::texture_config::TextureUnitConfig;
use fxhash::FxHashMap;
use std::rc::Rc;

/// One drawable's contribution to an instanced leaf: the parameter-block row that carries its
/// per-instance data (world transform, skin index, ...). Identical `{pipeline, TUC, VAO,
/// instance-shared}` tuples coalesce into one `InstanceLeaf` with one row pushed per drawable (§3
/// invariant: "identical tuples coalesce").
pub type InstanceRow = ParamBlockHandle;

/// Leaf of the render-task tree: one draw call's worth of geometry plus the per-instance rows
/// coalesced into it.
#[derive(Clone)]
pub struct InstanceLeaf {
    /// Stable identity used to detect whether a subsequent drawable coalesces with this leaf.
    pub instance_shared_id: InstanceSharedId,
    /// Primitive topology of the draw.
    pub element_kind: ElementKind,
    /// First index/point to draw.
    pub first: u32,
    /// Number of indices/points to draw, or `None` for "the whole buffer" (matches
    /// [`crate::interfaces::Drawable::element_count`]).
    pub count: Option<u32>,
    /// Vertices per patch, for tessellation pipelines; mirrors
    /// [`crate::pipeline::PipelineConfig::patch_vertex_count`].
    pub patch_vertex_count: Option<u32>,
    /// One row per coalesced drawable, in insertion order (§3: "siblings in insertion order
    /// preserve a stable render order").
    pub rows: Vec<InstanceRow>,
}

impl InstanceLeaf {
    /// Number of drawables coalesced into this leaf; `gl_InstanceID`/`gl_DrawID`-style submissions
    /// use this as the instance count.
    pub fn subinstance_count(&self) -> u32 {
        self.rows.len() as u32
    }
}

/// Third level of the tree: one shared geometry buffer (VAO) and the instance leaves drawn from
/// it, keyed by instance-shared identity so identical draws coalesce.
#[derive(Default)]
pub struct VaoNode {
    pub geometry: Option<GpuGeometryBuffer>,
    leaves: Vec<InstanceLeaf>,
    index_of: FxHashMap<InstanceSharedId, usize>,
}

impl VaoNode {
    fn new(geometry: GpuGeometryBuffer) -> Self {
        Self {
            geometry: Some(geometry),
            leaves: Vec::new(),
            index_of: FxHashMap::default(),
        }
    }

    /// Adds one drawable's row, coalescing into an existing leaf with the same
    /// `instance_shared_id` if one already exists in this VAO this frame.
    pub fn push(
        &mut self,
        instance_shared_id: InstanceSharedId,
        element_kind: ElementKind,
        first: u32,
        count: Option<u32>,
        patch_vertex_count: Option<u32>,
        row: InstanceRow,
    ) {
        if let Some(&index) = self.index_of.get(&instance_shared_id) {
            self.leaves[index].rows.push(row);
            return;
        }
        let index = self.leaves.len();
        self.leaves.push(InstanceLeaf {
            instance_shared_id,
            element_kind,
            first,
            count,
            patch_vertex_count,
            rows: vec![row],
        });
        self.index_of.insert(instance_shared_id, index);
    }

    /// Instance leaves, in insertion order.
    pub fn leaves(&self) -> &[InstanceLeaf] {
        &self.leaves
    }
}

/// Second level of the tree: one texture-unit config and the VAOs drawn with it, keyed by
/// geometry identity.
#[derive(Default)]
pub struct TucNode {
    pub config: Option<Rc<TextureUnitConfig>>,
    vaos: FxHashMap<GeometryId, VaoNode>,
    /// Preserves first-insertion order so the executor walks VAOs deterministically, matching the
    /// tree's "stable render order" invariant.
    vao_order: Vec<GeometryId>,
}

impl TucNode {
    /// Returns the VAO node for `geometry_id`, creating it (with the supplied geometry buffer) on
    /// first use.
    pub fn vao_mut(
        &mut self,
        geometry_id: GeometryId,
        geometry: impl FnOnce() -> GpuGeometryBuffer,
    ) -> &mut VaoNode {
        if !self.vaos.contains_key(&geometry_id) {
            self.vaos.insert(geometry_id, VaoNode::new(geometry()));
            self.vao_order.push(geometry_id);
        }
        self.vaos.get_mut(&geometry_id).unwrap()
    }

    /// VAO nodes, in first-insertion order.
    pub fn vaos(&self) -> impl Iterator<Item = (&GeometryId, &VaoNode)> {
        self.vao_order.iter().map(move |id| (id, &self.vaos[id]))
    }
}

/// Top level of the tree: one pipeline and the TUCs drawn with it, keyed by TUC content identity.
#[derive(Default)]
pub struct PipelineNode {
    pub pipeline: Option<Rc<Pipeline>>,
    tucs: FxHashMap<usize, TucNode>,
    tuc_order: Vec<usize>,
}

impl PipelineNode {
    /// Returns the TUC node for the given shared, content-deduped `TextureUnitConfig`, creating it
    /// on first use.
    pub fn tuc_mut(&mut self, tuc: &Rc<TextureUnitConfig>) -> &mut TucNode {
        let key = Rc::as_ptr(tuc) as usize;
        if !self.tucs.contains_key(&key) {
            self.tucs.insert(
                key,
                TucNode {
                    config: Some(tuc.clone()),
                    ..Default::default()
                },
            );
            self.tuc_order.push(key);
        }
        self.tucs.get_mut(&key).unwrap()
    }

    /// TUC nodes, in first-insertion order.
    pub fn tucs(&self) -> impl Iterator<Item = &TucNode> {
        self.tuc_order.iter().map(move |key| &self.tucs[key])
    }
}

/// Root of the render-task tree for one frame: every pipeline touched, in first-insertion order.
#[derive(Default)]
pub struct RenderTask {
    pipelines: FxHashMap<usize, PipelineNode>,
    pipeline_order: Vec<usize>,
}

impl RenderTask {
    /// Creates an empty render task.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the pipeline node for the given shared, content-deduped `Pipeline`, creating it on
    /// first use.
    pub fn pipeline_mut(&mut self, pipeline: &Rc<Pipeline>) -> &mut PipelineNode {
        let key = Rc::as_ptr(pipeline) as usize;
        if !self.pipelines.contains_key(&key) {
            self.pipelines.insert(
                key,
                PipelineNode {
                    pipeline: Some(pipeline.clone()),
                    ..Default::default()
                },
            );
            self.pipeline_order.push(key);
        }
        self.pipelines.get_mut(&key).unwrap()
    }

    /// Pipeline nodes, in first-insertion order.
    pub fn pipelines(&self) -> impl Iterator<Item = &PipelineNode> {
        self.pipeline_order.iter().map(move |key| &self.pipelines[key])
    }

    /// `true` if no draws were ever added.
    pub fn is_empty(&self) -> bool {
        self.pipelines.is_empty()
    }

    /// Drops every node; reused across frames to avoid reallocating the top-level maps.
    pub fn clear(&mut self) {
        self.pipelines.clear();
        self.pipeline_order.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::param_block::{ParamBlockHandle, ParamBlockKind};

    fn dummy_row(offset: usize) -> InstanceRow {
        ParamBlockHandle {
            range: crate::buffer_pool::BufferRange { offset, len: 16 },
            kind: ParamBlockKind::Uniform,
        }
    }

    // VaoNode/TucNode/PipelineNode/RenderTask are exercised end-to-end through the builder tests
    // in `builder.rs`, since constructing a `Pipeline`/`GpuProgram`/`GpuGeometryBuffer` requires a
    // live graphics server. This module keeps only the coalescing logic testable without one.

    #[test]
    fn pushing_same_instance_shared_id_twice_coalesces_into_one_leaf() {
        let mut vao = VaoNode {
            geometry: None,
            leaves: Vec::new(),
            index_of: FxHashMap::default(),
        };
        vao.push(1, ElementKind::Triangle, 0, Some(36), None, dummy_row(0));
        vao.push(1, ElementKind::Triangle, 0, Some(36), None, dummy_row(64));
        assert_eq!(vao.leaves().len(), 1);
        assert_eq!(vao.leaves()[0].subinstance_count(), 2);
    }

    #[test]
    fn distinct_instance_shared_ids_produce_distinct_leaves() {
        let mut vao = VaoNode {
            geometry: None,
            leaves: Vec::new(),
            index_of: FxHashMap::default(),
        };
        vao.push(1, ElementKind::Triangle, 0, Some(36), None, dummy_row(0));
        vao.push(2, ElementKind::Triangle, 0, Some(36), None, dummy_row(64));
        assert_eq!(vao.leaves().len(), 2);
    }

    #[test]
    fn new_render_task_is_empty() {
        let task = RenderTask::new();
        assert!(task.is_empty());
    }
}
