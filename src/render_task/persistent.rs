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

//! A pool-backed mirror of [`super::RenderTask`] that survives across frames: nodes are allocated
//! from [`crate::core::pool::Pool`] and linked into intrusive doubly-linked lists so that adding
//! or removing a single drawable's contribution is O(1) instead of rebuilding the tree. Pool
//! generations double as the tree's staleness check: a [`LeafHandle`] a caller stashed across a
//! `remove_row` call simply fails `is_valid_handle` rather than aliasing a reused slot.

use crate::core::log::{Log, MessageKind};
use crate::core::pool::{Handle, Pool};
use crate::gapi::{ElementKind, GpuGeometryBuffer};
use crate::interfaces::{GeometryId, InstanceSharedId};
use crate::param_block::ParamBlockHandle;
use crate::pipeline::Pipeline;
use crate::texture_config::TextureUnitConfig;
use fxhash::FxHashMap;
use std::rc::Rc;
use std::sync::mpsc::Receiver;

pub type InstanceRow = ParamBlockHandle;
pub type PipelineNodeHandle = Handle<PipelineNode>;
pub type TucNodeHandle = Handle<TucNode>;
pub type VaoNodeHandle = Handle<VaoNode>;
pub type LeafHandle = Handle<Leaf>;

/// A change the main thread wants applied to a [`PersistentRenderTask`] at the next frame start
/// (§5's "main thread publishes change tokens through a lock-free queue... that the render thread
/// drains at frame start"), mirroring how `fyrox-impl`'s renderer drains a
/// `Receiver<ResourceEvent>` for texture/shader reload notifications rather than mutating caches
/// from an arbitrary thread.
#[derive(Debug, Clone, Copy)]
pub enum RenderTaskChangeToken {
    /// One coalesced row stopped being drawn (the drawable producing it was removed or moved out
    /// of this task's scope); same semantics as [`PersistentRenderTask::remove_row`].
    RemoveRow {
        leaf: LeafHandle,
        row_index: usize,
    },
}

/// Leaf of the persistent tree: one draw call's worth of geometry plus the coalesced per-instance
/// rows, doubly-linked into its parent [`VaoNode`]'s leaf list.
pub struct Leaf {
    pub instance_shared_id: InstanceSharedId,
    pub element_kind: ElementKind,
    pub first: u32,
    pub count: Option<u32>,
    pub patch_vertex_count: Option<u32>,
    pub rows: Vec<InstanceRow>,
    parent: VaoNodeHandle,
    prev: Option<LeafHandle>,
    next: Option<LeafHandle>,
}

impl Leaf {
    /// Number of drawables coalesced into this leaf.
    pub fn subinstance_count(&self) -> u32 {
        self.rows.len() as u32
    }
}

/// Third level: one shared geometry buffer and the leaves drawn from it, keyed by instance-shared
/// identity so repeated drawables coalesce, same as [`super::VaoNode`].
pub struct VaoNode {
    pub geometry: Option<GpuGeometryBuffer>,
    leaf_of: FxHashMap<InstanceSharedId, LeafHandle>,
    leaf_head: Option<LeafHandle>,
    leaf_tail: Option<LeafHandle>,
    leaf_count: u32,
    parent: TucNodeHandle,
    prev: Option<VaoNodeHandle>,
    next: Option<VaoNodeHandle>,
}

impl VaoNode {
    /// Number of live leaves under this VAO.
    pub fn leaf_count(&self) -> u32 {
        self.leaf_count
    }
}

/// Second level: one texture-unit config and the VAOs drawn with it, keyed by geometry identity.
pub struct TucNode {
    pub config: Option<Rc<TextureUnitConfig>>,
    vao_of: FxHashMap<GeometryId, VaoNodeHandle>,
    vao_head: Option<VaoNodeHandle>,
    vao_tail: Option<VaoNodeHandle>,
    vao_count: u32,
    parent: PipelineNodeHandle,
    prev: Option<TucNodeHandle>,
    next: Option<TucNodeHandle>,
}

impl TucNode {
    pub fn vao_count(&self) -> u32 {
        self.vao_count
    }
}

/// Top level: one pipeline and the TUCs drawn with it, keyed by TUC content identity (the TUC's
/// `Rc` pointer, same scheme as [`super::PipelineNode`]).
pub struct PipelineNode {
    pub pipeline: Option<Rc<Pipeline>>,
    tuc_of: FxHashMap<usize, TucNodeHandle>,
    tuc_head: Option<TucNodeHandle>,
    tuc_tail: Option<TucNodeHandle>,
    tuc_count: u32,
    prev: Option<PipelineNodeHandle>,
    next: Option<PipelineNodeHandle>,
}

impl PipelineNode {
    pub fn tuc_count(&self) -> u32 {
        self.tuc_count
    }
}

/// The persistent render-task forest. Unlike [`super::RenderTask`], which is rebuilt from scratch
/// every frame, this tree is mutated incrementally as change tokens (add/remove/move a drawable)
/// are drained; see module docs for why that makes removal O(1).
#[derive(Default)]
pub struct PersistentRenderTask {
    pipelines: Pool<PipelineNode>,
    tucs: Pool<TucNode>,
    vaos: Pool<VaoNode>,
    leaves: Pool<Leaf>,
    pipeline_of: FxHashMap<usize, PipelineNodeHandle>,
    pipeline_head: Option<PipelineNodeHandle>,
    pipeline_tail: Option<PipelineNodeHandle>,
    pipeline_count: u32,
}

impl PersistentRenderTask {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the pipeline node for `pipeline`, creating and appending it to the tail of the
    /// pipeline list on first use.
    pub fn pipeline_handle(&mut self, pipeline: &Rc<Pipeline>) -> PipelineNodeHandle {
        let key = Rc::as_ptr(pipeline) as usize;
        if let Some(&handle) = self.pipeline_of.get(&key) {
            return handle;
        }
        let handle = self.pipelines.spawn(PipelineNode {
            pipeline: Some(pipeline.clone()),
            tuc_of: FxHashMap::default(),
            tuc_head: None,
            tuc_tail: None,
            tuc_count: 0,
            prev: self.pipeline_tail,
            next: None,
        });
        if let Some(tail) = self.pipeline_tail {
            self.pipelines.borrow_mut(tail).next = Some(handle);
        } else {
            self.pipeline_head = Some(handle);
        }
        self.pipeline_tail = Some(handle);
        self.pipeline_count += 1;
        self.pipeline_of.insert(key, handle);
        handle
    }

    /// Returns the TUC node under `pipeline` for `tuc`, creating and appending it on first use.
    pub fn tuc_handle(
        &mut self,
        pipeline: PipelineNodeHandle,
        tuc: &Rc<TextureUnitConfig>,
    ) -> TucNodeHandle {
        let key = Rc::as_ptr(tuc) as usize;
        if let Some(&handle) = self.pipelines.borrow(pipeline).tuc_of.get(&key) {
            return handle;
        }
        let tail = self.pipelines.borrow(pipeline).tuc_tail;
        let handle = self.tucs.spawn(TucNode {
            config: Some(tuc.clone()),
            vao_of: FxHashMap::default(),
            vao_head: None,
            vao_tail: None,
            vao_count: 0,
            parent: pipeline,
            prev: tail,
            next: None,
        });
        if let Some(tail) = tail {
            self.tucs.borrow_mut(tail).next = Some(handle);
        } else {
            self.pipelines.borrow_mut(pipeline).tuc_head = Some(handle);
        }
        let node = self.pipelines.borrow_mut(pipeline);
        node.tuc_tail = Some(handle);
        node.tuc_count += 1;
        node.tuc_of.insert(key, handle);
        handle
    }

    /// Returns the VAO node under `tuc` for `geometry_id`, creating it (with the geometry buffer
    /// built by `geometry`) on first use.
    pub fn vao_handle(
        &mut self,
        tuc: TucNodeHandle,
        geometry_id: GeometryId,
        geometry: impl FnOnce() -> GpuGeometryBuffer,
    ) -> VaoNodeHandle {
        if let Some(&handle) = self.tucs.borrow(tuc).vao_of.get(&geometry_id) {
            return handle;
        }
        let tail = self.tucs.borrow(tuc).vao_tail;
        let handle = self.vaos.spawn(VaoNode {
            geometry: Some(geometry()),
            leaf_of: FxHashMap::default(),
            leaf_head: None,
            leaf_tail: None,
            leaf_count: 0,
            parent: tuc,
            prev: tail,
            next: None,
        });
        if let Some(tail) = tail {
            self.vaos.borrow_mut(tail).next = Some(handle);
        } else {
            self.tucs.borrow_mut(tuc).vao_head = Some(handle);
        }
        let node = self.tucs.borrow_mut(tuc);
        node.vao_tail = Some(handle);
        node.vao_count += 1;
        node.vao_of.insert(geometry_id, handle);
        handle
    }

    /// Adds one drawable's row under `vao`, coalescing into an existing leaf with the same
    /// `instance_shared_id` if one is already live there. Returns the leaf handle so the caller
    /// can keep it around to later call [`Self::remove_row`] in O(1).
    #[allow(clippy::too_many_arguments)]
    pub fn push_row(
        &mut self,
        vao: VaoNodeHandle,
        instance_shared_id: InstanceSharedId,
        element_kind: ElementKind,
        first: u32,
        count: Option<u32>,
        patch_vertex_count: Option<u32>,
        row: InstanceRow,
    ) -> LeafHandle {
        if let Some(&handle) = self.vaos.borrow(vao).leaf_of.get(&instance_shared_id) {
            self.leaves.borrow_mut(handle).rows.push(row);
            return handle;
        }
        let tail = self.vaos.borrow(vao).leaf_tail;
        let handle = self.leaves.spawn(Leaf {
            instance_shared_id,
            element_kind,
            first,
            count,
            patch_vertex_count,
            rows: vec![row],
            parent: vao,
            prev: tail,
            next: None,
        });
        if let Some(tail) = tail {
            self.leaves.borrow_mut(tail).next = Some(handle);
        } else {
            self.vaos.borrow_mut(vao).leaf_head = Some(handle);
        }
        let node = self.vaos.borrow_mut(vao);
        node.leaf_tail = Some(handle);
        node.leaf_count += 1;
        node.leaf_of.insert(instance_shared_id, handle);
        handle
    }

    /// Removes one coalesced row from `leaf`. Once a leaf's row count reaches zero it is unlinked
    /// from its VAO in O(1) and freed; an emptied VAO cascades the same way into its TUC, and an
    /// emptied TUC into its pipeline. `row_index` must be a valid index into the leaf's current
    /// `rows` (as returned by [`Leaf::subinstance_count`]); out-of-range indices are a no-op.
    pub fn remove_row(&mut self, leaf: LeafHandle, row_index: usize) {
        if !self.leaves.is_valid_handle(leaf) {
            return;
        }
        let leaf_ref = self.leaves.borrow_mut(leaf);
        if row_index >= leaf_ref.rows.len() {
            return;
        }
        leaf_ref.rows.remove(row_index);
        if !leaf_ref.rows.is_empty() {
            return;
        }
        self.unlink_leaf(leaf);
    }

    fn unlink_leaf(&mut self, leaf: LeafHandle) {
        let freed = self.leaves.free(leaf);
        let vao = freed.parent;
        match freed.prev {
            Some(prev) => self.leaves.borrow_mut(prev).next = freed.next,
            None => self.vaos.borrow_mut(vao).leaf_head = freed.next,
        }
        match freed.next {
            Some(next) => self.leaves.borrow_mut(next).prev = freed.prev,
            None => self.vaos.borrow_mut(vao).leaf_tail = freed.prev,
        }
        let vao_node = self.vaos.borrow_mut(vao);
        vao_node.leaf_count -= 1;
        vao_node
            .leaf_of
            .retain(|_, &mut handle| handle != leaf);
        if vao_node.leaf_count == 0 {
            self.unlink_vao(vao);
        }
    }

    fn unlink_vao(&mut self, vao: VaoNodeHandle) {
        let freed = self.vaos.free(vao);
        let tuc = freed.parent;
        match freed.prev {
            Some(prev) => self.vaos.borrow_mut(prev).next = freed.next,
            None => self.tucs.borrow_mut(tuc).vao_head = freed.next,
        }
        match freed.next {
            Some(next) => self.vaos.borrow_mut(next).prev = freed.prev,
            None => self.tucs.borrow_mut(tuc).vao_tail = freed.prev,
        }
        let tuc_node = self.tucs.borrow_mut(tuc);
        tuc_node.vao_count -= 1;
        tuc_node.vao_of.retain(|_, &mut handle| handle != vao);
        if tuc_node.vao_count == 0 {
            self.unlink_tuc(tuc);
        }
    }

    fn unlink_tuc(&mut self, tuc: TucNodeHandle) {
        let freed = self.tucs.free(tuc);
        let pipeline = freed.parent;
        match freed.prev {
            Some(prev) => self.tucs.borrow_mut(prev).next = freed.next,
            None => self.pipelines.borrow_mut(pipeline).tuc_head = freed.next,
        }
        match freed.next {
            Some(next) => self.tucs.borrow_mut(next).prev = freed.prev,
            None => self.pipelines.borrow_mut(pipeline).tuc_tail = freed.prev,
        }
        let pipeline_node = self.pipelines.borrow_mut(pipeline);
        pipeline_node.tuc_count -= 1;
        pipeline_node.tuc_of.retain(|_, &mut handle| handle != tuc);
        if pipeline_node.tuc_count == 0 {
            self.unlink_pipeline(pipeline);
        }
    }

    fn unlink_pipeline(&mut self, pipeline: PipelineNodeHandle) {
        let freed = self.pipelines.free(pipeline);
        match freed.prev {
            Some(prev) => self.pipelines.borrow_mut(prev).next = freed.next,
            None => self.pipeline_head = freed.next,
        }
        match freed.next {
            Some(next) => self.pipelines.borrow_mut(next).prev = freed.prev,
            None => self.pipeline_tail = freed.prev,
        }
        self.pipeline_count -= 1;
        self.pipeline_of.retain(|_, &mut handle| handle != pipeline);
    }

    /// Pipeline nodes, in first-insertion order, following the intrusive list rather than the
    /// pool's own (reused-slot) iteration order.
    pub fn pipelines(&self) -> NodeIter<'_, PipelineNode> {
        NodeIter {
            pool: &self.pipelines,
            current: self.pipeline_head,
            next_of: |node| node.next,
        }
    }

    /// TUC nodes under `pipeline`, in first-insertion order.
    pub fn tucs(&self, pipeline: PipelineNodeHandle) -> NodeIter<'_, TucNode> {
        NodeIter {
            pool: &self.tucs,
            current: self.pipelines.borrow(pipeline).tuc_head,
            next_of: |node| node.next,
        }
    }

    /// VAO nodes under `tuc`, in first-insertion order.
    pub fn vaos(&self, tuc: TucNodeHandle) -> NodeIter<'_, VaoNode> {
        NodeIter {
            pool: &self.vaos,
            current: self.tucs.borrow(tuc).vao_head,
            next_of: |node| node.next,
        }
    }

    /// Leaves under `vao`, in first-insertion order.
    pub fn leaves(&self, vao: VaoNodeHandle) -> NodeIter<'_, Leaf> {
        NodeIter {
            pool: &self.leaves,
            current: self.vaos.borrow(vao).leaf_head,
            next_of: |node| node.next,
        }
    }

    /// `true` if the tree holds no live pipelines.
    pub fn is_empty(&self) -> bool {
        self.pipeline_head.is_none()
    }

    /// Total count of live pipeline nodes, exposed for test/debug assertions.
    pub fn pipeline_count(&self) -> u32 {
        self.pipeline_count
    }

    /// Drains every change token queued since the last call and applies it, logging a warning for
    /// tokens that reference a leaf already freed (a removal racing a previous removal of the same
    /// drawable). Called once at frame start, same spot `fyrox-impl` drains its own resource event
    /// receivers.
    pub fn drain_changes(&mut self, receiver: &Receiver<RenderTaskChangeToken>) {
        while let Ok(token) = receiver.try_recv() {
            match token {
                RenderTaskChangeToken::RemoveRow { leaf, row_index } => {
                    if !self.leaves.is_valid_handle(leaf) {
                        Log::writeln(
                            MessageKind::Warning,
                            "Dropping a render task change token for an already-removed leaf"
                                .to_string(),
                        );
                        continue;
                    }
                    self.remove_row(leaf, row_index);
                }
            }
        }
    }
}

/// Walks an intrusive singly-linked (via `next`) chain of pool-allocated nodes in insertion order.
pub struct NodeIter<'a, T> {
    pool: &'a Pool<T>,
    current: Option<Handle<T>>,
    next_of: fn(&T) -> Option<Handle<T>>,
}

impl<'a, T> Iterator for NodeIter<'a, T> {
    type Item = (Handle<T>, &'a T);

    fn next(&mut self) -> Option<Self::Item> {
        let handle = self.current?;
        let node = self.pool.borrow(handle);
        self.current = (self.next_of)(node);
        Some((handle, node))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer_pool::BufferRange;
    use crate::param_block::ParamBlockKind;

    fn dummy_row(offset: usize) -> InstanceRow {
        ParamBlockHandle {
            range: BufferRange { offset, len: 16 },
            kind: ParamBlockKind::Uniform,
        }
    }

    #[test]
    fn push_row_coalesces_same_instance_shared_id() {
        // Exercises the tree above the VAO level, which needs no live `GpuGeometryBuffer`: a
        // pipeline and TUC node built directly, a VAO node built directly, then two rows pushed
        // through `push_row` to check coalescing.
        let mut task = PersistentRenderTask::new();
        let pipeline = task.pipelines.spawn(PipelineNode {
            pipeline: None,
            tuc_of: FxHashMap::default(),
            tuc_head: None,
            tuc_tail: None,
            tuc_count: 0,
            prev: None,
            next: None,
        });
        let tuc = task.tucs.spawn(TucNode {
            config: None,
            vao_of: FxHashMap::default(),
            vao_head: None,
            vao_tail: None,
            vao_count: 0,
            parent: pipeline,
            prev: None,
            next: None,
        });
        let vao = task.vaos.spawn(VaoNode {
            geometry: None,
            leaf_of: FxHashMap::default(),
            leaf_head: None,
            leaf_tail: None,
            leaf_count: 0,
            parent: tuc,
            prev: None,
            next: None,
        });

        let leaf_a = task.push_row(vao, 1, ElementKind::Triangle, 0, Some(36), None, dummy_row(0));
        let leaf_b = task.push_row(vao, 1, ElementKind::Triangle, 0, Some(36), None, dummy_row(64));
        assert_eq!(leaf_a, leaf_b);
        assert_eq!(task.leaves.borrow(leaf_a).subinstance_count(), 2);
    }

    #[test]
    fn remove_row_cascades_and_frees_empty_ancestors() {
        let mut pipelines: Pool<PipelineNode> = Pool::new();
        let mut tucs: Pool<TucNode> = Pool::new();
        let mut vaos: Pool<VaoNode> = Pool::new();
        let mut leaves: Pool<Leaf> = Pool::new();

        let pipeline = pipelines.spawn(PipelineNode {
            pipeline: None,
            tuc_of: FxHashMap::default(),
            tuc_head: None,
            tuc_tail: None,
            tuc_count: 1,
            prev: None,
            next: None,
        });
        let tuc = tucs.spawn(TucNode {
            config: None,
            vao_of: FxHashMap::default(),
            vao_head: None,
            vao_tail: None,
            vao_count: 1,
            parent: pipeline,
            prev: None,
            next: None,
        });
        let vao = vaos.spawn(VaoNode {
            geometry: None,
            leaf_of: FxHashMap::default(),
            leaf_head: None,
            leaf_tail: None,
            leaf_count: 1,
            parent: tuc,
            prev: None,
            next: None,
        });
        let leaf = leaves.spawn(Leaf {
            instance_shared_id: 1,
            element_kind: ElementKind::Triangle,
            first: 0,
            count: Some(36),
            patch_vertex_count: None,
            rows: vec![dummy_row(0)],
            parent: vao,
            prev: None,
            next: None,
        });
        vaos.borrow_mut(vao).leaf_head = Some(leaf);
        vaos.borrow_mut(vao).leaf_tail = Some(leaf);
        tucs.borrow_mut(tuc).vao_head = Some(vao);
        tucs.borrow_mut(tuc).vao_tail = Some(vao);
        pipelines.borrow_mut(pipeline).tuc_head = Some(tuc);
        pipelines.borrow_mut(pipeline).tuc_tail = Some(tuc);

        let mut task = PersistentRenderTask {
            pipelines,
            tucs,
            vaos,
            leaves,
            pipeline_of: FxHashMap::default(),
            pipeline_head: Some(pipeline),
            pipeline_tail: Some(pipeline),
            pipeline_count: 1,
        };

        task.remove_row(leaf, 0);

        assert!(!task.leaves.is_valid_handle(leaf));
        assert!(!task.vaos.is_valid_handle(vao));
        assert!(!task.tucs.is_valid_handle(tuc));
        assert!(!task.pipelines.is_valid_handle(pipeline));
        assert!(task.is_empty());
    }

    #[test]
    fn drain_changes_applies_queued_removals_and_ignores_stale_handles() {
        let mut task = PersistentRenderTask::new();
        let pipeline = task.pipelines.spawn(PipelineNode {
            pipeline: None,
            tuc_of: FxHashMap::default(),
            tuc_head: None,
            tuc_tail: None,
            tuc_count: 0,
            prev: None,
            next: None,
        });
        let tuc = task.tucs.spawn(TucNode {
            config: None,
            vao_of: FxHashMap::default(),
            vao_head: None,
            vao_tail: None,
            vao_count: 0,
            parent: pipeline,
            prev: None,
            next: None,
        });
        let vao = task.vaos.spawn(VaoNode {
            geometry: None,
            leaf_of: FxHashMap::default(),
            leaf_head: None,
            leaf_tail: None,
            leaf_count: 0,
            parent: tuc,
            prev: None,
            next: None,
        });
        let leaf = task.push_row(vao, 1, ElementKind::Triangle, 0, Some(36), None, dummy_row(0));

        let (tx, rx) = std::sync::mpsc::channel();
        tx.send(RenderTaskChangeToken::RemoveRow { leaf, row_index: 0 })
            .unwrap();
        // A second token referencing the same, now-freed leaf must be a harmless no-op.
        tx.send(RenderTaskChangeToken::RemoveRow { leaf, row_index: 0 })
            .unwrap();

        task.drain_changes(&rx);

        assert!(!task.leaves.is_valid_handle(leaf));
        assert!(task.is_empty());
    }
}
