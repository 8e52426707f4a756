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

//! Shared Parameter Block List: a pool of `std140`-laid-out GPU parameter records (per-render,
//! per-light, per-instance) with free-list reuse, built directly on top of
//! [`fyrox_graphics::uniform`]'s layout writer so the byte packing rules match what the shader
//! compiler on the other side of [`crate::interfaces::ShaderSourceProvider`] expects.

use crate::buffer_pool::{BufferPool, BufferRange};
use crate::error::RenderError;
use crate::gapi::{BufferKind, BufferUsage};
use crate::gpu::GraphicsServer;
use fyrox_graphics::uniform::DynamicUniformBuffer;

/// A single parameter block allocation: a byte range inside the pool plus the kind tag a bind
/// group entry needs to know whether to bind it as a uniform or shader-storage block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParamBlockHandle {
    pub(crate) range: BufferRange,
    pub(crate) kind: ParamBlockKind,
}

/// Whether a parameter block is bound through a uniform buffer (`std140`, small, read-only,
/// one instance per block) or a shader-storage buffer (`std430`, larger, supports per-instance
/// arrays indexed by `gl_InstanceID`/`gl_DrawID`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParamBlockKind {
    /// `std140`, bound as a uniform buffer.
    Uniform,
    /// `std430`, bound as a shader-storage buffer; used for per-instance arrays that are too
    /// large or too irregular for a uniform buffer's 16KiB-ish practical limit.
    Storage,
}

impl ParamBlockKind {
    fn buffer_kind(self) -> BufferKind {
        match self {
            ParamBlockKind::Uniform => BufferKind::Uniform,
            // The graphics abstraction layer this crate is built on models shader-storage ranges
            // as uniform-kind buffers bound at a different target; see DESIGN.md for the
            // rationale (no distinct `BufferKind::Storage` variant exists upstream).
            ParamBlockKind::Storage => BufferKind::Uniform,
        }
    }
}

/// Owns one pool per [`ParamBlockKind`] and hands out byte ranges written with `std140` packing.
/// One instance lives per frame-in-flight; `reset` at the start of a frame returns every range to
/// the free-list instead of freeing them one by one, since parameter blocks are frame-scoped by
/// construction (the render-task tree that references them is rebuilt every frame too, except for
/// the persistent variant, which keeps its own handles stable across `reset` calls by never
/// passing them back).
pub struct ParamBlockAllocator {
    uniform_pool: BufferPool,
    storage_pool: BufferPool,
}

const UNIFORM_BLOCK_ALIGNMENT: usize = 256;
const STORAGE_BLOCK_ALIGNMENT: usize = 256;

impl ParamBlockAllocator {
    /// Creates both pools with a modest initial capacity; they grow on demand.
    pub fn new(server: &dyn GraphicsServer) -> Result<Self, RenderError> {
        Ok(Self {
            uniform_pool: BufferPool::new(
                server,
                BufferKind::Uniform,
                BufferUsage::DynamicDraw,
                64 * 1024,
                UNIFORM_BLOCK_ALIGNMENT,
            )?,
            storage_pool: BufferPool::new(
                server,
                BufferKind::Uniform,
                BufferUsage::DynamicDraw,
                256 * 1024,
                STORAGE_BLOCK_ALIGNMENT,
            )?,
        })
    }

    fn pool_for(&mut self, kind: ParamBlockKind) -> &mut BufferPool {
        match kind {
            ParamBlockKind::Uniform => &mut self.uniform_pool,
            ParamBlockKind::Storage => &mut self.storage_pool,
        }
    }

    /// The backing GPU buffer for `kind`, used to resolve a [`ParamBlockHandle`] into a bindable
    /// resource when a render task executes.
    pub fn buffer_for(&self, kind: ParamBlockKind) -> &crate::gpu::GpuBuffer {
        match kind {
            ParamBlockKind::Uniform => self.uniform_pool.buffer(),
            ParamBlockKind::Storage => self.storage_pool.buffer(),
        }
    }

    /// Writes a freshly built `std140` byte buffer into the pool and returns a handle to it.
    pub fn allocate(
        &mut self,
        server: &dyn GraphicsServer,
        kind: ParamBlockKind,
        bytes: &DynamicUniformBuffer,
    ) -> Result<ParamBlockHandle, RenderError> {
        let data = bytes.bytes();
        let pool = self.pool_for(kind);
        let (range, _grew) = pool.allocate(server, data.len().max(1))?;
        pool.write(range, data)?;
        Ok(ParamBlockHandle { range, kind })
    }

    /// Uploads every staged write since the last flush. Called once per frame by the orchestrator
    /// after all passes finished assembling their parameter blocks.
    pub fn flush(&mut self) -> Result<(), RenderError> {
        self.uniform_pool.flush()?;
        self.storage_pool.flush()?;
        Ok(())
    }

    /// Returns every allocation from this frame to the free-list. Must run after the GPU has
    /// consumed the frame's draws (in practice: at the start of the next frame, since this
    /// abstraction layer has no explicit fence wait).
    pub fn reset(&mut self) {
        self.uniform_pool.reset_free_list();
        self.storage_pool.reset_free_list();
    }
}
