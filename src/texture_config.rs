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

//! Texture-Unit Config: the second level of the render-task tree. An immutable, content-deduped
//! array of `{texture-or-buffer, sampler config, optional bound parameter block}` a draw needs
//! bound before it runs. Two draws that reference identical bindings share the same TUC, so the
//! executor only has to rebind state when the TUC actually changes between consecutive draws.

use crate::error::RenderError;
use crate::gapi::{GpuSampler, GpuSamplerDescriptor, GpuTexture};
use crate::gpu::GraphicsServer;
use crate::param_block::ParamBlockHandle;
use std::rc::Rc;

/// One texture slot: a shared texture plus the sampling configuration to read it with, published
/// under the symbolic name a shader variant expects (resolved to a concrete slot index by
/// [`crate::interfaces::TextureTargetMap`] at submission time).
#[derive(Clone)]
pub struct TextureBinding {
    /// Symbolic semantic name, e.g. `"ColorCubemap"`, `"Shadow1SolidDepth"`.
    pub semantic: &'static str,
    /// The bound texture.
    pub texture: GpuTexture,
    /// Sampler configuration used to read it.
    pub sampler: GpuSamplerDescriptor,
}

/// One shader-storage/uniform parameter block slot, bound under a symbolic name.
#[derive(Clone, Copy)]
pub struct BufferBinding {
    /// Symbolic semantic name, e.g. `"InstanceData"`, `"LightParams"`.
    pub semantic: &'static str,
    /// The bound parameter block.
    pub block: ParamBlockHandle,
}

/// Immutable bundle of texture and buffer bindings shared by every draw that needs exactly this
/// set bound. Construct through [`TextureUnitConfigCache::get_or_insert`] rather than directly, so
/// identical bundles are deduplicated.
#[derive(Clone, Default)]
pub struct TextureUnitConfig {
    textures: Vec<TextureBinding>,
    buffers: Vec<BufferBinding>,
}

impl TextureUnitConfig {
    /// Builds a config from its texture and buffer bindings.
    pub fn new(textures: Vec<TextureBinding>, buffers: Vec<BufferBinding>) -> Self {
        Self { textures, buffers }
    }

    /// Texture bindings, in the order they were declared.
    pub fn textures(&self) -> &[TextureBinding] {
        &self.textures
    }

    /// Buffer bindings, in the order they were declared.
    pub fn buffers(&self) -> &[BufferBinding] {
        &self.buffers
    }

    /// A content key used to deduplicate identical configs: texture identity is by pointer (two
    /// `GpuTexture`s to the same backend texture are the same binding), buffer identity is by
    /// the parameter block's byte range, which is unique per allocation within a frame.
    fn content_key(&self) -> TucContentKey {
        TucContentKey {
            textures: self
                .textures
                .iter()
                .map(|t| (t.semantic.as_ptr() as usize, Rc::as_ptr(&t.texture.0) as *const ()))
                .collect(),
            buffers: self
                .buffers
                .iter()
                .map(|b| (b.semantic.as_ptr() as usize, b.block.range.offset, b.block.range.len))
                .collect(),
        }
    }
}

#[derive(PartialEq, Eq, Clone)]
struct TucContentKey {
    textures: Vec<(usize, *const ())>,
    buffers: Vec<(usize, usize, usize)>,
}

/// Content-addressed cache of [`TextureUnitConfig`]s, keyed so that rebuilding the same bundle of
/// bindings for many drawables in a frame returns one shared instance instead of one per drawable.
#[derive(Default)]
pub struct TextureUnitConfigCache {
    entries: Vec<(TucContentKey, Rc<TextureUnitConfig>)>,
}

impl TextureUnitConfigCache {
    /// Creates an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a shared TUC equal in content to `config`, inserting it if this is the first time
    /// this exact combination of bindings was seen this frame.
    pub fn get_or_insert(&mut self, config: TextureUnitConfig) -> Rc<TextureUnitConfig> {
        let key = config.content_key();
        if let Some((_, existing)) = self.entries.iter().find(|(k, _)| *k == key) {
            return existing.clone();
        }
        let shared = Rc::new(config);
        self.entries.push((key, shared.clone()));
        shared
    }

    /// Clears the cache. Called once per frame, since TUCs reference frame-scoped parameter block
    /// handles that become invalid once [`crate::param_block::ParamBlockAllocator::reset`] runs.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Number of distinct TUCs currently cached.
    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

#[derive(PartialEq, Eq, Clone, Copy, Hash)]
struct SamplerKey {
    min_filter: crate::gapi::MinificationFilter,
    mag_filter: crate::gapi::MagnificationFilter,
    s_wrap_mode: crate::gapi::WrapMode,
    t_wrap_mode: crate::gapi::WrapMode,
    r_wrap_mode: crate::gapi::WrapMode,
    anisotropy_bits: u32,
    min_lod_bits: u32,
    max_lod_bits: u32,
    lod_bias_bits: u32,
}

impl SamplerKey {
    fn new(desc: &GpuSamplerDescriptor) -> Self {
        Self {
            min_filter: desc.min_filter,
            mag_filter: desc.mag_filter,
            s_wrap_mode: desc.s_wrap_mode,
            t_wrap_mode: desc.t_wrap_mode,
            r_wrap_mode: desc.r_wrap_mode,
            anisotropy_bits: desc.anisotropy.to_bits(),
            min_lod_bits: desc.min_lod.to_bits(),
            max_lod_bits: desc.max_lod.to_bits(),
            lod_bias_bits: desc.lod_bias.to_bits(),
        }
    }
}

/// Content-addressed cache of [`GpuSampler`]s, so that the many [`TextureBinding`]s that share an
/// identical [`GpuSamplerDescriptor`] (e.g. every shadow-map read uses the same clamped nearest
/// sampler) resolve to one backend sampler object instead of one per binding.
#[derive(Default)]
pub struct SamplerCache {
    entries: Vec<(SamplerKey, GpuSampler)>,
}

impl SamplerCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the sampler matching `desc`, creating it through `server` on first use.
    pub fn get_or_insert(
        &mut self,
        server: &dyn GraphicsServer,
        desc: &GpuSamplerDescriptor,
    ) -> Result<GpuSampler, RenderError> {
        let key = SamplerKey::new(desc);
        if let Some((_, existing)) = self.entries.iter().find(|(k, _)| *k == key) {
            return Ok(existing.clone());
        }
        let sampler = server.create_sampler(GpuSamplerDescriptor {
            min_filter: desc.min_filter,
            mag_filter: desc.mag_filter,
            s_wrap_mode: desc.s_wrap_mode,
            t_wrap_mode: desc.t_wrap_mode,
            r_wrap_mode: desc.r_wrap_mode,
            anisotropy: desc.anisotropy,
            min_lod: desc.min_lod,
            max_lod: desc.max_lod,
            lod_bias: desc.lod_bias,
        })?;
        self.entries.push((key, sampler.clone()));
        Ok(sampler)
    }

    /// Number of distinct samplers currently cached.
    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_has_empty_content_key() {
        let config = TextureUnitConfig::default();
        let key = config.content_key();
        assert!(key.textures.is_empty());
        assert!(key.buffers.is_empty());
    }
}
