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

//! Thin re-export surface over `fyrox_graphics` so the rest of this crate spells GPU resource
//! types consistently, the way `fyrox-impl::renderer` re-exports its framework types from one
//! spot instead of reaching into `fyrox_graphics` everywhere.
//!
//! The frame buffer surface (`GpuFrameBufferTrait`/`GpuFrameBuffer`/`ResourceBindGroup`/
//! `ResourceBinding`/`ReadTarget`/`BufferDataUsage`/`DrawCallStatistics`) is defined here rather
//! than re-exported: `fyrox_graphics::framebuffer` still carries an older `Box<dyn FrameBuffer>`,
//! `&mut self`-based shape that its own `gl` backend module no longer targets. The shape below
//! matches what `fyrox_graphics::gl::framebuffer` and the Vulkan backend actually implement
//! (shared `Rc` wrapper, `&self` methods, a `sampler` field on `ResourceBinding::Texture`, and a
//! split `draw`/`draw_instances` pair).

use crate::core::define_as_any_trait;
use std::any::Any;
use std::ops::Deref;
use std::rc::Rc;

pub use fyrox_graphics::{
    buffer::{BufferKind, BufferUsage, GpuBuffer},
    error::FrameworkError,
    geometry_buffer::{GeometryBufferDescriptor, GpuGeometryBuffer},
    gpu_program::{
        GpuProgram, GpuShader, SamplerFallback, ShaderKind, ShaderResourceDefinition,
        ShaderResourceKind,
    },
    gpu_texture::{
        CubeMapFace, GpuTexture, GpuTextureDescriptor, GpuTextureKind, MagnificationFilter,
        MinificationFilter, PixelKind, WrapMode,
    },
    query::GpuQuery,
    read_buffer::GpuAsyncReadBuffer,
    sampler::{GpuSampler, GpuSamplerDescriptor},
    stats::PipelineStatistics,
    BlendFunc, BlendParameters, ColorMask, CompareFunc, CullFace, DrawParameters, ElementKind,
    ElementRange, PolygonFace, PolygonFillMode, ScissorBox, StencilFunc, StencilOp,
};
pub use fyrox_graphics::core::color::Color;
pub use fyrox_graphics::core::math::Rect;

/// Which attachment slot a [`Attachment`] occupies.
#[derive(Copy, Clone, PartialOrd, PartialEq, Hash, Debug, Eq)]
pub enum AttachmentKind {
    Color,
    DepthStencil,
    Depth,
}

/// One bound render-target texture.
pub struct Attachment {
    pub kind: AttachmentKind,
    pub texture: GpuTexture,
}

/// Selects which attachment [`GpuFrameBufferTrait::read_pixels`] reads back.
#[derive(Copy, Clone, Debug)]
pub enum ReadTarget {
    Depth,
    Stencil,
    Color(usize),
}

/// How much of a bound buffer resource a [`ResourceBinding::Buffer`] exposes to the shader.
#[derive(Copy, Clone, Debug)]
pub enum BufferDataUsage {
    UseEverything,
    UseSegment { offset: usize, size: usize },
}

/// One resource bound to a shader slot for a draw call.
pub enum ResourceBinding<'a> {
    Texture {
        texture: &'a GpuTexture,
        sampler: &'a GpuSampler,
        binding: u32,
    },
    Buffer {
        buffer: &'a GpuBuffer,
        binding: u32,
        data_usage: BufferDataUsage,
    },
}

/// A set of resource bindings applied together before one draw call.
pub struct ResourceBindGroup<'a> {
    pub bindings: &'a [ResourceBinding<'a>],
}

/// Triangle count produced by one draw call.
#[derive(Debug, Copy, Clone, Default)]
pub struct DrawCallStatistics {
    pub triangles: usize,
}

define_as_any_trait!(GpuFrameBufferAsAny => GpuFrameBufferTrait);

/// Backend-implemented frame buffer operations; see `fyrox_graphics::gl::framebuffer::GlFrameBuffer`
/// for the reference OpenGL implementation this shape is grounded on.
pub trait GpuFrameBufferTrait: GpuFrameBufferAsAny {
    fn color_attachments(&self) -> &[Attachment];
    fn depth_attachment(&self) -> Option<&Attachment>;
    fn set_cubemap_face(&self, attachment_index: usize, face: CubeMapFace);
    #[allow(clippy::too_many_arguments)]
    fn blit_to(
        &self,
        dest: &GpuFrameBuffer,
        src_x0: i32,
        src_y0: i32,
        src_x1: i32,
        src_y1: i32,
        dst_x0: i32,
        dst_y0: i32,
        dst_x1: i32,
        dst_y1: i32,
        copy_color: bool,
        copy_depth: bool,
        copy_stencil: bool,
    );
    fn read_pixels(&self, read_target: ReadTarget) -> Option<Vec<u8>>;
    fn clear(
        &self,
        viewport: Rect<i32>,
        color: Option<Color>,
        depth: Option<f32>,
        stencil: Option<i32>,
    );
    fn draw(
        &self,
        geometry: &GpuGeometryBuffer,
        viewport: Rect<i32>,
        program: &GpuProgram,
        params: &DrawParameters,
        resources: &[ResourceBindGroup],
        element_range: ElementRange,
    ) -> Result<DrawCallStatistics, FrameworkError>;
    #[allow(clippy::too_many_arguments)]
    fn draw_instances(
        &self,
        instance_count: usize,
        geometry: &GpuGeometryBuffer,
        viewport: Rect<i32>,
        program: &GpuProgram,
        params: &DrawParameters,
        resources: &[ResourceBindGroup],
        element_range: ElementRange,
    ) -> Result<DrawCallStatistics, FrameworkError>;
}

/// Shared handle to a backend frame buffer, mirroring `GpuTexture`/`GpuGeometryBuffer`'s
/// `Rc`-wrapper shape.
#[derive(Clone)]
pub struct GpuFrameBuffer(pub Rc<dyn GpuFrameBufferTrait>);

impl Deref for GpuFrameBuffer {
    type Target = dyn GpuFrameBufferTrait;

    fn deref(&self) -> &Self::Target {
        self.0.deref()
    }
}

impl GpuFrameBuffer {
    pub fn as_any(&self) -> &dyn Any {
        self.0.as_any()
    }
}

/// Graphics server capabilities, probed once at startup.
#[derive(Debug)]
pub struct ServerCapabilities {
    pub max_uniform_block_size: usize,
    pub uniform_buffer_offset_alignment: usize,
    pub max_lod_bias: f32,
}

/// A shared reference to a graphics server.
pub type SharedGraphicsServer = Rc<dyn GraphicsServer>;

/// Abstraction layer over the concrete graphics backend (OpenGL, Vulkan, ...). Defined here rather
/// than re-exported because `fyrox_graphics::server` still declares the older `Box<dyn Trait>` /
/// `Rc<RefCell<dyn Trait>>` return types its own `gl` backend no longer returns; the signatures
/// below match `fyrox_graphics::gl::server::GlGraphicsServer`'s actual `impl GraphicsServer`
/// block.
pub trait GraphicsServer {
    fn create_buffer(
        &self,
        size: usize,
        buffer_kind: BufferKind,
        buffer_usage: BufferUsage,
    ) -> Result<GpuBuffer, FrameworkError>;

    fn create_texture(&self, desc: GpuTextureDescriptor) -> Result<GpuTexture, FrameworkError>;

    fn create_sampler(&self, desc: GpuSamplerDescriptor) -> Result<GpuSampler, FrameworkError>;

    fn create_frame_buffer(
        &self,
        depth_attachment: Option<Attachment>,
        color_attachments: Vec<Attachment>,
    ) -> Result<GpuFrameBuffer, FrameworkError>;

    fn back_buffer(&self) -> GpuFrameBuffer;

    fn create_query(&self) -> Result<GpuQuery, FrameworkError>;

    #[allow(clippy::too_many_arguments)]
    fn create_shader(
        &self,
        name: String,
        kind: ShaderKind,
        source: String,
        resources: &[ShaderResourceDefinition],
        line_offset: isize,
    ) -> Result<GpuShader, FrameworkError>;

    #[allow(clippy::too_many_arguments)]
    fn create_program(
        &self,
        name: &str,
        vertex_source: String,
        vertex_source_line_offset: isize,
        fragment_source: String,
        fragment_source_line_offset: isize,
        resources: &[ShaderResourceDefinition],
    ) -> Result<GpuProgram, FrameworkError>;

    fn create_async_read_buffer(
        &self,
        pixel_size: usize,
        pixel_count: usize,
    ) -> Result<GpuAsyncReadBuffer, FrameworkError>;

    fn create_geometry_buffer(
        &self,
        desc: GeometryBufferDescriptor,
    ) -> Result<GpuGeometryBuffer, FrameworkError>;

    fn weak(self: Rc<Self>) -> std::rc::Weak<dyn GraphicsServer>;

    fn flush(&self);

    fn finish(&self);

    fn invalidate_resource_bindings_cache(&self);

    fn pipeline_statistics(&self) -> PipelineStatistics;

    fn swap_buffers(&self) -> Result<(), FrameworkError>;

    fn set_frame_size(&self, new_size: (u32, u32));

    fn capabilities(&self) -> ServerCapabilities;

    fn set_polygon_fill_mode(&self, polygon_face: PolygonFace, polygon_fill_mode: PolygonFillMode);

    /// A shortcut for [`Self::create_texture`] that creates a rectangular render target with the
    /// given size and pixel kind, clamped and nearest-filtered.
    fn create_2d_render_target(
        &self,
        pixel_kind: PixelKind,
        width: usize,
        height: usize,
    ) -> Result<GpuTexture, FrameworkError> {
        self.create_texture(GpuTextureDescriptor {
            kind: GpuTextureKind::Rectangle { width, height },
            pixel_kind,
            min_filter: MinificationFilter::Nearest,
            mag_filter: MagnificationFilter::Nearest,
            s_wrap_mode: WrapMode::ClampToEdge,
            t_wrap_mode: WrapMode::ClampToEdge,
            r_wrap_mode: WrapMode::ClampToEdge,
            ..Default::default()
        })
    }
}
