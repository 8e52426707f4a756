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

//! Linear-depth occlusion pyramid (§3 "Occlusion map", §4's Occlusion Subsystem): a `maxLevels`
//! mip chain built by a 2×2 min/max reduction of linear-depth space, plus the point-sampled
//! visibility test run against it for both objects and lights.

use crate::core::algebra::{Matrix4, Vector4};
use crate::core::math::aabb::AxisAlignedBoundingBox;
use crate::error::RenderError;
use crate::gapi::{GpuTexture, GpuTextureDescriptor, GpuTextureKind, PixelKind};
use crate::gpu::GraphicsServer;

/// One mip level of the pyramid: a row-major buffer of linear-depth min/max pairs, `width *
/// height` entries.
#[derive(Debug, Clone)]
pub struct PyramidLevel {
    pub width: usize,
    pub height: usize,
    /// `(min, max)` linear depth per texel.
    pub texels: Vec<(f32, f32)>,
}

impl PyramidLevel {
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            texels: vec![(f32::INFINITY, 0.0); width.max(1) * height.max(1)],
        }
    }

    fn at(&self, x: usize, y: usize) -> (f32, f32) {
        self.texels[y * self.width + x]
    }
}

/// Reduces `prev` into the next coarser level: each output texel is the min/max of the 2×2 (or
/// edge-clamped 1×2 / 2×1 / 1×1) window of input texels it covers. This is the pure, GPU-free core
/// of the pyramid build so it can be unit tested directly (§8: "Level i+1 equals per-pixel min/max
/// of 2×2 window in level i").
pub fn reduce_level(prev: &PyramidLevel) -> PyramidLevel {
    let width = (prev.width + 1) / 2;
    let height = (prev.height + 1) / 2;
    let mut next = PyramidLevel::new(width, height);
    for y in 0..height {
        for x in 0..width {
            let x0 = x * 2;
            let y0 = y * 2;
            let x1 = (x0 + 1).min(prev.width - 1);
            let y1 = (y0 + 1).min(prev.height - 1);
            let mut lo = f32::INFINITY;
            let mut hi = f32::NEG_INFINITY;
            for (sx, sy) in [(x0, y0), (x1, y0), (x0, y1), (x1, y1)] {
                let (a, b) = prev.at(sx, sy);
                lo = lo.min(a);
                hi = hi.max(b);
            }
            next.texels[y * width + x] = (lo, hi);
        }
    }
    next
}

/// Builds the full mip chain for one layer, starting from a base level already filled with the
/// per-pixel linear depth (min == max at level 0), stopping once a dimension hits 1 or
/// `max_levels` levels have been produced.
pub fn build_pyramid(base: PyramidLevel, max_levels: usize) -> Vec<PyramidLevel> {
    let mut levels = Vec::with_capacity(max_levels);
    levels.push(base);
    while levels.len() < max_levels {
        let prev = levels.last().unwrap();
        if prev.width <= 1 && prev.height <= 1 {
            break;
        }
        levels.push(reduce_level(prev));
    }
    levels
}

/// GPU-backed occlusion pyramid, a 2-layer array texture (one layer per stereo eye) holding
/// `max_levels` mips of linear depth.
pub struct OcclusionPyramid {
    texture: Option<GpuTexture>,
    width: usize,
    height: usize,
    max_levels: usize,
}

impl OcclusionPyramid {
    pub fn new(max_levels: usize) -> Self {
        Self {
            texture: None,
            width: 0,
            height: 0,
            max_levels,
        }
    }

    /// Ensures the array texture matches `viewport_width / 2 × viewport_height / 2` (§3: "base
    /// size ≈ viewport / 2 in each axis"), recreating it if the viewport was resized.
    pub fn ensure_allocated(
        &mut self,
        server: &dyn GraphicsServer,
        viewport_width: usize,
        viewport_height: usize,
    ) -> Result<(), RenderError> {
        let width = (viewport_width / 2).max(1);
        let height = (viewport_height / 2).max(1);
        if self.texture.is_some() && self.width == width && self.height == height {
            return Ok(());
        }
        self.texture = Some(server.create_texture(GpuTextureDescriptor {
            // One depth slice per stereo eye.
            kind: GpuTextureKind::Volume {
                width,
                height,
                depth: 2,
            },
            pixel_kind: PixelKind::R32F,
            mip_count: self.max_levels,
            ..Default::default()
        })?);
        self.width = width;
        self.height = height;
        Ok(())
    }

    pub fn texture(&self) -> Option<&GpuTexture> {
        self.texture.as_ref()
    }

    pub fn max_levels(&self) -> usize {
        self.max_levels
    }
}

/// Samples the CPU-mirrored pyramid level covering `ndc_xy` (in `[-1, 1]`) and returns `(min,
/// max)` linear depth at that texel, clamping to the level edges. Used by tests and by the
/// fallback point-sampled path when transform feedback isn't available (§4.8).
pub fn sample_level(level: &PyramidLevel, ndc_xy: (f32, f32)) -> (f32, f32) {
    let u = (ndc_xy.0 * 0.5 + 0.5).clamp(0.0, 0.999_999);
    let v = (ndc_xy.1 * 0.5 + 0.5).clamp(0.0, 0.999_999);
    let x = ((u * level.width as f32) as usize).min(level.width.saturating_sub(1));
    let y = ((v * level.height as f32) as usize).min(level.height.saturating_sub(1));
    level.at(x, y)
}

/// Projects every corner of `aabb` through `view_projection`, picks the mip level whose texel
/// footprint covers the projected screen-space extent (coarser for larger objects, matching a
/// standard hierarchical-Z query), and compares the object's nearest depth against the pyramid's
/// stored max at that texel: if the object's nearest point is farther than everything the pyramid
/// already saw as opaque, it is occluded.
pub fn is_occluded(
    pyramid: &[PyramidLevel],
    aabb: &AxisAlignedBoundingBox,
    view_projection: &Matrix4<f32>,
) -> bool {
    if pyramid.is_empty() {
        return false;
    }
    let corners = aabb.corners();
    let mut min_ndc = (f32::INFINITY, f32::INFINITY);
    let mut max_ndc = (f32::NEG_INFINITY, f32::NEG_INFINITY);
    let mut nearest_depth = f32::INFINITY;
    let mut any_in_front = false;
    for corner in corners {
        let clip = view_projection * Vector4::new(corner.x, corner.y, corner.z, 1.0);
        if clip.w <= 0.0 {
            any_in_front = true;
            continue;
        }
        let ndc_x = clip.x / clip.w;
        let ndc_y = clip.y / clip.w;
        let depth = clip.z / clip.w;
        min_ndc.0 = min_ndc.0.min(ndc_x);
        min_ndc.1 = min_ndc.1.min(ndc_y);
        max_ndc.0 = max_ndc.0.max(ndc_x);
        max_ndc.1 = max_ndc.1.max(ndc_y);
        nearest_depth = nearest_depth.min(depth);
    }
    if any_in_front {
        // Straddles the near plane or is behind the camera entirely; never cull.
        return false;
    }
    let screen_span = ((max_ndc.0 - min_ndc.0).max(max_ndc.1 - min_ndc.1)).max(0.0);
    let level_index = screen_span_to_level(screen_span, pyramid.len());
    let level = &pyramid[level_index];
    let center = (
        (min_ndc.0 + max_ndc.0) * 0.5,
        (min_ndc.1 + max_ndc.1) * 0.5,
    );
    let (_, stored_max) = sample_level(level, center);
    nearest_depth > stored_max
}

/// Picks the mip level whose texel covers a screen-space NDC span of `span`: level 0 covers the
/// full-resolution texel, each level up doubles the texel footprint.
fn screen_span_to_level(span: f32, level_count: usize) -> usize {
    if span <= 0.0 || level_count <= 1 {
        return 0;
    }
    let approx = (span * 0.5).log2().max(0.0);
    (approx.ceil() as usize).min(level_count - 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flat_level(width: usize, height: usize, value: f32) -> PyramidLevel {
        PyramidLevel {
            width,
            height,
            texels: vec![(value, value); width * height],
        }
    }

    #[test]
    fn reduce_level_is_minmax_of_two_by_two_window() {
        let mut base = PyramidLevel::new(4, 4);
        for y in 0..4 {
            for x in 0..4 {
                let v = (y * 4 + x) as f32;
                base.texels[y * 4 + x] = (v, v);
            }
        }
        let next = reduce_level(&base);
        assert_eq!(next.width, 2);
        assert_eq!(next.height, 2);
        // top-left 2x2 window covers values {0,1,4,5}
        assert_eq!(next.at(0, 0), (0.0, 5.0));
        // bottom-right 2x2 window covers values {10,11,14,15}
        assert_eq!(next.at(1, 1), (10.0, 15.0));
    }

    #[test]
    fn reduce_level_clamps_odd_dimensions_at_the_edge() {
        let base = flat_level(3, 3, 7.0);
        let next = reduce_level(&base);
        assert_eq!(next.width, 2);
        assert_eq!(next.height, 2);
        assert_eq!(next.at(1, 1), (7.0, 7.0));
    }

    #[test]
    fn build_pyramid_stops_at_one_by_one() {
        let base = flat_level(4, 4, 1.0);
        let levels = build_pyramid(base, 16);
        assert_eq!(levels.last().unwrap().width, 1);
        assert_eq!(levels.last().unwrap().height, 1);
        assert!(levels.len() <= 16);
    }

    #[test]
    fn build_pyramid_respects_max_levels_cap() {
        let base = flat_level(64, 64, 1.0);
        let levels = build_pyramid(base, 3);
        assert_eq!(levels.len(), 3);
    }

    #[test]
    fn sample_level_clamps_to_edges() {
        let level = flat_level(2, 2, 3.0);
        assert_eq!(sample_level(&level, (-10.0, -10.0)), (3.0, 3.0));
        assert_eq!(sample_level(&level, (10.0, 10.0)), (3.0, 3.0));
    }
}
