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

//! Sky light rendering: orthographic cascaded shadow maps fit to slices of the camera frustum,
//! and a sun occlusion test that lets the orchestrator skip a shadow-shaft march entirely when the
//! pyramid already knows the shaft is blocked.

use crate::core::algebra::{Matrix4, Point3, Vector2, Vector3};
use crate::core::math::aabb::AxisAlignedBoundingBox;
use crate::core::math::frustum::Frustum;
use crate::error::RenderError;
use crate::gapi::{GpuTextureDescriptor, GpuTextureKind, PixelKind};
use crate::gpu::GraphicsServer;
use crate::occlusion::{is_occluded, PyramidLevel};
use crate::settings::ShadowMapPrecision;

/// Number of cascades a [`SkyCascadeRenderer`] maintains. Fixed rather than configurable, matching
/// how a three-cascade split is the scenario constant used throughout this crate's tests.
pub const SKY_CASCADE_COUNT: usize = 3;

/// How the camera's near/far range is sliced into the `SKY_CASCADE_COUNT` cascades.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CascadeSplitScheme {
    /// Explicit far-plane distances for cascades 0..2; cascade `SKY_CASCADE_COUNT - 1`'s far plane
    /// is the camera's own far plane.
    Absolute([f32; SKY_CASCADE_COUNT - 1]),
    /// Far planes expressed as a fraction of the camera's far plane.
    Relative([f32; SKY_CASCADE_COUNT - 1]),
}

impl CascadeSplitScheme {
    /// Resolves the scheme into `SKY_CASCADE_COUNT + 1` absolute z-distances (cascade `i` spans
    /// `[result[i], result[i + 1]]`), clamped so every split stays within `[z_near, z_far]` and
    /// strictly increases (a degenerate request collapsing two splits still produces a non-empty
    /// slice rather than a zero-size frustum).
    pub fn resolve(&self, z_near: f32, z_far: f32) -> [f32; SKY_CASCADE_COUNT + 1] {
        let raw = match self {
            CascadeSplitScheme::Absolute(far_planes) => {
                [z_near, far_planes[0], far_planes[1], z_far]
            }
            CascadeSplitScheme::Relative(fractions) => [
                z_near,
                z_far * fractions[0],
                z_far * fractions[1],
                z_far,
            ],
        };
        let mut values = raw;
        for i in 1..values.len() {
            if values[i] <= values[i - 1] {
                values[i] = values[i - 1] + 10.0 * f32::EPSILON;
            }
        }
        values
    }
}

impl Default for CascadeSplitScheme {
    fn default() -> Self {
        CascadeSplitScheme::Relative([0.1, 0.3])
    }
}

/// One cascade's shadow map and the light-space view-projection it was last rendered with.
pub struct SkyCascade {
    texture: Option<crate::gapi::GpuTexture>,
    /// Light-space view-projection matrix used for the cascade's last render.
    pub view_projection: Matrix4<f32>,
    /// Far distance (camera-space) this cascade covers, used by the shader to pick a cascade.
    pub z_far: f32,
}

impl SkyCascade {
    fn new(server: &dyn GraphicsServer, size: usize, precision: ShadowMapPrecision) -> Result<Self, RenderError> {
        let pixel_kind = match precision {
            ShadowMapPrecision::Full => PixelKind::D32F,
            ShadowMapPrecision::Half => PixelKind::D16,
        };
        let texture = server.create_texture(GpuTextureDescriptor {
            kind: GpuTextureKind::Rectangle {
                width: size,
                height: size,
            },
            pixel_kind,
            ..Default::default()
        })?;
        Ok(Self {
            texture: Some(texture),
            view_projection: Matrix4::identity(),
            z_far: 0.0,
        })
    }

    /// The cascade's depth texture, `None` before the first [`SkyCascadeRenderer::new`] call.
    pub fn texture(&self) -> Option<&crate::gapi::GpuTexture> {
        self.texture.as_ref()
    }
}

/// Fits an orthographic projection's min/max bounds to the light-space AABB of `frustum_corners`
/// (already transformed into light view space), expanding the near/far range by `z_mult` so
/// casters just outside the visible slice still contribute shadows. This is the pure core of the
/// cascade-fitting step, kept free of any GPU handle so cascade placement is unit-testable.
pub fn fit_orthographic_bounds(frustum_corners: &[Vector3<f32>; 8], z_mult: f32) -> AxisAlignedBoundingBox {
    let mut aabb = AxisAlignedBoundingBox::default();
    for corner in frustum_corners {
        aabb.add_point(*corner);
    }
    if aabb.min.z < 0.0 {
        aabb.min.z *= z_mult;
    } else {
        aabb.min.z /= z_mult;
    }
    if aabb.max.z < 0.0 {
        aabb.max.z /= z_mult;
    } else {
        aabb.max.z *= z_mult;
    }
    aabb
}

/// Builds the light-space view matrix for a sky light: looks from a point offset from `center`
/// along the (negated, normalized) light direction back toward `center`, using `light_up` as the
/// up vector.
pub fn sky_light_view_matrix(center: Vector3<f32>, light_direction: Vector3<f32>, light_up: Vector3<f32>) -> Matrix4<f32> {
    let direction = light_direction
        .try_normalize(f32::EPSILON)
        .unwrap_or_else(Vector3::y);
    let up = light_up.try_normalize(f32::EPSILON).unwrap_or_else(Vector3::z);
    let eye = center + direction;
    Matrix4::look_at_lh(&Point3::from(eye), &Point3::from(center), &up)
}

/// Renders and maintains the `SKY_CASCADE_COUNT` orthographic cascades for one sky light.
pub struct SkyCascadeRenderer {
    cascades: Vec<SkyCascade>,
    size: usize,
    precision: ShadowMapPrecision,
    split_scheme: CascadeSplitScheme,
}

impl SkyCascadeRenderer {
    /// Allocates the cascade textures.
    pub fn new(
        server: &dyn GraphicsServer,
        size: usize,
        precision: ShadowMapPrecision,
        split_scheme: CascadeSplitScheme,
    ) -> Result<Self, RenderError> {
        let mut cascades = Vec::with_capacity(SKY_CASCADE_COUNT);
        for _ in 0..SKY_CASCADE_COUNT {
            cascades.push(SkyCascade::new(server, size, precision)?);
        }
        Ok(Self {
            cascades,
            size,
            precision,
            split_scheme,
        })
    }

    /// Shadow map texel size shared by every cascade.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Shadow map depth precision shared by every cascade.
    pub fn precision(&self) -> ShadowMapPrecision {
        self.precision
    }

    /// The cascade split scheme currently in effect.
    pub fn split_scheme(&self) -> CascadeSplitScheme {
        self.split_scheme
    }

    /// The maintained cascades, nearest first.
    pub fn cascades(&self) -> &[SkyCascade] {
        &self.cascades
    }

    /// Recomputes every cascade's `view_projection`/`z_far` for the current camera frustum and
    /// sky light direction (§4's Sky/Cascaded Renderer: "fits an orthographic projection to a
    /// slice of the view frustum per cascade").
    pub fn update(
        &mut self,
        camera_frustum: &Frustum,
        camera_z_near: f32,
        camera_z_far: f32,
        light_direction: Vector3<f32>,
        light_up: Vector3<f32>,
    ) {
        let splits = self.split_scheme.resolve(camera_z_near, camera_z_far);
        let corners = camera_frustum.corners();
        for (i, cascade) in self.cascades.iter_mut().enumerate() {
            let z_far = splits[i + 1];
            let center = corners.iter().sum::<Vector3<f32>>() / corners.len() as f32;
            let light_view = sky_light_view_matrix(center, light_direction, light_up);
            let light_space_corners = corners.map(|corner| light_view.transform_point(&Point3::from(corner)).coords);
            let bounds = fit_orthographic_bounds(&light_space_corners, 10.0);
            let projection = Matrix4::new_orthographic(
                bounds.min.x,
                bounds.max.x,
                bounds.min.y,
                bounds.max.y,
                bounds.min.z,
                bounds.max.z,
            );
            cascade.view_projection = projection * light_view;
            cascade.z_far = z_far;
        }
    }

    /// Picks the nearest cascade whose `z_far` still covers `view_space_depth`, clamping to the
    /// last cascade for distances beyond every split (matching a standard CSM fragment-shader
    /// cascade select, exposed here so it is testable without a shader).
    pub fn cascade_index_for_depth(&self, view_space_depth: f32) -> usize {
        self.cascades
            .iter()
            .position(|c| view_space_depth <= c.z_far)
            .unwrap_or(self.cascades.len().saturating_sub(1))
    }
}

/// A coarse screen-space grid recording, per tile, whether a ray from that tile toward the sun is
/// already known to be blocked by the occlusion pyramid — lets the orchestrator skip a volumetric
/// shadow-shaft march for tiles that could not possibly see the sun (§2b's supplemented ambient
/// modulation behavior extended to sky shafts).
pub struct SunOcclusionMap {
    tile_size: usize,
    /// `true` where the shaft toward the sun is occluded.
    occluded: Vec<bool>,
    width_tiles: usize,
    height_tiles: usize,
}

impl SunOcclusionMap {
    /// Builds an occlusion map over a `viewport_width x viewport_height` screen, one tile per
    /// `tile_size` pixels in each axis.
    pub fn new(viewport_width: usize, viewport_height: usize, tile_size: usize) -> Self {
        let tile_size = tile_size.max(1);
        let width_tiles = viewport_width.div_ceil(tile_size).max(1);
        let height_tiles = viewport_height.div_ceil(tile_size).max(1);
        Self {
            tile_size,
            occluded: vec![false; width_tiles * height_tiles],
            width_tiles,
            height_tiles,
        }
    }

    /// Number of tiles across, for test/debug introspection.
    pub fn width_tiles(&self) -> usize {
        self.width_tiles
    }

    /// Number of tiles down, for test/debug introspection.
    pub fn height_tiles(&self) -> usize {
        self.height_tiles
    }

    /// Recomputes every tile's occlusion flag: for each tile, builds a thin AABB shaft running
    /// from the tile's view-space position out along `light_direction` for `shaft_length`, and
    /// tests it against the occlusion pyramid using the same point-vs-pyramid test object passes
    /// use.
    pub fn update(
        &mut self,
        pyramid: &[PyramidLevel],
        view_projection: &Matrix4<f32>,
        tile_view_positions: &[Vector3<f32>],
        light_direction: Vector3<f32>,
        shaft_length: f32,
    ) {
        debug_assert_eq!(tile_view_positions.len(), self.occluded.len());
        let direction = light_direction
            .try_normalize(f32::EPSILON)
            .unwrap_or_else(Vector3::y);
        for (slot, &position) in self.occluded.iter_mut().zip(tile_view_positions) {
            let far_point = position + direction * shaft_length;
            let mut aabb = AxisAlignedBoundingBox::default();
            aabb.add_point(position);
            aabb.add_point(far_point);
            *slot = is_occluded(pyramid, &aabb, view_projection);
        }
    }

    /// Whether the tile covering `tile_coord` (in tile units, not pixels) is known-occluded.
    /// Coordinates outside the grid are treated as visible, matching the conservative default
    /// every other occlusion query in this crate uses for out-of-range input.
    pub fn is_tile_occluded(&self, tile_coord: (usize, usize)) -> bool {
        let (x, y) = tile_coord;
        if x >= self.width_tiles || y >= self.height_tiles {
            return false;
        }
        self.occluded[y * self.width_tiles + x]
    }

    /// Converts a pixel coordinate to the tile coordinate [`SunOcclusionMap::is_tile_occluded`]
    /// expects.
    pub fn tile_for_pixel(&self, pixel: Vector2<f32>) -> (usize, usize) {
        (
            (pixel.x as usize / self.tile_size).min(self.width_tiles.saturating_sub(1)),
            (pixel.y as usize / self.tile_size).min(self.height_tiles.saturating_sub(1)),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relative_split_scheme_produces_increasing_bounds() {
        let scheme = CascadeSplitScheme::Relative([0.1, 0.4]);
        let splits = scheme.resolve(0.1, 100.0);
        assert_eq!(splits[0], 0.1);
        assert_eq!(splits[3], 100.0);
        for i in 1..splits.len() {
            assert!(splits[i] > splits[i - 1]);
        }
    }

    #[test]
    fn absolute_split_scheme_clamps_degenerate_request() {
        let scheme = CascadeSplitScheme::Absolute([5.0, 5.0]);
        let splits = scheme.resolve(1.0, 10.0);
        assert!(splits[2] > splits[1]);
    }

    #[test]
    fn fit_orthographic_bounds_expands_far_plane_beyond_raw_extent() {
        let corners = [
            Vector3::new(-1.0, -1.0, -1.0),
            Vector3::new(1.0, -1.0, -1.0),
            Vector3::new(-1.0, 1.0, -1.0),
            Vector3::new(1.0, 1.0, -1.0),
            Vector3::new(-1.0, -1.0, 5.0),
            Vector3::new(1.0, -1.0, 5.0),
            Vector3::new(-1.0, 1.0, 5.0),
            Vector3::new(1.0, 1.0, 5.0),
        ];
        let bounds = fit_orthographic_bounds(&corners, 10.0);
        assert_eq!(bounds.min.z, -10.0);
        assert_eq!(bounds.max.z, 50.0);
    }

    #[test]
    fn sky_light_view_matrix_looks_toward_center() {
        let view = sky_light_view_matrix(Vector3::new(0.0, 0.0, 0.0), Vector3::new(0.0, -1.0, 0.0), Vector3::new(0.0, 0.0, 1.0));
        let center_in_view = view.transform_point(&Point3::origin());
        // The center of interest must land in front of the eye (positive view-space Z for a
        // left-handed look-at).
        assert!(center_in_view.z > 0.0);
    }

    #[test]
    fn sun_occlusion_map_defaults_to_visible() {
        let map = SunOcclusionMap::new(64, 64, 16);
        assert_eq!(map.width_tiles(), 4);
        assert_eq!(map.height_tiles(), 4);
        assert!(!map.is_tile_occluded((0, 0)));
        assert!(!map.is_tile_occluded((99, 99)));
    }

    #[test]
    fn sun_occlusion_map_flags_tiles_behind_opaque_pyramid() {
        let mut map = SunOcclusionMap::new(16, 16, 16);
        let pyramid = vec![PyramidLevel {
            width: 1,
            height: 1,
            texels: vec![(0.0, 0.1)],
        }];
        let view_projection = Matrix4::identity();
        map.update(
            &pyramid,
            &view_projection,
            &[Vector3::new(0.0, 0.0, 2.0)],
            Vector3::new(0.0, 0.0, 1.0),
            5.0,
        );
        assert!(map.is_tile_occluded((0, 0)));
    }
}
