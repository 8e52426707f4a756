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

//! Per-light-type (point/spot/projector/sky) lighting pass: the light data model, the spot
//! attenuation and distance-falloff math the parameter block is derived from, and the light
//! volume proxy geometry/pipeline state used to mark which pixels a light touches. Parameters
//! are assembled through this crate's own [`crate::param_block`]/[`crate::texture_config`]
//! machinery rather than one `UniformLocation` field per light kind.

use crate::core::algebra::Vector3;
use crate::core::math::aabb::AxisAlignedBoundingBox;
use crate::error::RenderError;
use crate::gapi::{
    BlendEquation, BlendFactor, BlendFunc, BlendParameters, CompareFunc, CullFace, GpuSamplerDescriptor,
    GpuTexture,
};
use crate::gpu::GraphicsServer;
use crate::pipeline::PipelineConfig;
use crate::shadow::ShadowCaster;
use crate::shape;
use crate::texture_config::{BufferBinding, TextureBinding, TextureUnitConfig};
use fyrox_graphics::gpu_geometry_buffer::GpuGeometryBuffer;
use fyrox_graphics::uniform::DynamicUniformBuffer;

/// Which of the four light kinds a [`Light`] is (§3: "a light is one of {point, spot, projector,
/// sky}").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LightKind {
    Point,
    Spot,
    Projector,
    Sky,
}

/// One scene light's render-relevant attributes (§3 "Light").
pub struct Light {
    pub kind: LightKind,
    /// World-space transform; translation is the light position, the -Z column is its forward
    /// direction for spot/projector/sky lights.
    pub world_transform: crate::core::algebra::Matrix4<f32>,
    /// Linear-space color.
    pub color: Vector3<f32>,
    pub intensity: f32,
    pub range: f32,
    pub ambient_ratio: f32,
    pub attenuation_coefficient: f32,
    pub damping_coefficient: f32,
    pub damping_threshold: f32,
    /// Full cone angle, radians; spot lights only.
    pub spot_angle: f32,
    pub spot_ratio: f32,
    pub spot_smoothness: f32,
    pub spot_exponent: f32,
    /// Optional gobo/projector texture, 2D or omnidirectional cube/equirect.
    pub light_image: Option<GpuTexture>,
    /// Optional runtime-generated target (e.g. a portal or mirror feed).
    pub light_canvas: Option<GpuTexture>,
    /// Shadow tiers for this light, `None` if it never casts shadows.
    pub shadow_caster: Option<ShadowCaster>,
    /// Crop box narrowing the light volume, derived from the shadow boundary analysis.
    pub crop_box: Option<AxisAlignedBoundingBox>,
}

impl Light {
    /// World-space position, read from the transform's translation column.
    pub fn position(&self) -> Vector3<f32> {
        Vector3::new(
            self.world_transform[(0, 3)],
            self.world_transform[(1, 3)],
            self.world_transform[(2, 3)],
        )
    }

    /// World-space forward direction (spot/projector/sky only); the transform's -Z column.
    pub fn direction(&self) -> Vector3<f32> {
        -Vector3::new(
            self.world_transform[(0, 2)],
            self.world_transform[(1, 2)],
            self.world_transform[(2, 2)],
        )
    }
}

/// MAD-rewritten coefficients for the spot cone falloff, derived once per light per frame from
/// `spot_smoothness`/`spot_exponent` so the per-pixel cost is one multiply-add plus a `pow`.
///
/// `cone_radius` is the distance from the center of the spot's projected circle, normalized so
/// the outer edge of the cone sits at `0.5`:
/// `attenuation = clamp(cone_radius * factor + base, 0, 1) ^ exponent`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpotAttenuationCoefficients {
    pub factor: f32,
    pub base: f32,
    pub exponent: f32,
}

impl SpotAttenuationCoefficients {
    /// Derives the coefficients from a light's smoothness/exponent. When smoothness is
    /// (near-)zero the cone has a hard edge and the MAD form degenerates; see
    /// [`SpotAttenuationCoefficients::is_hard_edge`].
    pub fn new(spot_smoothness: f32, spot_exponent: f32) -> Self {
        let mut factor = 0.5 * spot_smoothness;
        if factor < f32::EPSILON {
            return Self {
                factor: 0.0,
                base: 0.0,
                exponent: 0.0,
            };
        }
        let base = 0.5 / factor;
        factor = -1.0 / factor;
        Self {
            factor,
            base,
            exponent: spot_exponent,
        }
    }

    /// `true` when smoothness collapsed to a hard step function rather than a smooth falloff.
    pub fn is_hard_edge(&self) -> bool {
        self.factor == 0.0 && self.base == 0.0
    }
}

/// Evaluates the spot cone falloff at `cone_radius` (distance from the projected spot circle's
/// center, outer edge at `0.5`). Pure CPU-side function so the falloff shape is unit-testable
/// without a shader (§8: "spot attenuation falloff").
pub fn spot_attenuation(cone_radius: f32, coeffs: SpotAttenuationCoefficients) -> f32 {
    if coeffs.is_hard_edge() {
        return if cone_radius <= 0.5 { 1.0 } else { 0.0 };
    }
    let linear = (cone_radius * coeffs.factor + coeffs.base).clamp(0.0, 1.0);
    linear.powf(coeffs.exponent.max(0.0))
}

/// Cosines of the half hotspot (inner) and half outer cone angles, used alongside
/// [`SpotAttenuationCoefficients`] for a cheap early-out cone test before the MAD falloff runs.
pub fn spot_cone_cosines(spot_angle: f32, spot_smoothness: f32) -> (f32, f32) {
    let half_outer = (spot_angle * 0.5).cos();
    let half_hotspot = (spot_angle * (1.0 - spot_smoothness) * 0.5).cos();
    (half_hotspot, half_outer)
}

/// Distance (range) attenuation for point/spot/projector lights: an inverse-square falloff driven
/// by `attenuation_coefficient`, smoothly damped to zero over the last `damping_threshold`
/// fraction of `range` using `damping_coefficient` as the damping curve's exponent.
pub fn distance_attenuation(distance: f32, light: &Light) -> f32 {
    let distance = distance.max(0.0);
    if light.range <= 0.0 || distance >= light.range {
        return 0.0;
    }
    let inverse_square = 1.0 / (1.0 + light.attenuation_coefficient * distance * distance);
    let damping_start = light.range * light.damping_threshold.clamp(0.0, 1.0);
    let damping = if distance <= damping_start {
        1.0
    } else {
        let span = (light.range - damping_start).max(f32::EPSILON);
        let t = ((light.range - distance) / span).clamp(0.0, 1.0);
        t.powf(light.damping_coefficient.max(0.0))
    };
    (inverse_square * damping).clamp(0.0, 1.0)
}

/// Fixed ambient term for a light, spatially modulated by the ambient shadow tier's
/// self-shadowing silhouette mesh rather than applied as a flat light-volume-wide scalar (§2b's
/// supplemented behavior).
pub fn ambient_contribution(light: &Light, ambient_shadow_factor: f32) -> f32 {
    light.ambient_ratio * ambient_shadow_factor.clamp(0.0, 1.0)
}

/// Everything the light parameter block needs, assembled once per light per frame before the
/// lighting-pass draw. Kept as a plain struct so the packing order is visible in one place and
/// testable without a live [`crate::param_block::ParamBlockAllocator`].
pub struct LightDrawParams {
    pub color: Vector3<f32>,
    pub intensity: f32,
    pub position: Vector3<f32>,
    pub range: f32,
    pub direction: Vector3<f32>,
    pub ambient_ratio: f32,
    pub attenuation_coefficient: f32,
    pub damping_coefficient: f32,
    pub damping_threshold: f32,
    pub spot: SpotAttenuationCoefficients,
    pub half_hotspot_cone_cos: f32,
    pub half_cone_cos: f32,
    pub shadows_enabled: bool,
    pub soft_shadows: bool,
    pub shadow_bias: f32,
    pub shadow_alpha: f32,
}

impl LightDrawParams {
    /// Builds the draw parameters for `light`; shadow-related fields are supplied by the caller
    /// since they depend on the shadow caster's current slot state, not the light data alone.
    #[allow(clippy::too_many_arguments)]
    pub fn from_light(
        light: &Light,
        shadows_enabled: bool,
        soft_shadows: bool,
        shadow_bias: f32,
        shadow_alpha: f32,
    ) -> Self {
        let (half_hotspot_cone_cos, half_cone_cos) =
            spot_cone_cosines(light.spot_angle, light.spot_smoothness);
        Self {
            color: light.color,
            intensity: light.intensity,
            position: light.position(),
            range: light.range,
            direction: light.direction(),
            ambient_ratio: light.ambient_ratio,
            attenuation_coefficient: light.attenuation_coefficient,
            damping_coefficient: light.damping_coefficient,
            damping_threshold: light.damping_threshold,
            spot: SpotAttenuationCoefficients::new(light.spot_smoothness, light.spot_exponent),
            half_hotspot_cone_cos,
            half_cone_cos,
            shadows_enabled,
            soft_shadows,
            shadow_bias,
            shadow_alpha,
        }
    }

    /// Packs the fields into a `std140` byte buffer in declaration order, ready for
    /// [`crate::param_block::ParamBlockAllocator::allocate`].
    pub fn to_uniform_buffer(&self) -> DynamicUniformBuffer {
        DynamicUniformBuffer::new()
            .with(&self.color)
            .with(&self.intensity)
            .with(&self.position)
            .with(&self.range)
            .with(&self.direction)
            .with(&self.ambient_ratio)
            .with(&self.attenuation_coefficient)
            .with(&self.damping_coefficient)
            .with(&self.damping_threshold)
            .with(&self.spot.factor)
            .with(&self.spot.base)
            .with(&self.spot.exponent)
            .with(&self.half_hotspot_cone_cos)
            .with(&self.half_cone_cos)
            .with(&self.shadows_enabled)
            .with(&self.soft_shadows)
            .with(&self.shadow_bias)
            .with(&self.shadow_alpha)
    }
}

/// Builds the [`TextureUnitConfig`] a light's accumulation draw binds: the G-buffer samplers
/// every light kind needs plus whichever of shadow map / cookie / light canvas this particular
/// light actually has.
pub fn light_texture_unit_config(
    light: &Light,
    depth: GpuTexture,
    normal: GpuTexture,
    material: GpuTexture,
    color: GpuTexture,
    gbuffer_sampler: GpuSamplerDescriptor,
    shadow_sampler: GpuSamplerDescriptor,
    shadow_map: Option<GpuTexture>,
    block: BufferBinding,
) -> TextureUnitConfig {
    let mut textures = vec![
        TextureBinding {
            semantic: "DepthBuffer",
            texture: depth,
            sampler: gbuffer_sampler,
        },
        TextureBinding {
            semantic: "NormalBuffer",
            texture: normal,
            sampler: gbuffer_sampler,
        },
        TextureBinding {
            semantic: "MaterialBuffer",
            texture: material,
            sampler: gbuffer_sampler,
        },
        TextureBinding {
            semantic: "ColorBuffer",
            texture: color,
            sampler: gbuffer_sampler,
        },
    ];
    if let Some(shadow_map) = shadow_map {
        textures.push(TextureBinding {
            semantic: shadow_map_semantic(light.kind),
            texture: shadow_map,
            sampler: shadow_sampler,
        });
    }
    if let Some(cookie) = light.light_image.clone() {
        textures.push(TextureBinding {
            semantic: "CookieTexture",
            texture: cookie,
            sampler: gbuffer_sampler,
        });
    }
    TextureUnitConfig::new(textures, vec![block])
}

fn shadow_map_semantic(kind: LightKind) -> &'static str {
    match kind {
        LightKind::Point => "PointShadowTexture",
        LightKind::Spot => "SpotShadowTexture",
        LightKind::Projector => "ProjectorShadowTexture",
        LightKind::Sky => "SkyShadowTexture",
    }
}

/// Shared light-volume proxy meshes: a unit sphere for point lights (and as a full-scene stand-in
/// for sky lights, whose accumulation actually runs as a full-screen pass driven by the
/// orchestrator rather than this mesh) and a unit cone for spot/projector lights.
pub struct LightVolumes {
    pub sphere: GpuGeometryBuffer,
    pub cone: GpuGeometryBuffer,
}

impl LightVolumes {
    pub fn new(server: &dyn GraphicsServer) -> Result<Self, RenderError> {
        Ok(Self {
            sphere: shape::make_sphere(server, 16, 8, 1.0)?,
            cone: shape::make_cone(server, 16, 1.0, 1.0)?,
        })
    }

    /// The proxy geometry used to bound `kind`'s area of effect; sky lights are driven by a
    /// full-screen triangle elsewhere and never consult this.
    pub fn geometry_for(&self, kind: LightKind) -> &GpuGeometryBuffer {
        match kind {
            LightKind::Point => &self.sphere,
            LightKind::Spot | LightKind::Projector => &self.cone,
            LightKind::Sky => &self.sphere,
        }
    }
}

/// Rasterization state for a light volume draw: additive-blended, no depth write, and with the
/// cull face and depth comparison flipped when the camera sits inside the proxy mesh so the
/// volume still contributes light instead of being culled away entirely.
pub fn light_volume_pipeline_config(camera_inside: bool, inverse_depth: bool) -> PipelineConfig {
    // When the camera sits inside the volume every covered pixel must be shaded exactly once, so
    // the depth test is disabled entirely rather than flipped.
    let depth_test = if camera_inside {
        None
    } else {
        Some(CompareFunc::LessOrEqual)
    };
    let cull_face = if camera_inside {
        CullFace::Front
    } else {
        CullFace::Back
    };
    PipelineConfig {
        depth_test,
        depth_write: false,
        cull_face: Some(cull_face),
        blend: Some(BlendParameters {
            func: BlendFunc::new(BlendFactor::One, BlendFactor::One),
            equation: BlendEquation::default(),
        }),
        inverse_depth,
        ..PipelineConfig::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_light(kind: LightKind) -> Light {
        Light {
            kind,
            world_transform: crate::core::algebra::Matrix4::identity(),
            color: Vector3::new(1.0, 1.0, 1.0),
            intensity: 1.0,
            range: 10.0,
            ambient_ratio: 0.2,
            attenuation_coefficient: 1.0,
            damping_coefficient: 2.0,
            damping_threshold: 0.8,
            spot_angle: std::f32::consts::FRAC_PI_2,
            spot_ratio: 1.0,
            spot_smoothness: 0.3,
            spot_exponent: 1.0,
            light_image: None,
            light_canvas: None,
            shadow_caster: None,
            crop_box: None,
        }
    }

    #[test]
    fn spot_attenuation_is_full_at_center_and_zero_at_outer_edge() {
        let coeffs = SpotAttenuationCoefficients::new(0.5, 1.0);
        assert_eq!(spot_attenuation(0.0, coeffs), 1.0);
        assert_eq!(spot_attenuation(0.5, coeffs), 0.0);
    }

    #[test]
    fn spot_attenuation_is_monotonically_non_increasing() {
        let coeffs = SpotAttenuationCoefficients::new(0.6, 2.0);
        let mut prev = spot_attenuation(0.0, coeffs);
        for i in 1..=10 {
            let radius = i as f32 * 0.05;
            let value = spot_attenuation(radius, coeffs);
            assert!(value <= prev + f32::EPSILON, "falloff increased at radius {radius}");
            prev = value;
        }
    }

    #[test]
    fn spot_attenuation_hard_edge_is_a_step_function() {
        let coeffs = SpotAttenuationCoefficients::new(0.0, 1.0);
        assert!(coeffs.is_hard_edge());
        assert_eq!(spot_attenuation(0.4, coeffs), 1.0);
        assert_eq!(spot_attenuation(0.6, coeffs), 0.0);
    }

    #[test]
    fn spot_cone_cosines_hotspot_is_tighter_than_outer() {
        let (hotspot, outer) = spot_cone_cosines(std::f32::consts::FRAC_PI_2, 0.25);
        // The hotspot cone is narrower, so its half-angle is smaller, so its cosine is larger.
        assert!(hotspot > outer);
    }

    #[test]
    fn distance_attenuation_is_zero_beyond_range() {
        let light = base_light(LightKind::Point);
        assert_eq!(distance_attenuation(10.0, &light), 0.0);
        assert_eq!(distance_attenuation(20.0, &light), 0.0);
    }

    #[test]
    fn distance_attenuation_decreases_monotonically_within_range() {
        let light = base_light(LightKind::Point);
        let mut prev = distance_attenuation(0.0, &light);
        for i in 1..=9 {
            let d = i as f32;
            let value = distance_attenuation(d, &light);
            assert!(value <= prev, "attenuation increased at distance {d}");
            prev = value;
        }
    }

    #[test]
    fn distance_attenuation_is_continuous_at_damping_start() {
        let light = base_light(LightKind::Point);
        let damping_start = light.range * light.damping_threshold;
        let just_before = distance_attenuation(damping_start - 0.001, &light);
        let just_after = distance_attenuation(damping_start + 0.001, &light);
        assert!((just_before - just_after).abs() < 0.01);
    }

    #[test]
    fn ambient_contribution_scales_by_shadow_factor() {
        let light = base_light(LightKind::Sky);
        assert_eq!(ambient_contribution(&light, 1.0), light.ambient_ratio);
        assert_eq!(ambient_contribution(&light, 0.0), 0.0);
        assert_eq!(ambient_contribution(&light, 0.5), light.ambient_ratio * 0.5);
    }

    #[test]
    fn light_volume_pipeline_flips_culling_when_camera_is_inside() {
        let outside = light_volume_pipeline_config(false, false);
        let inside = light_volume_pipeline_config(true, false);
        assert_eq!(outside.cull_face, Some(CullFace::Back));
        assert_eq!(inside.cull_face, Some(CullFace::Front));
        assert_eq!(outside.depth_test, Some(CompareFunc::LessOrEqual));
        assert_eq!(inside.depth_test, None);
    }

    #[test]
    fn position_and_direction_read_from_identity_transform() {
        let light = base_light(LightKind::Spot);
        assert_eq!(light.position(), Vector3::new(0.0, 0.0, 0.0));
        assert_eq!(light.direction(), Vector3::new(0.0, 0.0, -1.0));
    }
}
