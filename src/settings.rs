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

//! Quality settings the [`crate::orchestrator::PlanOrchestrator`] consults once per frame to
//! decide shadow map size tiers, occlusion pyramid depth, reflection step counts and which of the
//! startup-probed capability fallbacks are in effect. Mirrors the shape of
//! `fyrox-impl::renderer::settings::QualitySettings`.

use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, EnumString, VariantNames};

/// Bit-depth a shadow map is rendered with. Half trades shadow acne risk for half the memory and
/// bandwidth; Full is the safe default for anything built on inverse-depth.
#[derive(
    Copy, Clone, Hash, PartialOrd, PartialEq, Eq, Ord, Debug, Serialize, Deserialize, AsRefStr, EnumString, VariantNames,
)]
pub enum ShadowMapPrecision {
    /// 16-bit depth.
    Half,
    /// 32-bit depth.
    Full,
}

/// Cascaded sky-light shadow settings (§4's Sky/Cascaded Renderer).
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct CsmSettings {
    /// Whether cascaded shadow maps are built at all.
    pub enabled: bool,
    /// Texture size of each cascade.
    pub size: usize,
    /// Number of cascades; the original spec does not bound this, but three or four is typical.
    pub cascade_count: usize,
    pub precision: ShadowMapPrecision,
    /// Percentage-closer filtering on or off.
    pub pcf: bool,
}

impl Default for CsmSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            size: 2048,
            cascade_count: 3,
            precision: ShadowMapPrecision::Full,
            pcf: true,
        }
    }
}

/// Screen-space reflection tuning (§4.9).
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct SsrSettings {
    pub enabled: bool,
    /// Number of ray-march steps per pixel.
    pub step_count: u32,
    /// Maximum number of environment maps blended per pixel; see §4.9's `K ∈ {1,2,3,4}`.
    pub max_blended_env_maps: u32,
}

impl Default for SsrSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            step_count: 32,
            max_blended_env_maps: 4,
        }
    }
}

/// GPU capability flags resolved once at startup (§7, "capability error"); the renderer selects a
/// fallback path based on these instead of signaling a capability error per frame.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct GraphicsCapabilities {
    /// `DrawElementsBaseVertex`/equivalent is available.
    pub base_vertex_draws: bool,
    /// Geometry-shader or vertex-shader layered rendering to a cube/array texture in one draw.
    pub layered_rendering: bool,
    /// Compute-shader based pyramid reduction, vs. a full-screen-quad fragment shader fallback.
    pub compute_pyramid_reduction: bool,
    /// `MultiDraw*Indirect` is available for the stereo single-pass path.
    pub multi_draw_indirect: bool,
}

/// Shadow map size tiers and the maximum number of statically-cached casters kept alive at once.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShadowQuality {
    pub point_shadow_map_size: usize,
    pub point_shadows_enabled: bool,
    pub point_shadow_map_precision: ShadowMapPrecision,
    pub spot_shadow_map_size: usize,
    pub spot_shadows_enabled: bool,
    pub spot_shadow_map_precision: ShadowMapPrecision,
    /// Maximum count of Static-slot shadow casters kept resident; beyond this the aging policy in
    /// §4.5 evicts the least-recently-touched slot first.
    pub max_active_static_casters: usize,
}

impl Default for ShadowQuality {
    fn default() -> Self {
        Self {
            point_shadow_map_size: 1024,
            point_shadows_enabled: true,
            point_shadow_map_precision: ShadowMapPrecision::Full,
            spot_shadow_map_size: 1024,
            spot_shadows_enabled: true,
            spot_shadow_map_precision: ShadowMapPrecision::Full,
            max_active_static_casters: 16,
        }
    }
}

/// Top-level quality/configuration surface read once per frame by the
/// [`crate::orchestrator::PlanOrchestrator`]; see SPEC_FULL.md §2a/§4.12.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct RendererSettings {
    pub shadows: ShadowQuality,
    pub csm: CsmSettings,
    pub ssr: SsrSettings,
    /// Number of occlusion-pyramid mip levels to build (§3 "Occlusion map").
    pub occlusion_pyramid_levels: usize,
    /// Anisotropic filtering level applied to shadow/environment samplers.
    pub anisotropy: f32,
    /// Whether reflections (SSR + environment maps) run at all this frame; independent of the
    /// per-plan [`crate::plan::LightingOptions::no_reflections`] override.
    pub reflections_enabled: bool,
    /// Whether GI probes are updated at all; independent of per-plan GI state.
    pub gi_enabled: bool,
    /// Capabilities resolved at startup; `None` until the first capability probe has run.
    pub capabilities: GraphicsCapabilities,
}

impl Default for RendererSettings {
    fn default() -> Self {
        Self::high()
    }
}

impl RendererSettings {
    /// Highest quality preset matching the defaults assumed by SPEC_FULL.md §8's scenarios.
    pub fn high() -> Self {
        Self {
            shadows: ShadowQuality::default(),
            csm: CsmSettings::default(),
            ssr: SsrSettings::default(),
            occlusion_pyramid_levels: 8,
            anisotropy: 8.0,
            reflections_enabled: true,
            gi_enabled: true,
            capabilities: GraphicsCapabilities::default(),
        }
    }

    /// A reduced preset with half-size shadow maps, no soft PCF, and SSR disabled; used by tests
    /// and as a starting point for low-end hardware.
    pub fn low() -> Self {
        Self {
            shadows: ShadowQuality {
                point_shadow_map_size: 512,
                point_shadow_map_precision: ShadowMapPrecision::Half,
                spot_shadow_map_size: 512,
                spot_shadow_map_precision: ShadowMapPrecision::Half,
                max_active_static_casters: 8,
                ..ShadowQuality::default()
            },
            csm: CsmSettings {
                size: 512,
                cascade_count: 2,
                precision: ShadowMapPrecision::Half,
                pcf: false,
                ..CsmSettings::default()
            },
            ssr: SsrSettings {
                enabled: false,
                step_count: 8,
                max_blended_env_maps: 1,
            },
            occlusion_pyramid_levels: 4,
            anisotropy: 1.0,
            reflections_enabled: false,
            gi_enabled: false,
            capabilities: GraphicsCapabilities::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_settings_match_high_preset() {
        assert_eq!(RendererSettings::default(), RendererSettings::high());
    }

    #[test]
    fn low_preset_disables_ssr() {
        assert!(!RendererSettings::low().ssr.enabled);
    }
}
