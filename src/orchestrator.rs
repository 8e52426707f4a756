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

//! Top-level per-frame sequencing (§2a): the fixed Depth → Occlusion → Shadow → Light →
//! Reflection → Transparent → GI pass order, the settings/plan-driven decision of which of the
//! optional passes actually run this frame, and the long-lived caches/pools every pass shares.
//! Mirrors the shape of `fyrox-impl::renderer::Renderer::render_scene_observer`, split into a pure
//! scheduling function plus a stateful owner of the per-frame resources.

use crate::collide_list::CollideList;
use crate::core::algebra::Vector3;
use crate::core::log::{Log, MessageKind};
use crate::error::RenderError;
use crate::gapi::{CubeMapFace, ElementKind, GpuGeometryBuffer, GpuSamplerDescriptor};
use crate::gi::{select_relight_batch, GiProbeSlot, GiRayCache};
use crate::gpu::{BufferDataUsage, GpuBuffer, GpuFrameBuffer, GraphicsServer, Rect};
use crate::interfaces::{Drawable, GeometryId, TextureTargetMap};
use crate::light::LightKind;
use crate::occlusion::OcclusionPyramid;
use crate::param_block::{ParamBlockAllocator, ParamBlockHandle, ParamBlockKind};
use crate::pipeline::{Pipeline, PipelineCache};
use crate::plan::RenderPlan;
use crate::reflection::{blend_weights, k_nearest, EnvMapSlot, MAX_BLENDED_ENV_MAPS};
use crate::render_task::{executor, InstanceRow, RenderTask};
use crate::settings::RendererSettings;
use crate::shadow::{self, CubeFaceDescriptor, ShadowCaster, ShadowMapShape, ShadowTier};
use crate::sky::SKY_CASCADE_COUNT;
use crate::stats::BindStatistics;
use crate::stats::DebugInfo;
use crate::texture_config::{BufferBinding, SamplerCache, TextureBinding, TextureUnitConfig, TextureUnitConfigCache};
use fyrox_graphics::uniform::DynamicUniformBuffer;
use std::rc::Rc;

/// Maps a light kind to the fixed geometry identity its volume proxy is stored under in the
/// render-task tree (§4.7); the same four ids every frame, since the tree's VAO level is keyed by
/// [`GeometryId`] and light volumes are not scene-graph drawables with their own natural id.
fn light_volume_geometry_id(kind: LightKind) -> GeometryId {
    match kind {
        LightKind::Point => 1,
        LightKind::Spot => 2,
        LightKind::Projector => 3,
        LightKind::Sky => 4,
    }
}

const REFLECTION_SCREEN_GEOMETRY_ID: GeometryId = 100;
const GI_PROBE_GEOMETRY_ID: GeometryId = 101;

const ENV_MAP_SEMANTICS: [&str; MAX_BLENDED_ENV_MAPS] =
    ["EnvMap0", "EnvMap1", "EnvMap2", "EnvMap3"];

/// Builds the `buffer_of` closure [`executor::execute`] needs to resolve a [`ParamBlockHandle`]
/// into a bindable buffer, borrowing the allocator rather than owning it so passes can still
/// mutate `self.task`/`self.samplers` alongside it.
fn buffer_resolver(params: &ParamBlockAllocator) -> impl Fn(ParamBlockHandle) -> (GpuBuffer, BufferDataUsage) + '_ {
    move |handle: ParamBlockHandle| {
        let buffer = params.buffer_for(handle.kind).clone();
        let data_usage = BufferDataUsage::UseSegment {
            offset: handle.range.offset,
            size: handle.range.len,
        };
        (buffer, data_usage)
    }
}

/// One stage of the per-frame pipeline, in submission order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Pass {
    /// Fills the G-buffer (depth, normal, material).
    Depth,
    /// Builds the occlusion pyramid from the depth buffer just filled.
    Occlusion,
    /// Rebuilds any shadow maps due for an update this frame.
    Shadow,
    /// Accumulates lighting into the HDR target, light volume by light volume.
    Light,
    /// Screen-space reflections and environment map blending.
    Reflection,
    /// Forward-rendered transparent geometry, composited on top of the lit opaque result.
    Transparent,
    /// Relights the due subset of the global illumination probe grid.
    Gi,
}

/// Decides which passes run this frame and in what order, purely from `plan` and `settings`, with
/// no GPU access. The order is always `Depth, Occlusion, Shadow, Light, [Reflection], Transparent,
/// [Gi]`; `Reflection` and `Gi` are each independently gated by a settings toggle and a per-plan
/// override (§8: "which passes run... without requiring a live GPU context").
pub fn plan_passes(plan: &RenderPlan, settings: &RendererSettings) -> Vec<Pass> {
    let mut passes = vec![Pass::Depth, Pass::Occlusion, Pass::Shadow, Pass::Light];

    if settings.reflections_enabled && !plan.lighting.no_reflections {
        passes.push(Pass::Reflection);
    }

    passes.push(Pass::Transparent);

    if settings.gi_enabled && !plan.lighting.no_reflections {
        passes.push(Pass::Gi);
    }

    passes
}

/// Owns every cache and pool shared across the passes of a single frame: pipeline state objects
/// (stable across frames), texture-unit-config and sampler bindings (rebuilt every frame since
/// they reference frame-scoped parameter block handles), the uniform/storage buffer allocator,
/// the occlusion pyramid, the render task tree passes are recorded into, and the accumulated
/// debug-information counters.
pub struct PlanOrchestrator {
    pipelines: PipelineCache,
    tucs: TextureUnitConfigCache,
    samplers: SamplerCache,
    params: ParamBlockAllocator,
    occlusion: OcclusionPyramid,
    task: RenderTask,
    debug: DebugInfo,
    frame_index: u64,
}

impl PlanOrchestrator {
    /// Creates an orchestrator with an empty pipeline cache, an occlusion pyramid sized from
    /// `settings.occlusion_pyramid_levels`, and a freshly allocated parameter block pool.
    pub fn new(server: &dyn GraphicsServer, settings: &RendererSettings) -> Result<Self, RenderError> {
        Ok(Self {
            pipelines: PipelineCache::new(),
            tucs: TextureUnitConfigCache::new(),
            samplers: SamplerCache::new(),
            params: ParamBlockAllocator::new(server)?,
            occlusion: OcclusionPyramid::new(settings.occlusion_pyramid_levels),
            task: RenderTask::new(),
            debug: DebugInfo::default(),
            frame_index: 0,
        })
    }

    /// The pipeline state object cache; persists across frames.
    pub fn pipelines(&mut self) -> &mut PipelineCache {
        &mut self.pipelines
    }

    /// The texture-unit-config cache; cleared every frame, see [`PlanOrchestrator::begin_frame`].
    pub fn texture_unit_configs(&mut self) -> &mut TextureUnitConfigCache {
        &mut self.tucs
    }

    /// The sampler-descriptor cache.
    pub fn samplers(&mut self) -> &mut SamplerCache {
        &mut self.samplers
    }

    /// The uniform/storage parameter block allocator.
    pub fn params(&mut self) -> &mut ParamBlockAllocator {
        &mut self.params
    }

    /// The occlusion pyramid built during the Occlusion pass and consumed by Shadow, Reflection
    /// and Gi.
    pub fn occlusion(&mut self) -> &mut OcclusionPyramid {
        &mut self.occlusion
    }

    /// The render task tree passes record draws into, then flush via
    /// [`crate::render_task::executor::execute`].
    pub fn task(&mut self) -> &mut RenderTask {
        &mut self.task
    }

    /// How many frames [`PlanOrchestrator::end_frame`] has completed.
    pub fn frame_index(&self) -> u64 {
        self.frame_index
    }

    /// Resets all per-frame state: clears the render task tree and the texture-unit-config and
    /// sampler caches (their entries reference this frame's parameter block handles, which
    /// [`ParamBlockAllocator::reset`] is about to invalidate), resets the parameter block
    /// allocator, and zeroes the debug-information counters. Must be called before recording any
    /// pass for a new frame.
    pub fn begin_frame(&mut self) {
        self.task.clear();
        self.tucs.clear();
        self.params.reset();
        self.debug.reset();
    }

    /// Flushes any pending parameter block writes, advances the frame counter, and returns a
    /// snapshot of this frame's accumulated debug information.
    pub fn end_frame(&mut self) -> Result<DebugInfo, RenderError> {
        self.params.flush()?;
        self.frame_index += 1;
        Ok(self.debug)
    }

    /// Accrues bind/draw counters produced by a pass into this frame's debug information.
    pub fn record(&mut self, binds: crate::stats::BindStatistics) {
        self.debug += binds;
    }

    /// Accrues lighting counters (lights rendered, shadow maps rebuilt, probes relit) produced by
    /// a pass into this frame's debug information.
    pub fn record_lighting(&mut self, lighting: crate::stats::LightingStatistics) {
        self.debug += lighting;
    }

    /// Applies the error propagation policy of §7 to one pass's result: a transient GPU error
    /// reports that the whole frame must be dropped and retried; any other error is logged and
    /// treated as "this pass failed, keep going best-effort".
    pub fn handle_pass_result(&self, pass: Pass, result: Result<(), RenderError>) -> bool {
        should_continue_frame(self.frame_index, pass, result)
    }

    /// Renders one shadow caster's due tiers into GPU-backed maps (§2a's Shadow pass, §4.6): Solid
    /// and Ambient always run, Transparent only when the caster actually has a transparent caster
    /// this frame. A [`ShadowMapShape::Cube`] caster renders all six
    /// [`CubeFaceDescriptor::cube_faces`] per tier; a [`ShadowMapShape::Flat`] caster renders once.
    /// `framebuffer_of` resolves a `(tier, cube face)` pair to the framebuffer wrapping that slot's
    /// texture, and `viewport_of` the tier's map size as a draw viewport; both are the caller's
    /// responsibility since slot allocation and framebuffer creation are orchestration-level
    /// GPU-resource concerns this module does not own.
    #[allow(clippy::too_many_arguments)]
    pub fn render_shadow_pass<D: Drawable>(
        &mut self,
        server: &dyn GraphicsServer,
        caster: &ShadowCaster,
        pipeline: &Rc<Pipeline>,
        tuc: &Rc<TextureUnitConfig>,
        layer_mask: u32,
        collide_list: &CollideList<D>,
        targets: &TextureTargetMap,
        mut row_of: impl FnMut(&D) -> InstanceRow,
        geometry_of: impl Fn(&D) -> GpuGeometryBuffer,
        mut framebuffer_of: impl FnMut(ShadowTier, Option<CubeMapFace>) -> Result<GpuFrameBuffer, RenderError>,
        mut viewport_of: impl FnMut(ShadowTier) -> Rect<i32>,
    ) -> Result<BindStatistics, RenderError> {
        let mut tiers = vec![ShadowTier::Solid, ShadowTier::Ambient];
        if caster.has_transparent_casters {
            tiers.push(ShadowTier::Transparent);
        }

        let mut total = BindStatistics::default();
        for tier in tiers {
            let viewport = viewport_of(tier);
            let faces: Vec<Option<(u8, CubeMapFace)>> = match caster.shape() {
                ShadowMapShape::Flat => vec![None],
                ShadowMapShape::Cube => CubeFaceDescriptor::cube_faces()
                    .into_iter()
                    .enumerate()
                    .map(|(bit, descriptor)| Some((bit as u8, descriptor.face)))
                    .collect(),
            };
            for cube_face in faces {
                let framebuffer = framebuffer_of(tier, cube_face.map(|(_, face)| face))?;
                let buffer_of = buffer_resolver(&self.params);
                let stats = shadow::render_shadow_face(
                    server,
                    &framebuffer,
                    viewport,
                    cube_face,
                    tier,
                    pipeline,
                    tuc,
                    layer_mask,
                    &mut self.task,
                    collide_list,
                    targets,
                    &mut self.samplers,
                    &mut row_of,
                    &geometry_of,
                    &buffer_of,
                )?;
                self.record(stats);
                total += stats;
            }
        }
        Ok(total)
    }

    /// Renders one light's volume into the HDR accumulation target (§2a's Light pass, §4.7): pushes
    /// a single instance of the volume proxy matching `light_kind` under `pipeline`/`tuc` (already
    /// resolved by the caller from [`crate::light::light_volume_pipeline_config`] and
    /// [`crate::light::light_texture_unit_config`]) and executes the task immediately, since two
    /// lights can legitimately need different pipelines (camera-inside-volume flips cull face and
    /// depth test) and [`executor::execute`] applies one [`crate::gapi::DrawParameters`] to the
    /// whole task it is given. The caller clears the accumulation target once before the first
    /// light of the frame; this method never clears it itself.
    #[allow(clippy::too_many_arguments)]
    pub fn render_light_pass(
        &mut self,
        server: &dyn GraphicsServer,
        framebuffer: &GpuFrameBuffer,
        viewport: Rect<i32>,
        light_kind: LightKind,
        sphere: &GpuGeometryBuffer,
        cone: &GpuGeometryBuffer,
        pipeline: &Rc<Pipeline>,
        tuc: &Rc<TextureUnitConfig>,
        row: InstanceRow,
        targets: &TextureTargetMap,
    ) -> Result<BindStatistics, RenderError> {
        let geometry = match light_kind {
            LightKind::Point | LightKind::Sky => sphere.clone(),
            LightKind::Spot | LightKind::Projector => cone.clone(),
        };
        self.task.clear();
        self.task
            .pipeline_mut(pipeline)
            .tuc_mut(tuc)
            .vao_mut(light_volume_geometry_id(light_kind), || geometry)
            .push(0, ElementKind::Triangle, 0, None, None, row);

        let draw_params = pipeline.config.to_draw_parameters();
        let buffer_of = buffer_resolver(&self.params);
        let stats = executor::execute(
            server,
            framebuffer,
            viewport,
            &self.task,
            &draw_params,
            targets,
            &mut self.samplers,
            &buffer_of,
        )?;
        self.record(stats);
        Ok(stats)
    }

    /// Renders one cascade of a sky light's cascaded shadow map (§2a's Shadow pass, §4.6/§4.7's sky
    /// cascade variant): a sky cascade is a flat [`ShadowTier::Solid`] depth map like any other
    /// light's, so this reuses [`shadow::render_shadow_face`] directly rather than duplicating the
    /// depth-only submission procedure. `cascade_target` resolves a cascade index to the
    /// framebuffer wrapping [`crate::sky::SkyCascade`]'s texture and the viewport to render it at.
    #[allow(clippy::too_many_arguments)]
    pub fn render_sky_pass<D: Drawable>(
        &mut self,
        server: &dyn GraphicsServer,
        pipeline: &Rc<Pipeline>,
        tuc: &Rc<TextureUnitConfig>,
        layer_mask: u32,
        collide_list: &CollideList<D>,
        targets: &TextureTargetMap,
        mut row_of: impl FnMut(&D) -> InstanceRow,
        geometry_of: impl Fn(&D) -> GpuGeometryBuffer,
        mut cascade_target: impl FnMut(usize) -> Result<(GpuFrameBuffer, Rect<i32>), RenderError>,
    ) -> Result<BindStatistics, RenderError> {
        let mut total = BindStatistics::default();
        for cascade in 0..SKY_CASCADE_COUNT {
            let (framebuffer, viewport) = cascade_target(cascade)?;
            let buffer_of = buffer_resolver(&self.params);
            let stats = shadow::render_shadow_face(
                server,
                &framebuffer,
                viewport,
                None,
                ShadowTier::Solid,
                pipeline,
                tuc,
                layer_mask,
                &mut self.task,
                collide_list,
                targets,
                &mut self.samplers,
                &mut row_of,
                &geometry_of,
                &buffer_of,
            )?;
            self.record(stats);
            total += stats;
        }
        Ok(total)
    }

    /// Blends the nearest environment map captures for one reflected query point and draws the
    /// full-screen reflection resolve (§2a's Reflection pass, §4's Reflection/GI Pipeline): picks
    /// up to [`MAX_BLENDED_ENV_MAPS`] candidates with [`k_nearest`], weights them with
    /// [`blend_weights`], packs the weights into a fresh parameter block and binds the selected
    /// cubemaps under `EnvMap0`..`EnvMap{N-1}`. Screen-space ray-march misses are expected to have
    /// already been resolved against this blend by the caller (this crate's [`crate::reflection::
    /// ssr_trace`] runs against the occlusion pyramid ahead of this call, not inside it, since it
    /// needs the pyramid borrowed independently of the parameter block allocator). Returns
    /// `Ok(default)` without drawing if no env map is currently resident.
    #[allow(clippy::too_many_arguments)]
    pub fn render_reflection_pass(
        &mut self,
        server: &dyn GraphicsServer,
        framebuffer: &GpuFrameBuffer,
        viewport: Rect<i32>,
        screen_triangle: &GpuGeometryBuffer,
        query_position: Vector3<f32>,
        env_maps: &[EnvMapSlot],
        border_size: f32,
        pipeline: &Rc<Pipeline>,
        sampler: GpuSamplerDescriptor,
        targets: &TextureTargetMap,
    ) -> Result<BindStatistics, RenderError> {
        let positions: Vec<Vector3<f32>> = env_maps.iter().map(|slot| slot.position).collect();
        let nearest = k_nearest(&positions, query_position, MAX_BLENDED_ENV_MAPS);
        if nearest.is_empty() {
            return Ok(BindStatistics::default());
        }
        let nearest_positions: Vec<Vector3<f32>> = nearest.iter().map(|&i| positions[i]).collect();
        let weights = blend_weights(&nearest_positions, query_position, border_size);

        let mut uniform = DynamicUniformBuffer::new();
        for i in 0..MAX_BLENDED_ENV_MAPS {
            let weight = weights.get(i).copied().unwrap_or(0.0);
            uniform = uniform.with(&weight);
        }
        let handle = self.params.allocate(server, ParamBlockKind::Uniform, &uniform)?;

        let mut textures = Vec::with_capacity(nearest.len());
        for (&slot_index, &semantic) in nearest.iter().zip(ENV_MAP_SEMANTICS.iter()) {
            if let Some(texture) = env_maps[slot_index].texture() {
                textures.push(TextureBinding {
                    semantic,
                    texture: texture.clone(),
                    sampler,
                });
            }
        }
        let config = TextureUnitConfig::new(
            textures,
            vec![BufferBinding {
                semantic: "ReflectionBlendWeights",
                block: handle,
            }],
        );
        let tuc = self.tucs.get_or_insert(config);

        self.task.clear();
        self.task
            .pipeline_mut(pipeline)
            .tuc_mut(&tuc)
            .vao_mut(REFLECTION_SCREEN_GEOMETRY_ID, || screen_triangle.clone())
            .push(0, ElementKind::Triangle, 0, None, None, handle);

        let draw_params = pipeline.config.to_draw_parameters();
        let buffer_of = buffer_resolver(&self.params);
        let stats = executor::execute(
            server,
            framebuffer,
            viewport,
            &self.task,
            &draw_params,
            targets,
            &mut self.samplers,
            &buffer_of,
        )?;
        self.record(stats);
        Ok(stats)
    }

    /// Relights this frame's due batch of GI probes (§2a's Gi pass, §4's supplemented GI behavior):
    /// picks the batch with [`select_relight_batch`], then for each probe restricts the viewport to
    /// that probe's tile in [`GiRayCache`]'s shared array texture (so one probe's rays never
    /// overwrite another's) and issues one draw per tile. `row_of` supplies each probe's per-probe
    /// parameter block row (the ray directions/origin for that probe's trace). Returns the
    /// accumulated bind statistics and the batch actually relit, so the caller can mark those
    /// probes [`GiProbeSlot::mark_relit`].
    #[allow(clippy::too_many_arguments)]
    pub fn render_gi_pass(
        &mut self,
        server: &dyn GraphicsServer,
        framebuffer: &GpuFrameBuffer,
        ray_cache: &GiRayCache,
        probes: &[GiProbeSlot],
        batch_size: usize,
        screen_triangle: &GpuGeometryBuffer,
        pipeline: &Rc<Pipeline>,
        tuc: &Rc<TextureUnitConfig>,
        targets: &TextureTargetMap,
        mut row_of: impl FnMut(usize) -> InstanceRow,
    ) -> Result<(BindStatistics, Vec<usize>), RenderError> {
        let batch = select_relight_batch(probes, batch_size);
        let draw_params = pipeline.config.to_draw_parameters();
        let mut total = BindStatistics::default();

        for &probe_index in &batch {
            let (column, tile_row) = ray_cache.probe_tile(probe_index);
            let tile_width = ray_cache.rays_per_probe().max(1) as i32;
            let viewport = Rect::new(column as i32 * tile_width, tile_row as i32, tile_width, 1);

            self.task.clear();
            self.task
                .pipeline_mut(pipeline)
                .tuc_mut(tuc)
                .vao_mut(GI_PROBE_GEOMETRY_ID, || screen_triangle.clone())
                .push(0, ElementKind::Triangle, 0, None, None, row_of(probe_index));

            let buffer_of = buffer_resolver(&self.params);
            let stats = executor::execute(
                server,
                framebuffer,
                viewport,
                &self.task,
                &draw_params,
                targets,
                &mut self.samplers,
                &buffer_of,
            )?;
            self.record(stats);
            total += stats;
        }
        Ok((total, batch))
    }
}

/// Pure form of the error propagation policy: `false` means the caller must abandon the rest of
/// this frame and retry, `true` means the frame continues despite the failed pass. Split out from
/// [`PlanOrchestrator::handle_pass_result`] so the policy itself is unit-testable without a live
/// GPU context.
fn should_continue_frame(frame_index: u64, pass: Pass, result: Result<(), RenderError>) -> bool {
    match result {
        Ok(()) => true,
        Err(err) if err.is_frame_fatal() => {
            Log::writeln(
                MessageKind::Error,
                format!("Dropping frame {frame_index}: {pass:?} pass hit a transient GPU error: {err}"),
            );
            false
        }
        Err(err) => {
            Log::writeln(
                MessageKind::Warning,
                format!("{pass:?} pass failed and was skipped this frame: {err}"),
            );
            true
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collide_list::CollideList;
    use crate::core::{
        algebra::Matrix4,
        math::{frustum::Frustum, Rect},
    };
    use crate::plan::{LightingOptions, ProjectionSet, StereoMode};

    fn plan_with(lighting: LightingOptions) -> RenderPlan {
        let projection = Matrix4::new_perspective(1.0, std::f32::consts::FRAC_PI_2, 0.1, 100.0);
        RenderPlan {
            view: Matrix4::identity(),
            view_right: Matrix4::identity(),
            projection: ProjectionSet {
                regular: projection,
                infinite_inverse_depth: None,
            },
            viewport: Rect::new(0, 0, 1920, 1080),
            stereo: StereoMode::Mono,
            frustum: Frustum::from(projection).expect("valid perspective frustum"),
            layer_mask: u32::MAX,
            flip_culling: false,
            collide_list: CollideList::new(),
            lighting,
        }
    }

    #[test]
    fn default_pass_order_is_depth_occlusion_shadow_light_reflection_transparent_gi() {
        let plan = plan_with(LightingOptions::default());
        let passes = plan_passes(&plan, &RendererSettings::high());
        assert_eq!(
            passes,
            vec![
                Pass::Depth,
                Pass::Occlusion,
                Pass::Shadow,
                Pass::Light,
                Pass::Reflection,
                Pass::Transparent,
                Pass::Gi,
            ]
        );
    }

    #[test]
    fn no_reflections_override_suppresses_reflection_and_gi_passes() {
        let plan = plan_with(LightingOptions {
            no_reflections: true,
            ..Default::default()
        });
        let passes = plan_passes(&plan, &RendererSettings::high());
        assert!(!passes.contains(&Pass::Reflection));
        assert!(!passes.contains(&Pass::Gi));
        assert!(passes.contains(&Pass::Transparent));
    }

    #[test]
    fn low_quality_preset_suppresses_reflection_and_gi_without_a_plan_override() {
        let plan = plan_with(LightingOptions::default());
        let passes = plan_passes(&plan, &RendererSettings::low());
        assert!(!passes.contains(&Pass::Reflection));
        assert!(!passes.contains(&Pass::Gi));
    }

    #[test]
    fn core_passes_always_run_in_a_fixed_relative_order() {
        let plan = plan_with(LightingOptions::default());
        let passes = plan_passes(&plan, &RendererSettings::low());
        let depth = passes.iter().position(|p| *p == Pass::Depth).unwrap();
        let occlusion = passes.iter().position(|p| *p == Pass::Occlusion).unwrap();
        let shadow = passes.iter().position(|p| *p == Pass::Shadow).unwrap();
        let light = passes.iter().position(|p| *p == Pass::Light).unwrap();
        let transparent = passes.iter().position(|p| *p == Pass::Transparent).unwrap();
        assert!(depth < occlusion);
        assert!(occlusion < shadow);
        assert!(shadow < light);
        assert!(light < transparent);
    }

    #[test]
    fn transient_gpu_error_signals_the_whole_frame_must_be_dropped() {
        let result = Err(RenderError::TransientGpu("out of memory".into()));
        assert!(!should_continue_frame(0, Pass::Light, result));
    }

    #[test]
    fn non_transient_errors_are_best_effort_and_keep_the_frame_going() {
        let result = Err(RenderError::Parameter("bad shadow size".into()));
        assert!(should_continue_frame(0, Pass::Shadow, result));
    }

    #[test]
    fn success_keeps_the_frame_going() {
        assert!(should_continue_frame(0, Pass::Depth, Ok(())));
    }
}
