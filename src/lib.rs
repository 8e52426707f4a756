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

//! `defren` is the render-task pipeline of a deferred-shading 3D scene renderer: it turns a
//! per-frame render plan into GPU draw submissions covering the geometry pass, depth pyramids,
//! occlusion tests, per-light shadow map caching, lighting, reflections, GI probe updates and
//! transparent composition.
//!
//! The crate has no compile-time dependency on a concrete scene graph, asset pipeline or shader
//! source compiler; those are modeled as the collaborator traits in [`interfaces`].

#![warn(missing_docs)]

pub use fyrox_core as core;
pub use fyrox_graphics as gapi;

pub mod buffer_pool;
pub mod collide_list;
pub mod error;
pub mod gi;
pub mod gpu;
pub mod interfaces;
pub mod light;
pub mod occlusion;
pub mod orchestrator;
pub mod param_block;
pub mod pipeline;
pub mod plan;
pub mod reflection;
pub mod render_task;
pub mod settings;
pub mod shadow;
pub mod shape;
pub mod sky;
pub mod stats;
pub mod texture_config;

pub use error::RenderError;
pub use orchestrator::PlanOrchestrator;
pub use plan::RenderPlan;
pub use settings::RendererSettings;
