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

//! Error kinds produced by the render-task pipeline. Grouped the way the design documents the
//! four error kinds: parameter errors, capability errors, transient GPU errors and logic errors.
//! Logic errors are not a variant here; they are programmer errors and use `assert!`/
//! `debug_assert!` at the call site instead, same as `fyrox-graphics` does for its own internal
//! invariants.

use crate::gapi::error::FrameworkError;
use std::fmt::{Display, Formatter};

/// Errors that can occur while building or executing render tasks.
#[derive(Debug)]
pub enum RenderError {
    /// Invalid size, enum value out of range, or a required handle was null. Always fatal at the
    /// call site; the orchestrator skips the affected pass.
    Parameter(String),
    /// The GPU does not support a feature the renderer wanted to use (base-vertex draws, layered
    /// rendering, compute shaders). Detected once at startup; the renderer falls back instead of
    /// signaling this per frame, but the variant exists so capability probing can report it.
    Capability(String),
    /// A transient GPU allocation failure (`GL_OUT_OF_MEMORY` and friends). The orchestrator
    /// drops the current frame, empties temporary pools and retries next frame.
    TransientGpu(String),
    /// Wraps an error bubbled up from the graphics abstraction layer.
    Graphics(FrameworkError),
}

impl Display for RenderError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            RenderError::Parameter(msg) => write!(f, "parameter error: {msg}"),
            RenderError::Capability(msg) => write!(f, "capability error: {msg}"),
            RenderError::TransientGpu(msg) => write!(f, "transient GPU error: {msg}"),
            RenderError::Graphics(err) => write!(f, "graphics error: {err:?}"),
        }
    }
}

impl std::error::Error for RenderError {}

impl From<FrameworkError> for RenderError {
    fn from(value: FrameworkError) -> Self {
        RenderError::Graphics(value)
    }
}

/// Whether a frame should be retried after this error, per the propagation policy: transient GPU
/// errors drop the frame and retry, everything else marks the affected pass as failed and keeps
/// going best-effort.
impl RenderError {
    /// Returns `true` for the one error kind that requires the whole frame to be abandoned.
    pub fn is_frame_fatal(&self) -> bool {
        matches!(self, RenderError::TransientGpu(_))
    }
}
