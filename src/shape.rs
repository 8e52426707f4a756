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

//! Shared primitive meshes (sphere, box, cylinder, capsule, cone) used as light volume proxies,
//! occlusion test stand-ins and other places that need "a shape", not "a scene asset". Generated
//! once at startup and shared by every consumer, the same way the light volume renderer keeps one
//! cone and one sphere geometry buffer for every light it draws.

use crate::core::algebra::{Vector2, Vector3};
use crate::core::math::TriangleDefinition;
use crate::error::RenderError;
use crate::gapi::{
    buffer::BufferUsage,
    geometry_buffer::{
        AttributeDefinition, AttributeKind, ElementsDescriptor, GeometryBufferDescriptor,
        VertexBufferData, VertexBufferDescriptor,
    },
    GpuGeometryBuffer,
};
use crate::gpu::GraphicsServer;
use bytemuck::{Pod, Zeroable};

/// A position-only vertex, tightly packed, matching the layout shape geometry buffers are built
/// with; light volumes and occlusion stand-ins never need normals or UVs.
#[derive(Pod, Copy, Clone, Zeroable)]
#[repr(C)]
pub struct ShapeVertex {
    /// Local-space position.
    pub position: Vector3<f32>,
}

const POSITION_ATTRIBUTE: [AttributeDefinition; 1] = [AttributeDefinition {
    location: 0,
    kind: AttributeKind::Float,
    component_count: 3,
    normalized: false,
    divisor: 0,
}];

fn upload(
    server: &dyn GraphicsServer,
    vertices: &[ShapeVertex],
    triangles: &[TriangleDefinition],
) -> Result<GpuGeometryBuffer, RenderError> {
    let buffer = server.create_geometry_buffer(GeometryBufferDescriptor {
        buffers: &[VertexBufferDescriptor {
            usage: BufferUsage::StaticDraw,
            attributes: &POSITION_ATTRIBUTE,
            data: VertexBufferData::new(Some(vertices)),
        }],
        usage: BufferUsage::StaticDraw,
        elements: ElementsDescriptor::Triangles(triangles),
    })?;
    Ok(buffer)
}

/// Pure vertex/index generation for [`make_sphere`], kept free of any `GraphicsServer` call so it
/// can be unit-tested without a live GPU context.
fn sphere_geometry(slices: usize, stacks: usize, radius: f32) -> (Vec<ShapeVertex>, Vec<TriangleDefinition>) {
    let mut vertices = Vec::with_capacity((stacks + 1) * (slices + 1));
    let d_theta = std::f32::consts::PI / stacks as f32;
    let d_phi = 2.0 * std::f32::consts::PI / slices as f32;

    for i in 0..=stacks {
        let theta = d_theta * i as f32;
        let (sin_theta, cos_theta) = theta.sin_cos();
        for j in 0..=slices {
            let phi = d_phi * j as f32;
            let (sin_phi, cos_phi) = phi.sin_cos();
            vertices.push(ShapeVertex {
                position: Vector3::new(
                    radius * sin_theta * cos_phi,
                    radius * cos_theta,
                    radius * sin_theta * sin_phi,
                ),
            });
        }
    }

    let row = slices + 1;
    let mut triangles = Vec::with_capacity(stacks * slices * 2);
    for i in 0..stacks {
        for j in 0..slices {
            let a = (i * row + j) as u32;
            let b = (i * row + j + 1) as u32;
            let c = ((i + 1) * row + j) as u32;
            let d = ((i + 1) * row + j + 1) as u32;
            if i != 0 {
                triangles.push(TriangleDefinition([a, b, c]));
            }
            if i != stacks - 1 {
                triangles.push(TriangleDefinition([b, d, c]));
            }
        }
    }

    (vertices, triangles)
}

/// Builds a unit-radius UV sphere centered at the origin, `stacks` latitude bands by `slices`
/// longitude segments.
pub fn make_sphere(
    server: &dyn GraphicsServer,
    slices: usize,
    stacks: usize,
    radius: f32,
) -> Result<GpuGeometryBuffer, RenderError> {
    let (vertices, triangles) = sphere_geometry(slices, stacks, radius);
    upload(server, &vertices, &triangles)
}

/// Builds a unit axis-aligned box, side length `2.0`, centered at the origin.
pub fn make_box(server: &dyn GraphicsServer) -> Result<GpuGeometryBuffer, RenderError> {
    const CORNERS: [Vector3<f32>; 8] = [
        Vector3::new(-1.0, -1.0, -1.0),
        Vector3::new(1.0, -1.0, -1.0),
        Vector3::new(1.0, 1.0, -1.0),
        Vector3::new(-1.0, 1.0, -1.0),
        Vector3::new(-1.0, -1.0, 1.0),
        Vector3::new(1.0, -1.0, 1.0),
        Vector3::new(1.0, 1.0, 1.0),
        Vector3::new(-1.0, 1.0, 1.0),
    ];
    let vertices: Vec<_> = CORNERS.iter().map(|p| ShapeVertex { position: *p }).collect();
    // Two triangles per face, six faces, wound so the face normal points outward.
    const FACES: [[u32; 4]; 6] = [
        [0, 1, 2, 3], // back  (-Z)
        [5, 4, 7, 6], // front (+Z)
        [4, 0, 3, 7], // left  (-X)
        [1, 5, 6, 2], // right (+X)
        [4, 5, 1, 0], // bottom(-Y)
        [3, 2, 6, 7], // top   (+Y)
    ];
    let mut triangles = Vec::with_capacity(12);
    for face in FACES {
        triangles.push(TriangleDefinition([face[0], face[1], face[2]]));
        triangles.push(TriangleDefinition([face[0], face[2], face[3]]));
    }
    upload(server, &vertices, &triangles)
}

/// Pure vertex/index generation for [`make_cone`].
fn cone_geometry(sides: usize, radius: f32, height: f32) -> (Vec<ShapeVertex>, Vec<TriangleDefinition>) {
    let mut vertices = Vec::with_capacity(sides + 2);
    vertices.push(ShapeVertex {
        position: Vector3::new(0.0, 0.0, 0.0),
    });
    let base_center_index = vertices.len() as u32;
    vertices.push(ShapeVertex {
        position: Vector3::new(0.0, -height, 0.0),
    });
    let d_phi = 2.0 * std::f32::consts::PI / sides as f32;
    let rim_start = vertices.len() as u32;
    for i in 0..sides {
        let phi = d_phi * i as f32;
        let (sin_phi, cos_phi) = phi.sin_cos();
        vertices.push(ShapeVertex {
            position: Vector3::new(radius * cos_phi, -height, radius * sin_phi),
        });
    }

    let mut triangles = Vec::with_capacity(sides * 2);
    for i in 0..sides {
        let curr = rim_start + i as u32;
        let next = rim_start + ((i + 1) % sides) as u32;
        // Side wall.
        triangles.push(TriangleDefinition([0, next, curr]));
        // Base cap.
        triangles.push(TriangleDefinition([base_center_index, curr, next]));
    }

    (vertices, triangles)
}

/// Builds a cone apex at the origin, base at `y = -height`, `sides` radial segments; used as the
/// spot-light volume proxy.
pub fn make_cone(
    server: &dyn GraphicsServer,
    sides: usize,
    radius: f32,
    height: f32,
) -> Result<GpuGeometryBuffer, RenderError> {
    let (vertices, triangles) = cone_geometry(sides, radius, height);
    upload(server, &vertices, &triangles)
}

/// Builds a capsule: a cylindrical body of the given `height` (between hemisphere centers) capped
/// by two hemispheres of `radius`, axis along `Y`. Used as the light-volume proxy for lights whose
/// influence is closer to a line segment than a point (rare, but kept for completeness of the
/// shape library per the light volume derivation in §4.10).
pub fn make_capsule(
    server: &dyn GraphicsServer,
    slices: usize,
    stacks: usize,
    radius: f32,
    height: f32,
) -> Result<GpuGeometryBuffer, RenderError> {
    let half_height = height * 0.5;
    let mut vertices = Vec::new();
    let d_phi = 2.0 * std::f32::consts::PI / slices as f32;
    let d_theta = std::f32::consts::PI / (2 * stacks) as f32;

    // Top hemisphere, stacks+1 rings from pole to equator.
    for i in 0..=stacks {
        let theta = d_theta * i as f32;
        let (sin_theta, cos_theta) = theta.sin_cos();
        for j in 0..=slices {
            let phi = d_phi * j as f32;
            let (sin_phi, cos_phi) = phi.sin_cos();
            vertices.push(ShapeVertex {
                position: Vector3::new(
                    radius * sin_theta * cos_phi,
                    half_height + radius * cos_theta,
                    radius * sin_theta * sin_phi,
                ),
            });
        }
    }
    // Bottom hemisphere, mirrored.
    for i in 0..=stacks {
        let theta = d_theta * i as f32;
        let (sin_theta, cos_theta) = theta.sin_cos();
        for j in 0..=slices {
            let phi = d_phi * j as f32;
            let (sin_phi, cos_phi) = phi.sin_cos();
            vertices.push(ShapeVertex {
                position: Vector3::new(
                    radius * sin_theta * cos_phi,
                    -half_height - radius * cos_theta,
                    radius * sin_theta * sin_phi,
                ),
            });
        }
    }

    let row = slices + 1;
    let rows_per_hemisphere = stacks + 1;
    let mut triangles = Vec::new();
    for hemisphere in 0..2 {
        let base = hemisphere * rows_per_hemisphere * row;
        for i in 0..stacks {
            for j in 0..slices {
                let a = (base + i * row + j) as u32;
                let b = (base + i * row + j + 1) as u32;
                let c = (base + (i + 1) * row + j) as u32;
                let d = (base + (i + 1) * row + j + 1) as u32;
                triangles.push(TriangleDefinition([a, b, c]));
                triangles.push(TriangleDefinition([b, d, c]));
            }
        }
    }
    // Connect the two equators into the cylindrical body.
    let top_equator = stacks * row;
    let bottom_equator = rows_per_hemisphere * row + stacks * row;
    for j in 0..slices {
        let a = (top_equator + j) as u32;
        let b = (top_equator + j + 1) as u32;
        let c = (bottom_equator + j) as u32;
        let d = (bottom_equator + j + 1) as u32;
        triangles.push(TriangleDefinition([a, b, c]));
        triangles.push(TriangleDefinition([b, d, c]));
    }

    upload(server, &vertices, &triangles)
}

/// Pure vertex/index generation for [`make_full_screen_triangle`].
fn full_screen_triangle_geometry() -> (Vec<ShapeVertex>, Vec<TriangleDefinition>) {
    let vertices = vec![
        ShapeVertex {
            position: Vector3::new(-1.0, -1.0, 0.0),
        },
        ShapeVertex {
            position: Vector3::new(3.0, -1.0, 0.0),
        },
        ShapeVertex {
            position: Vector3::new(-1.0, 3.0, 0.0),
        },
    ];
    (vertices, vec![TriangleDefinition([0, 1, 2])])
}

/// Builds a single oversized triangle covering the whole clip-space rectangle, used by full-screen
/// passes (reflection resolve, GI probe relight) that run a fragment shader over every pixel
/// without needing a quad's extra vertex and diagonal seam.
pub fn make_full_screen_triangle(server: &dyn GraphicsServer) -> Result<GpuGeometryBuffer, RenderError> {
    let (vertices, triangles) = full_screen_triangle_geometry();
    upload(server, &vertices, &triangles)
}

#[cfg(test)]
mod tests {
    // Geometry generation needs a live `GraphicsServer` to upload, so these tests exercise the
    // pure vertex/index builders directly rather than `make_sphere`/`make_cone`.
    use super::*;

    #[test]
    fn full_screen_triangle_covers_clip_space_corners() {
        let (vertices, triangles) = full_screen_triangle_geometry();
        assert_eq!(vertices.len(), 3);
        assert_eq!(triangles.len(), 1);
        for corner in [(-1.0, -1.0), (1.0, -1.0), (-1.0, 1.0)] {
            let covered = vertices.iter().any(|v| {
                v.position.x >= corner.0 - f32::EPSILON && v.position.y >= corner.1 - f32::EPSILON
            });
            assert!(covered, "triangle does not cover clip-space corner {corner:?}");
        }
    }

    #[test]
    fn sphere_ring_count_matches_stacks_and_slices() {
        let (vertices, triangles) = sphere_geometry(8, 8, 2.0);
        assert_eq!(vertices.len(), 9 * 9);
        // Every ring but the poles contributes two triangles per quad; poles contribute one.
        assert_eq!(triangles.len(), 8 * 8 * 2 - 8 * 2);
        for v in &vertices {
            let r = v.position.norm();
            assert!((r - 2.0).abs() < 1e-4, "vertex off the sphere surface: {r}");
        }
        for t in &triangles {
            for &index in &t.0 {
                assert!((index as usize) < vertices.len());
            }
        }
    }

    #[test]
    fn cone_has_two_triangles_per_side() {
        let (vertices, triangles) = cone_geometry(16, 1.5, 3.0);
        // Apex + base center + one vertex per rim segment.
        assert_eq!(vertices.len(), 16 + 2);
        // One side-wall and one base-cap triangle per segment.
        assert_eq!(triangles.len(), 16 * 2);
        assert_eq!(vertices[0].position, Vector3::new(0.0, 0.0, 0.0));
        for v in &vertices[2..] {
            assert!((v.position.y + 3.0).abs() < 1e-5);
        }
        for t in &triangles {
            for &index in &t.0 {
                assert!((index as usize) < vertices.len());
            }
        }
    }
}
