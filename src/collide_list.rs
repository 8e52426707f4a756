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

//! Per-frame visible-object list, partitioned per light/cube-face. Produced once by the scene
//! traversal and then read by every pass; entries carry cached per-frame data so passes never
//! have to recompute LOD selection, cube-face masks or occlusion results.

use crate::core::algebra::Vector3;
use crate::core::math::aabb::AxisAlignedBoundingBox;
use crate::interfaces::Drawable;

/// Cached per-frame data attached to one collide list entry.
#[derive(Debug, Clone, Copy, Default)]
pub struct CollideListEntryData {
    /// Chosen level-of-detail for this frame.
    pub lod: u8,
    /// Six-bit cube-face visibility bitmask (bit `i` = face `i` touched).
    pub cube_face_mask: u8,
    /// Set when the observer (camera or light) is inside this entry's shape.
    pub camera_inside: bool,
    /// Set by the occlusion subsystem once its visibility test has run for this entry.
    pub occlusion_hidden: bool,
}

/// One visible object plus its cached per-frame data. The collide list owns this data for the
/// lifetime of the frame; per §3's invariant, the object the entry refers to must outlive the
/// collide list for that duration (the collide list itself never owns scene-graph storage).
pub struct CollideListEntry<T> {
    /// The collided object.
    pub object: T,
    /// Cached per-frame data.
    pub data: CollideListEntryData,
}

impl<T> CollideListEntry<T> {
    /// Wraps an object with freshly defaulted per-frame data.
    pub fn new(object: T) -> Self {
        Self {
            object,
            data: CollideListEntryData::default(),
        }
    }
}

/// A lightweight handle identifying a light/object inside a [`CollideList`] without borrowing it,
/// so other per-frame structures (shadow caches, light render contexts) can refer back to
/// entries cheaply.
pub type CollideIndex = u32;

/// Ordered sequences of visible components, lights, prop fields, height-terrain sectors and
/// environment maps for one frame.
#[derive(Default)]
pub struct CollideList<D: Drawable = DynDrawable> {
    components: Vec<CollideListEntry<D>>,
    lights: Vec<CollideIndex>,
    prop_fields: Vec<CollideIndex>,
    height_sectors: Vec<CollideIndex>,
    env_maps: Vec<CollideIndex>,
}

/// Object-safe drawable handle used as the collide list's default generic parameter so the type
/// can be named without threading a concrete scene-graph node type through every signature.
pub type DynDrawable = Box<dyn Drawable>;

impl<D: Drawable> CollideList<D> {
    /// Creates an empty collide list.
    pub fn new() -> Self {
        Self {
            components: Vec::new(),
            lights: Vec::new(),
            prop_fields: Vec::new(),
            height_sectors: Vec::new(),
            env_maps: Vec::new(),
        }
    }

    /// Adds a visible component, returning its index in the collide list.
    pub fn push_component(&mut self, object: D) -> CollideIndex {
        self.components.push(CollideListEntry::new(object));
        (self.components.len() - 1) as CollideIndex
    }

    /// All visible components.
    pub fn components(&self) -> &[CollideListEntry<D>] {
        &self.components
    }

    /// Mutable access to all visible components, e.g. for the occlusion subsystem to stamp
    /// `occlusion_hidden` after its visibility test runs.
    pub fn components_mut(&mut self) -> &mut [CollideListEntry<D>] {
        &mut self.components
    }

    /// Returns only the components that survived occlusion and are inside the given layer mask.
    pub fn visible_components(&self, layer_mask: u32, component_layer: impl Fn(&D) -> u32) -> impl Iterator<Item = &CollideListEntry<D>> {
        self.components
            .iter()
            .filter(move |e| !e.data.occlusion_hidden && (component_layer(&e.object) & layer_mask) != 0)
    }

    /// Marks the indices of components relevant to a light in [`CollideList::lights`] bookkeeping.
    pub fn record_light(&mut self, index: CollideIndex) {
        self.lights.push(index);
    }

    /// Indices recorded as lights.
    pub fn lights(&self) -> &[CollideIndex] {
        &self.lights
    }

    /// Records a prop field index.
    pub fn record_prop_field(&mut self, index: CollideIndex) {
        self.prop_fields.push(index);
    }

    /// Records a height-terrain sector index.
    pub fn record_height_sector(&mut self, index: CollideIndex) {
        self.height_sectors.push(index);
    }

    /// Records an environment map index.
    pub fn record_env_map(&mut self, index: CollideIndex) {
        self.env_maps.push(index);
    }

    /// Computes the union bounding box of every component, used as a fallback scene bound when
    /// no finer per-light culling is available.
    pub fn world_bounding_box(&self) -> Option<AxisAlignedBoundingBox> {
        let mut iter = self.components.iter().map(|e| e.object.world_bounding_box());
        let first = iter.next()?;
        Some(iter.fold(first, |mut acc, bb| {
            acc.add_box(bb);
            acc
        }))
    }
}

/// Partitions a flat list of drawables per cube face of a point-light render, given each
/// drawable's already-known geometry bounding box and the light's world position and range. This
/// is the CPU-side companion to §4.6's per-face shadow filter: a drawable belongs to face `i` iff
/// its inflated bounding box intersects the view frustum of that face.
pub fn cube_face_mask_for(center: Vector3<f32>, aabb: &AxisAlignedBoundingBox) -> u8 {
    // Faces, in order: +X, -X, +Y, -Y, +Z, -Z (matches the conventional cube-map face order).
    const AXES: [(usize, f32); 6] = [(0, 1.0), (0, -1.0), (1, 1.0), (1, -1.0), (2, 1.0), (2, -1.0)];
    let mut mask = 0u8;
    for (bit, (axis, sign)) in AXES.iter().enumerate() {
        // A face is touched if the AABB extends into its octant half-space from the light center,
        // i.e. the major axis component of the AABB in the direction of travel is not entirely
        // behind the light relative to that face's forward direction.
        let min = aabb.min[*axis] - center[*axis];
        let max = aabb.max[*axis] - center[*axis];
        let touches = if *sign > 0.0 { max >= 0.0 } else { min <= 0.0 };
        if touches {
            mask |= 1 << bit;
        }
    }
    // An object that straddles the light entirely (contains the light center) touches every face.
    if aabb.is_contains_point(center) {
        return 0b0011_1111;
    }
    mask
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn object_containing_light_center_touches_all_six_faces() {
        let aabb = AxisAlignedBoundingBox::from_min_max(
            Vector3::new(-5.0, -5.0, -5.0),
            Vector3::new(5.0, 5.0, 5.0),
        );
        assert_eq!(cube_face_mask_for(Vector3::new(0.0, 0.0, 0.0), &aabb), 0b0011_1111);
    }

    #[test]
    fn object_to_the_positive_x_only_touches_plus_x_face() {
        let aabb = AxisAlignedBoundingBox::from_min_max(
            Vector3::new(8.0, -1.0, -1.0),
            Vector3::new(10.0, 1.0, 1.0),
        );
        let mask = cube_face_mask_for(Vector3::new(0.0, 0.0, 0.0), &aabb);
        assert_eq!(mask & 0b0000_0001, 0b0000_0001, "+X bit must be set");
        assert_eq!(mask & 0b0000_0010, 0, "-X bit must not be set");
    }
}
