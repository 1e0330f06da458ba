//! Uniform block packing.
//!
//! [`UniformDataGatherer`] writes uniform values into a growable byte buffer,
//! padding every write to its natural alignment under the std140 or std430
//! rules. The finished block is padded to the largest alignment used.
//!
//! # Example
//!
//! ```ignore
//! let mut gatherer = UniformDataGatherer::new(UniformLayout::Std140);
//! gatherer.write4f(sx, sy, tx, ty);
//! gatherer.write_matrix3f(&view_matrix);
//! let bytes = gatherer.finish();
//! assert_eq!(bytes.len(), 64);
//! ```

use glam::{Mat3, Mat4};

/// Memory layout rules for a uniform block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum UniformLayout {
    /// std140: array elements and matrix columns padded to 16 bytes.
    #[default]
    Std140 = 1,
    /// std430: tightly packed scalar and vec2 arrays.
    Std430 = 2,
}

const INITIAL_CAPACITY: usize = 256;

#[inline]
fn align_to(value: usize, alignment: usize) -> usize {
    debug_assert!(alignment.is_power_of_two());
    (value + alignment - 1) & !(alignment - 1)
}

/// Growable, alignment-aware uniform byte buffer.
#[derive(Debug, Clone)]
pub struct UniformDataGatherer {
    layout: UniformLayout,
    storage: Vec<u8>,
    position: usize,
    required_alignment: usize,
}

impl UniformDataGatherer {
    pub fn new(layout: UniformLayout) -> Self {
        Self {
            layout,
            storage: vec![0; INITIAL_CAPACITY],
            position: 0,
            required_alignment: 0,
        }
    }

    pub fn layout(&self) -> UniformLayout {
        self.layout
    }

    /// Bytes written so far, including padding.
    pub fn position(&self) -> usize {
        self.position
    }

    /// Current storage size. Never shrinks.
    pub fn capacity(&self) -> usize {
        self.storage.len()
    }

    /// Largest alignment requested since the last reset.
    pub fn required_alignment(&self) -> usize {
        self.required_alignment
    }

    /// Rewind for a new block with the same layout.
    pub fn reset(&mut self) {
        self.position = 0;
        self.required_alignment = 0;
    }

    /// Rewind for a new block with `layout`.
    pub fn reset_with_layout(&mut self, layout: UniformLayout) {
        self.layout = layout;
        self.reset();
    }

    /// Reserve `size` bytes at the next multiple of `alignment`, zeroing the
    /// padding in between. Returns the reserved bytes.
    pub fn append(&mut self, alignment: usize, size: usize) -> &mut [u8] {
        let padding = align_to(self.position, alignment) - self.position;
        let count = size + padding;
        if count == 0 {
            return &mut [];
        }
        let required = self.position + count;
        if required > self.storage.len() {
            self.grow(required);
        }
        self.storage[self.position..self.position + padding].fill(0);
        let offset = self.position + padding;
        self.position = required;
        self.required_alignment = self.required_alignment.max(alignment);
        &mut self.storage[offset..offset + size]
    }

    fn grow(&mut self, required: usize) {
        // 1.25x the required size plus a little, rounded up to 16
        let grown = required + 4;
        let new_capacity = align_to(grown + (grown >> 2), 16);
        log::trace!(
            "UniformDataGatherer: growing {} -> {} bytes",
            self.storage.len(),
            new_capacity
        );
        self.storage.resize(new_capacity, 0);
    }

    pub fn write1i(&mut self, x: i32) {
        self.append(4, 4).copy_from_slice(&x.to_ne_bytes());
    }

    pub fn write1f(&mut self, x: f32) {
        self.append(4, 4).copy_from_slice(&x.to_ne_bytes());
    }

    pub fn write2i(&mut self, x: i32, y: i32) {
        self.append(8, 8).copy_from_slice(bytemuck::bytes_of(&[x, y]));
    }

    pub fn write2f(&mut self, x: f32, y: f32) {
        self.append(8, 8).copy_from_slice(bytemuck::bytes_of(&[x, y]));
    }

    pub fn write3f(&mut self, x: f32, y: f32, z: f32) {
        self.append(16, 12).copy_from_slice(bytemuck::bytes_of(&[x, y, z]));
    }

    pub fn write4i(&mut self, x: i32, y: i32, z: i32, w: i32) {
        self.append(16, 16)
            .copy_from_slice(bytemuck::bytes_of(&[x, y, z, w]));
    }

    pub fn write4f(&mut self, x: f32, y: f32, z: f32, w: f32) {
        self.append(16, 16)
            .copy_from_slice(bytemuck::bytes_of(&[x, y, z, w]));
    }

    /// Write an array of vec4, `values.len()` must be a multiple of 4.
    pub fn write4fv(&mut self, values: &[f32]) {
        assert!(values.len() % 4 == 0, "vec4 array length must be a multiple of 4");
        self.append(16, values.len() * 4)
            .copy_from_slice(bytemuck::cast_slice(values));
    }

    /// Write an array of float. std140 pads every element to 16 bytes.
    pub fn write1fv(&mut self, values: &[f32]) {
        match self.layout {
            UniformLayout::Std140 => {
                let dst = self.append(16, values.len() * 16);
                for (chunk, v) in dst.chunks_exact_mut(16).zip(values) {
                    chunk[..4].copy_from_slice(&v.to_ne_bytes());
                    chunk[4..].fill(0);
                }
            }
            UniformLayout::Std430 => {
                self.append(4, values.len() * 4)
                    .copy_from_slice(bytemuck::cast_slice(values));
            }
        }
    }

    /// Write an array of vec2, `values.len()` must be even. std140 pads every
    /// element to 16 bytes.
    pub fn write2fv(&mut self, values: &[f32]) {
        assert!(values.len() % 2 == 0, "vec2 array length must be even");
        match self.layout {
            UniformLayout::Std140 => {
                let dst = self.append(16, values.len() / 2 * 16);
                for (chunk, v) in dst.chunks_exact_mut(16).zip(values.chunks_exact(2)) {
                    chunk[..8].copy_from_slice(bytemuck::cast_slice(v));
                    chunk[8..].fill(0);
                }
            }
            UniformLayout::Std430 => {
                self.append(8, values.len() * 4)
                    .copy_from_slice(bytemuck::cast_slice(values));
            }
        }
    }

    /// Write a 3x3 matrix as three columns, each padded to a vec4.
    pub fn write_matrix3f(&mut self, matrix: &Mat3) {
        let cols = matrix.to_cols_array();
        let padded = [
            cols[0], cols[1], cols[2], 0.0, //
            cols[3], cols[4], cols[5], 0.0, //
            cols[6], cols[7], cols[8], 0.0,
        ];
        self.append(16, 48).copy_from_slice(bytemuck::bytes_of(&padded));
    }

    /// Write a 4x4 matrix in column-major order.
    pub fn write_matrix4f(&mut self, matrix: &Mat4) {
        let cols = matrix.to_cols_array();
        self.append(16, 64).copy_from_slice(bytemuck::bytes_of(&cols));
    }

    /// Pad to the largest alignment used and return the finished block.
    pub fn finish(&mut self) -> &[u8] {
        if self.required_alignment > 0 {
            self.append(self.required_alignment, 0);
        }
        &self.storage[..self.position]
    }
}

impl Default for UniformDataGatherer {
    fn default() -> Self {
        Self::new(UniformLayout::Std140)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;

    fn read_f32s(bytes: &[u8]) -> Vec<f32> {
        bytes
            .chunks_exact(4)
            .map(|c| f32::from_ne_bytes([c[0], c[1], c[2], c[3]]))
            .collect()
    }

    #[test]
    fn test_offsets_respect_alignment() {
        let mut g = UniformDataGatherer::new(UniformLayout::Std140);
        let check = |g: &mut UniformDataGatherer, align: usize, size: usize| {
            let offset = g.position() - size;
            assert_eq!(offset % align, 0, "write of {size} bytes at {offset}");
        };
        g.write1f(1.0);
        check(&mut g, 4, 4);
        g.write3f(1.0, 2.0, 3.0);
        check(&mut g, 16, 12);
        g.write1i(7);
        check(&mut g, 4, 4);
        g.write2f(1.0, 2.0);
        check(&mut g, 8, 8);
        g.write_matrix3f(&Mat3::IDENTITY);
        check(&mut g, 16, 48);
        g.write1f(5.0);
        check(&mut g, 4, 4);
        let len = g.finish().len();
        assert_eq!(len % 16, 0);
        assert_eq!(len, 112);
    }

    #[test]
    fn test_finish_pads_to_largest_alignment() {
        let mut g = UniformDataGatherer::new(UniformLayout::Std430);
        g.write1f(1.0);
        g.write2f(2.0, 3.0);
        g.write1i(4);
        assert_eq!(g.position(), 20);
        assert_eq!(g.finish().len(), 24);
    }

    #[test]
    fn test_empty_finish() {
        let mut g = UniformDataGatherer::default();
        assert!(g.finish().is_empty());
    }

    #[test]
    fn test_padding_is_zeroed() {
        let mut g = UniformDataGatherer::new(UniformLayout::Std140);
        // dirty the storage, then rewind
        g.write4f(9.0, 9.0, 9.0, 9.0);
        g.reset();
        g.write1f(1.0);
        g.write4f(2.0, 2.0, 2.0, 2.0);
        let values = read_f32s(g.finish());
        assert_eq!(values, vec![1.0, 0.0, 0.0, 0.0, 2.0, 2.0, 2.0, 2.0]);
    }

    #[test]
    fn test_matrix4_roundtrip() {
        let m = Mat4::from_cols_array(&[
            1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0, 10.0, 11.0, 12.0, 13.0, 14.0, 15.0,
            16.0,
        ]);
        let mut g = UniformDataGatherer::new(UniformLayout::Std140);
        g.write_matrix4f(&m);
        let values = read_f32s(g.finish());
        assert_eq!(values.as_slice(), &m.to_cols_array());
    }

    #[test]
    fn test_matrix3_columns_padded() {
        let m = Mat3::from_cols(
            Vec3::new(1.0, 2.0, 3.0),
            Vec3::new(4.0, 5.0, 6.0),
            Vec3::new(7.0, 8.0, 9.0),
        );
        let mut g = UniformDataGatherer::new(UniformLayout::Std140);
        g.write_matrix3f(&m);
        let values = read_f32s(g.finish());
        assert_eq!(
            values,
            vec![1.0, 2.0, 3.0, 0.0, 4.0, 5.0, 6.0, 0.0, 7.0, 8.0, 9.0, 0.0]
        );
    }

    #[test]
    fn test_growth_preserves_content() {
        let mut g = UniformDataGatherer::new(UniformLayout::Std140);
        let values: Vec<f32> = (0..128).map(|i| i as f32).collect();
        g.write4fv(&values);
        assert!(g.capacity() >= 512);
        assert_eq!(g.capacity() % 16, 0);
        assert_eq!(read_f32s(g.finish()), values);
    }

    #[test]
    fn test_array_layouts() {
        let mut g = UniformDataGatherer::new(UniformLayout::Std140);
        g.write2fv(&[1.0, 2.0, 3.0, 4.0]);
        assert_eq!(g.finish().len(), 32);

        g.reset_with_layout(UniformLayout::Std430);
        g.write2fv(&[1.0, 2.0, 3.0, 4.0]);
        assert_eq!(g.finish().len(), 16);

        g.reset();
        g.write1fv(&[1.0, 2.0, 3.0]);
        assert_eq!(read_f32s(g.finish()), vec![1.0, 2.0, 3.0]);
    }
}
