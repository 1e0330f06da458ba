//! Common types shared across the graphics core.

use std::fmt;

// ============================================================================
// Geometry
// ============================================================================

/// Axis-aligned float rectangle, `left <= right` and `top <= bottom` when sorted.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Rect2f {
    pub left: f32,
    pub top: f32,
    pub right: f32,
    pub bottom: f32,
}

impl Rect2f {
    /// Create a rectangle from its edges.
    pub const fn new(left: f32, top: f32, right: f32, bottom: f32) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
        }
    }

    /// Create a rectangle from an origin and a size.
    pub fn from_xywh(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self::new(x, y, x + width, y + height)
    }

    pub fn width(&self) -> f32 {
        self.right - self.left
    }

    pub fn height(&self) -> f32 {
        self.bottom - self.top
    }

    pub fn center_x(&self) -> f32 {
        (self.left + self.right) * 0.5
    }

    pub fn center_y(&self) -> f32 {
        (self.top + self.bottom) * 0.5
    }

    /// True if the rectangle encloses no area.
    pub fn is_empty(&self) -> bool {
        !(self.left < self.right && self.top < self.bottom)
    }

    /// Grow this rectangle to enclose `other`.
    pub fn join(&mut self, other: &Rect2f) {
        if other.is_empty() {
            return;
        }
        if self.is_empty() {
            *self = *other;
            return;
        }
        self.left = self.left.min(other.left);
        self.top = self.top.min(other.top);
        self.right = self.right.max(other.right);
        self.bottom = self.bottom.max(other.bottom);
    }

    /// Expand each edge by `dx`, `dy`.
    pub fn outset(&self, dx: f32, dy: f32) -> Self {
        Self::new(self.left - dx, self.top - dy, self.right + dx, self.bottom + dy)
    }

    /// Smallest integer rectangle containing this one.
    pub fn round_out(&self) -> Rect2i {
        Rect2i::new(
            self.left.floor() as i32,
            self.top.floor() as i32,
            self.right.ceil() as i32,
            self.bottom.ceil() as i32,
        )
    }
}

/// Axis-aligned integer rectangle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Rect2i {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

impl Rect2i {
    pub const fn new(left: i32, top: i32, right: i32, bottom: i32) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
        }
    }

    pub fn width(&self) -> i32 {
        self.right - self.left
    }

    pub fn height(&self) -> i32 {
        self.bottom - self.top
    }

    /// Clamp to `[0, width) x [0, height)`.
    pub fn intersect_bounds(&self, width: i32, height: i32) -> Self {
        Self::new(
            self.left.clamp(0, width),
            self.top.clamp(0, height),
            self.right.clamp(0, width),
            self.bottom.clamp(0, height),
        )
    }
}

// ============================================================================
// Surface description
// ============================================================================

/// Where row zero of a surface lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SurfaceOrigin {
    #[default]
    UpperLeft,
    LowerLeft,
}

/// Logical pixel layout requested by callers, mapped to a backend format by the caps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColorType {
    Alpha8,
    Gray8,
    Rg88,
    Rgba8888,
    Rgba8888Srgb,
    Rgb888x,
    Bgra8888,
    Rgba1010102,
    RgbaF16,
    RgbaF32,
}

/// Component remapping applied when reading or writing a surface.
///
/// Stored as four 4-bit component codes, red in the low nibble.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Swizzle(u16);

impl Swizzle {
    pub const RGBA: Swizzle = Swizzle::make(b"rgba");
    pub const RGB1: Swizzle = Swizzle::make(b"rgb1");
    pub const BGRA: Swizzle = Swizzle::make(b"bgra");
    pub const RRR1: Swizzle = Swizzle::make(b"rrr1");
    pub const ZZZR: Swizzle = Swizzle::make(b"000r");
    pub const AAAA: Swizzle = Swizzle::make(b"aaaa");

    /// Build a swizzle from four of `r`, `g`, `b`, `a`, `0`, `1`.
    ///
    /// Panics on any other character.
    pub const fn make(components: &[u8; 4]) -> Swizzle {
        let mut key = 0u16;
        let mut i = 0;
        while i < 4 {
            let code = match components[i] {
                b'r' => 0,
                b'g' => 1,
                b'b' => 2,
                b'a' => 3,
                b'0' => 4,
                b'1' => 5,
                _ => panic!("invalid swizzle component"),
            };
            key |= code << (i * 4);
            i += 1;
        }
        Swizzle(key)
    }

    /// Packed 16-bit representation.
    pub fn key(&self) -> u16 {
        self.0
    }

    /// Component code at `index` (0 = red channel).
    pub fn component(&self, index: usize) -> u8 {
        ((self.0 >> (index * 4)) & 0xF) as u8
    }

    /// Remap the channels of `color`.
    pub fn apply(&self, color: [f32; 4]) -> [f32; 4] {
        std::array::from_fn(|i| match self.component(i) {
            code @ 0..=3 => color[code as usize],
            4 => 0.0,
            _ => 1.0,
        })
    }

    /// Compose two swizzles: apply `self` then `other`.
    pub fn concat(&self, other: Swizzle) -> Swizzle {
        let mut key = 0u16;
        for i in 0..4 {
            let code = other.component(i);
            let resolved = if code < 4 {
                self.component(code as usize)
            } else {
                code
            };
            key |= (resolved as u16) << (i * 4);
        }
        Swizzle(key)
    }
}

impl Default for Swizzle {
    fn default() -> Self {
        Self::RGBA
    }
}

impl fmt::Debug for Swizzle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Swizzle(\"{self}\")")
    }
}

impl fmt::Display for Swizzle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for i in 0..4 {
            let c = match self.component(i) {
                0 => 'r',
                1 => 'g',
                2 => 'b',
                3 => 'a',
                4 => '0',
                _ => '1',
            };
            write!(f, "{c}")?;
        }
        Ok(())
    }
}

// ============================================================================
// Render pass operations
// ============================================================================

/// What happens to attachment contents at the start of a render pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum LoadOp {
    /// Keep the previous contents.
    #[default]
    Load,
    /// Clear to the pass clear value.
    Clear,
    /// Contents are undefined.
    DontCare,
}

/// What happens to attachment contents at the end of a render pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum StoreOp {
    /// Write the results back to memory.
    #[default]
    Store,
    /// Results may be discarded.
    DontCare,
}

/// Primitive topology of a draw.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PrimitiveType {
    Points,
    Lines,
    LineStrip,
    #[default]
    Triangles,
    TriangleStrip,
}

impl PrimitiveType {
    /// Stable index used when packing the topology into keys.
    pub fn index(&self) -> u32 {
        *self as u32
    }

    /// Decode a packed topology index.
    pub fn from_index(index: u32) -> Option<Self> {
        match index {
            0 => Some(Self::Points),
            1 => Some(Self::Lines),
            2 => Some(Self::LineStrip),
            3 => Some(Self::Triangles),
            4 => Some(Self::TriangleStrip),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rect_join() {
        let mut a = Rect2f::new(0.0, 0.0, 10.0, 10.0);
        a.join(&Rect2f::new(5.0, -5.0, 20.0, 8.0));
        assert_eq!(a, Rect2f::new(0.0, -5.0, 20.0, 10.0));

        let mut empty = Rect2f::default();
        empty.join(&a);
        assert_eq!(empty, a);
    }

    #[test]
    fn test_round_out() {
        let r = Rect2f::new(0.5, 1.2, 3.1, 4.0).round_out();
        assert_eq!(r, Rect2i::new(0, 1, 4, 4));
    }

    #[test]
    fn test_swizzle_display() {
        assert_eq!(Swizzle::RGBA.to_string(), "rgba");
        assert_eq!(Swizzle::RGB1.to_string(), "rgb1");
        assert_eq!(Swizzle::AAAA.to_string(), "aaaa");
    }

    #[test]
    fn test_swizzle_apply() {
        let color = [0.1, 0.2, 0.3, 0.4];
        assert_eq!(Swizzle::RGBA.apply(color), color);
        assert_eq!(Swizzle::BGRA.apply(color), [0.3, 0.2, 0.1, 0.4]);
        assert_eq!(Swizzle::AAAA.apply(color), [0.4; 4]);
        assert_eq!(Swizzle::ZZZR.apply(color), [0.0, 0.0, 0.0, 0.1]);
        assert_eq!(Swizzle::RGB1.apply(color), [0.1, 0.2, 0.3, 1.0]);
    }

    #[test]
    fn test_swizzle_concat() {
        assert_eq!(Swizzle::RGBA.concat(Swizzle::BGRA), Swizzle::BGRA);
        assert_eq!(Swizzle::BGRA.concat(Swizzle::BGRA), Swizzle::RGBA);
        assert_eq!(Swizzle::RGBA.concat(Swizzle::RGB1), Swizzle::RGB1);
    }

    #[test]
    fn test_primitive_index_roundtrip() {
        for index in 0..5 {
            let ty = PrimitiveType::from_index(index).unwrap();
            assert_eq!(ty.index(), index);
        }
        assert_eq!(PrimitiveType::from_index(5), None);
    }
}
