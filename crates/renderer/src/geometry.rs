//! Rectangles in device space used for op bounds and clipping.

/// Axis-aligned rectangle in device pixels.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Rect {
    /// Create a new rectangle.
    #[inline]
    pub const fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Right edge.
    #[inline]
    pub fn right(&self) -> f32 {
        self.x + self.width
    }

    /// Bottom edge.
    #[inline]
    pub fn bottom(&self) -> f32 {
        self.y + self.height
    }

    /// Whether the rectangle covers no area.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.width <= 0.0 || self.height <= 0.0
    }

    /// Expand this rectangle to include another rectangle.
    #[inline]
    pub fn union(&mut self, other: Self) {
        let max_x = self.right().max(other.right());
        let max_y = self.bottom().max(other.bottom());
        self.x = self.x.min(other.x);
        self.y = self.y.min(other.y);
        self.width = max_x - self.x;
        self.height = max_y - self.y;
    }

    /// Whether the two rectangles share any area.
    #[inline]
    pub fn intersects(&self, other: &Self) -> bool {
        self.x < other.right()
            && other.x < self.right()
            && self.y < other.bottom()
            && other.y < self.bottom()
    }

    /// Whether `other` lies entirely inside this rectangle.
    #[inline]
    pub fn contains(&self, other: &Self) -> bool {
        self.x <= other.x
            && self.y <= other.y
            && self.right() >= other.right()
            && self.bottom() >= other.bottom()
    }

    /// Overlapping area of the two rectangles, if any.
    #[inline]
    pub fn intersection(&self, other: &Self) -> Option<Self> {
        if !self.intersects(other) {
            return None;
        }
        let left = self.x.max(other.x);
        let top = self.y.max(other.y);
        let right = self.right().min(other.right());
        let bottom = self.bottom().min(other.bottom());
        Some(Self::new(left, top, right - left, bottom - top))
    }

    /// Whether all four edges lie on integer pixel boundaries.
    #[inline]
    pub fn is_pixel_aligned(&self) -> bool {
        [self.x, self.y, self.right(), self.bottom()]
            .iter()
            .all(|edge| edge.fract() == 0.0)
    }

    /// Smallest integer rectangle containing this one.
    #[inline]
    pub fn round_out(&self) -> IRect {
        let left = self.x.floor() as i32;
        let top = self.y.floor() as i32;
        let right = self.right().ceil() as i32;
        let bottom = self.bottom().ceil() as i32;
        IRect {
            x: left,
            y: top,
            width: (right - left).max(0) as u32,
            height: (bottom - top).max(0) as u32,
        }
    }
}

/// Integer rectangle, used for scissors and destination copies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct IRect {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}
