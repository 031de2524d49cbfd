//! Typed 2D points.

use std::marker::PhantomData;

/// A 2D coordinate tagged with its coordinate space.
///
/// The `TSpace` parameter is either [`Pixel`](super::Pixel) or
/// [`Normalized`](super::Normalized).
#[derive(Clone, Copy, PartialEq)]
pub struct Coord<TSpace> {
    pub x: f64,
    pub y: f64,
    _space: PhantomData<TSpace>,
}

impl<TSpace> Coord<TSpace> {
    #[inline]
    pub fn new(x: f64, y: f64) -> Self {
        Self {
            x,
            y,
            _space: PhantomData,
        }
    }

    /// Returns true if both components are finite.
    #[inline]
    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }

    /// Clamps `x` into `[0, max_x]` and `y` into `[0, max_y]`.
    #[inline]
    pub fn clamp_to(&self, max_x: f64, max_y: f64) -> Self {
        Self::new(self.x.clamp(0.0, max_x), self.y.clamp(0.0, max_y))
    }
}

impl<TSpace> std::fmt::Debug for Coord<TSpace> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Coord")
            .field("x", &self.x)
            .field("y", &self.y)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::Pixel;

    #[test]
    fn test_coord_is_finite() {
        let finite: Coord<Pixel> = Coord::new(10.0, 20.0);
        assert!(finite.is_finite());

        let nan: Coord<Pixel> = Coord::new(f64::NAN, 20.0);
        assert!(!nan.is_finite());

        let inf: Coord<Pixel> = Coord::new(10.0, f64::INFINITY);
        assert!(!inf.is_finite());
    }

    #[test]
    fn test_coord_clamp() {
        let coord: Coord<Pixel> = Coord::new(-5.0, 120.0);
        let clamped = coord.clamp_to(100.0, 100.0);
        assert_eq!(clamped.x, 0.0);
        assert_eq!(clamped.y, 100.0);
    }
}
