//! Screen-space geometry

use glam::Vec2;
use serde::{Deserialize, Serialize};

/// Smallest viewport accepted from configuration
pub const MIN_VIEWPORT: (u32, u32) = (640, 480);
/// Fallback used when the configured viewport is too small
pub const FALLBACK_VIEWPORT: (u32, u32) = (1920, 1080);

/// How `world_to_screen` treats points outside the viewport
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScreenCheck {
    /// Return the projected point wherever it lands
    #[default]
    Off,
    /// Fail unless inside the viewport rectangle
    Strict,
    /// Fail unless inside the viewport widened by the configured tolerance
    Tolerant,
}

/// Viewport rectangle in pixels
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
    pub left: f32,
    pub top: f32,
    pub width: f32,
    pub height: f32,
}

impl Viewport {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            left: 0.0,
            top: 0.0,
            width: width as f32,
            height: height as f32,
        }
    }

    /// Viewport from configured dimensions, falling back to 1920x1080 when too small
    pub fn from_resolution(width: u32, height: u32) -> Self {
        if width < MIN_VIEWPORT.0 || height < MIN_VIEWPORT.1 {
            tracing::warn!(
                width,
                height,
                "Viewport resolution invalid, falling back to {}x{}",
                FALLBACK_VIEWPORT.0,
                FALLBACK_VIEWPORT.1
            );
            return Self::new(FALLBACK_VIEWPORT.0, FALLBACK_VIEWPORT.1);
        }
        Self::new(width, height)
    }

    pub fn right(&self) -> f32 {
        self.left + self.width
    }

    pub fn bottom(&self) -> f32 {
        self.top + self.height
    }

    pub fn center(&self) -> Vec2 {
        Vec2::new(self.width / 2.0, self.height / 2.0)
    }

    pub fn is_empty(&self) -> bool {
        self.width <= 0.0 || self.height <= 0.0
    }

    /// Inside the rectangle grown by `margin` on every side
    pub fn contains(&self, point: Vec2, margin: f32) -> bool {
        point.x >= self.left - margin
            && point.x <= self.right() + margin
            && point.y >= self.top - margin
            && point.y <= self.bottom() + margin
    }
}

impl Default for Viewport {
    fn default() -> Self {
        Self::new(FALLBACK_VIEWPORT.0, FALLBACK_VIEWPORT.1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_center() {
        assert_eq!(Viewport::new(1920, 1080).center(), Vec2::new(960.0, 540.0));
    }

    #[test]
    fn test_from_resolution_fallback() {
        assert_eq!(Viewport::from_resolution(320, 200), Viewport::default());
        assert_eq!(Viewport::from_resolution(2560, 1440).width, 2560.0);
    }

    #[test]
    fn test_contains_with_margin() {
        let vp = Viewport::new(1920, 1080);
        assert!(vp.contains(Vec2::new(0.0, 0.0), 0.0));
        assert!(vp.contains(Vec2::new(1920.0, 1080.0), 0.0));
        assert!(!vp.contains(Vec2::new(-1.0, 10.0), 0.0));
        assert!(vp.contains(Vec2::new(-1.0, 10.0), 800.0));
        assert!(!vp.contains(Vec2::new(2721.0, 10.0), 800.0));
    }
}
