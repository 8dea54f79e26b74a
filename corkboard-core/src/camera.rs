//! Camera over the infinite canvas.
//!
//! Rendering applies `translate(pan) scale(scale)`; the conversions here are
//! its exact inverse. Pan and pivots are measured relative to the canvas
//! container's top-left corner, screen points in absolute screen space.

use corkboard_types::Point;
use serde::{Deserialize, Serialize};

pub const MIN_SCALE: f64 = 0.25;
pub const MAX_SCALE: f64 = 5.0;
pub const ZOOM_OUT_FACTOR: f64 = 0.9;
pub const ZOOM_IN_FACTOR: f64 = 1.1;

/// Wheel deltas are doubled when panning with a modifier held.
const WHEEL_PAN_FACTOR: f64 = 2.0;

pub fn clamp_scale(scale: f64) -> f64 {
    if scale.is_nan() {
        return 1.0;
    }
    scale.clamp(MIN_SCALE, MAX_SCALE)
}

/// Pan offset (screen pixels) plus uniform zoom.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CanvasTransform {
    pub x: f64,
    pub y: f64,
    pub scale: f64,
}

impl Default for CanvasTransform {
    fn default() -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            scale: 1.0,
        }
    }
}

/// A wheel event over the canvas.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WheelInput {
    pub delta_x: f64,
    pub delta_y: f64,
    /// Ctrl/Cmd held: pan instead of zoom.
    pub modifier: bool,
    /// Pointer position relative to the canvas container.
    pub pointer: Point,
}

impl CanvasTransform {
    pub fn new(pan: Point, scale: f64) -> Self {
        Self {
            x: pan.x,
            y: pan.y,
            scale: clamp_scale(scale),
        }
    }

    pub fn pan_offset(&self) -> Point {
        Point::new(self.x, self.y)
    }

    pub fn screen_to_canvas(&self, screen: Point, origin: Point) -> Point {
        Point::new(
            (screen.x - origin.x - self.x) / self.scale,
            (screen.y - origin.y - self.y) / self.scale,
        )
    }

    pub fn canvas_to_screen(&self, canvas: Point, origin: Point) -> Point {
        Point::new(
            canvas.x * self.scale + self.x + origin.x,
            canvas.y * self.scale + self.y + origin.y,
        )
    }

    pub fn pan_by(&mut self, dx: f64, dy: f64) {
        self.x += dx;
        self.y += dy;
    }

    /// One wheel tick of zoom (out for positive `delta_y`), keeping the
    /// canvas point under `pivot` fixed. Returns false when already at a
    /// scale limit.
    pub fn zoom(&mut self, delta_y: f64, pivot: Point) -> bool {
        let factor = if delta_y > 0.0 {
            ZOOM_OUT_FACTOR
        } else {
            ZOOM_IN_FACTOR
        };
        self.zoom_to(self.scale * factor, pivot)
    }

    /// Set the scale directly, anchored at `pivot`.
    pub fn zoom_to(&mut self, scale: f64, pivot: Point) -> bool {
        let new_scale = clamp_scale(scale);
        if new_scale == self.scale {
            return false;
        }
        let ratio = (new_scale - self.scale) / self.scale;
        self.x -= (pivot.x - self.x) * ratio;
        self.y -= (pivot.y - self.y) * ratio;
        self.scale = new_scale;
        true
    }

    /// Apply a wheel event. Ignored while a box is being edited so the box
    /// can scroll its own content.
    pub fn wheel(&mut self, input: WheelInput, editing: bool) -> bool {
        if editing {
            return false;
        }
        if input.modifier {
            self.pan_by(
                -input.delta_x * WHEEL_PAN_FACTOR,
                -input.delta_y * WHEEL_PAN_FACTOR,
            );
            return true;
        }
        self.zoom(input.delta_y, input.pointer)
    }

    /// Restore a note's saved camera.
    pub fn reset(&mut self, zoom: f64, pan: Point) {
        *self = Self::new(pan, zoom);
    }
}
