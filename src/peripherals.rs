use tracing::trace;

use crate::fixed;
use crate::value::{from_bool, Value};

/// Key indices understood by the keyboard built-ins
pub const KEY_UP: usize = 0;
pub const KEY_DOWN: usize = 1;
pub const KEY_LEFT: usize = 2;
pub const KEY_RIGHT: usize = 3;
pub const KEY_CTRL: usize = 4;
pub const KEY_MAX: usize = 5;

/// Peripheral trait for platform-specific operations
///
/// This trait abstracts everything the built-in table reaches outside the VM for:
/// - Rendering primitives (line, rectangle, triangle)
/// - Keyboard queries by key index
/// - Pseudo-random numbers
/// - Fixed-point trigonometry and multiplication
///
/// Every operation takes its fixed number of arguments and returns exactly one
/// value, which the engine pushes as the built-in's result. The engine never
/// looks at how a platform renders or samples input.
pub trait Peripherals {
    /// Called by the host at the start of every frame tick, before the engine runs
    fn frame_start(&mut self) {}

    /// Called by the host after the engine has run for the tick (present/flush)
    fn frame_end(&mut self) {}

    fn draw_line(&mut self, color: Value, x0: Value, y0: Value, x1: Value, y1: Value) -> Value;

    fn fill_rect(&mut self, color: Value, x: Value, y: Value, w: Value, h: Value) -> Value;

    #[allow(clippy::too_many_arguments)]
    fn fill_triangle(
        &mut self,
        color: Value,
        x0: Value,
        y0: Value,
        x1: Value,
        y1: Value,
        x2: Value,
        y2: Value,
    ) -> Value;

    /// Key went down since the previous frame
    fn key_pressed(&mut self, index: Value) -> Value;

    /// Key went up since the previous frame
    fn key_released(&mut self, index: Value) -> Value;

    fn key_held(&mut self, index: Value) -> Value;

    /// Draw a pseudo-random value in `0..=0x7fff`
    fn random(&mut self) -> Value;

    fn set_random_seed(&mut self, seed: Value) -> Value;

    /// Fixed-point sine; see `fixed` for units
    fn sin_fxp(&mut self, angle: Value) -> Value {
        fixed::sin(angle)
    }

    fn cos_fxp(&mut self, angle: Value) -> Value {
        fixed::cos(angle)
    }

    fn mul_fxp(&mut self, a: Value, b: Value) -> Value {
        fixed::mul(a, b)
    }
}

/// Peripherals without a display, for the host binary, bindings and tests
///
/// Draw calls are counted and traced, key state is set by the embedder, and
/// random numbers come from a seedable linear congruential generator.
#[derive(Debug, Clone)]
pub struct HeadlessPeripherals {
    held: [bool; KEY_MAX],
    previous: [bool; KEY_MAX],
    rng_state: u32,
    pub draw_calls: usize,
    pub frames: usize,
}

impl HeadlessPeripherals {
    pub fn new() -> Self {
        HeadlessPeripherals {
            held: [false; KEY_MAX],
            previous: [false; KEY_MAX],
            rng_state: 1,
            draw_calls: 0,
            frames: 0,
        }
    }

    /// Set the held state of a key for the current frame
    pub fn set_key(&mut self, index: usize, down: bool) {
        if let Some(key) = self.held.get_mut(index) {
            *key = down;
        }
    }

    fn key(state: &[bool; KEY_MAX], index: Value) -> bool {
        usize::try_from(index)
            .ok()
            .and_then(|i| state.get(i).copied())
            .unwrap_or(false)
    }
}

impl Default for HeadlessPeripherals {
    fn default() -> Self {
        Self::new()
    }
}

impl Peripherals for HeadlessPeripherals {
    fn frame_end(&mut self) {
        self.previous = self.held;
        self.frames += 1;
    }

    fn draw_line(&mut self, color: Value, x0: Value, y0: Value, x1: Value, y1: Value) -> Value {
        trace!(color, x0, y0, x1, y1, "draw-line");
        self.draw_calls += 1;
        0
    }

    fn fill_rect(&mut self, color: Value, x: Value, y: Value, w: Value, h: Value) -> Value {
        trace!(color, x, y, w, h, "fill-rect");
        self.draw_calls += 1;
        0
    }

    fn fill_triangle(
        &mut self,
        color: Value,
        x0: Value,
        y0: Value,
        x1: Value,
        y1: Value,
        x2: Value,
        y2: Value,
    ) -> Value {
        trace!(color, x0, y0, x1, y1, x2, y2, "fill-triangle");
        self.draw_calls += 1;
        0
    }

    fn key_pressed(&mut self, index: Value) -> Value {
        from_bool(Self::key(&self.held, index) && !Self::key(&self.previous, index))
    }

    fn key_released(&mut self, index: Value) -> Value {
        from_bool(!Self::key(&self.held, index) && Self::key(&self.previous, index))
    }

    fn key_held(&mut self, index: Value) -> Value {
        from_bool(Self::key(&self.held, index))
    }

    fn random(&mut self) -> Value {
        self.rng_state = self.rng_state.wrapping_mul(1_103_515_245).wrapping_add(12345);
        ((self.rng_state >> 16) & 0x7fff) as Value
    }

    fn set_random_seed(&mut self, seed: Value) -> Value {
        self.rng_state = seed as u16 as u32;
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_edges() {
        let mut periph = HeadlessPeripherals::new();
        periph.set_key(KEY_LEFT, true);

        assert_eq!(periph.key_held(KEY_LEFT as Value), 1);
        assert_eq!(periph.key_pressed(KEY_LEFT as Value), 1);
        assert_eq!(periph.key_released(KEY_LEFT as Value), 0);

        periph.frame_end();
        assert_eq!(periph.key_pressed(KEY_LEFT as Value), 0);
        assert_eq!(periph.key_held(KEY_LEFT as Value), 1);

        periph.set_key(KEY_LEFT, false);
        assert_eq!(periph.key_released(KEY_LEFT as Value), 1);
        assert_eq!(periph.key_held(KEY_LEFT as Value), 0);
    }

    #[test]
    fn test_unknown_keys_are_never_held() {
        let mut periph = HeadlessPeripherals::new();
        periph.set_key(KEY_MAX, true);
        assert_eq!(periph.key_held(KEY_MAX as Value), 0);
        assert_eq!(periph.key_held(-1), 0);
    }

    #[test]
    fn test_random_is_seeded_and_bounded() {
        let mut a = HeadlessPeripherals::new();
        let mut b = HeadlessPeripherals::new();
        a.set_random_seed(42);
        b.set_random_seed(42);

        for _ in 0..100 {
            let x = a.random();
            assert!((0..=0x7fff).contains(&x));
            assert_eq!(x, b.random());
        }
    }

    #[test]
    fn test_default_fixed_point_ops() {
        let mut periph = HeadlessPeripherals::new();
        assert_eq!(periph.mul_fxp(128, 32), 64);
        assert_eq!(periph.sin_fxp(0), 0);
        assert_eq!(periph.cos_fxp(0), 0x40);
    }
}
