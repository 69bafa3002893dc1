//! Stateless colour helpers shared by every effect.
//!
//! Hues use an 8-bit wheel: 0 is red, ~85 green, ~170 blue, wrapping at 255.

/// Dimmest level effects fall back to so a strip never goes fully dark.
pub const MIN_BRIGHTNESS: f32 = 0.05;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const BLACK: Rgb = Rgb::new(0, 0, 0);
    pub const WHITE: Rgb = Rgb::new(255, 255, 255);

    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Multiplies every channel by `brightness`, truncating toward zero.
    pub fn scale(self, brightness: f32) -> Self {
        Self {
            r: (f32::from(self.r) * brightness) as u8,
            g: (f32::from(self.g) * brightness) as u8,
            b: (f32::from(self.b) * brightness) as u8,
        }
    }

    /// Linear blend, `t = 0` yields `self` and `t = 1` yields `other`.
    pub fn blend(self, other: Rgb, t: f32) -> Self {
        let mix = |a: u8, b: u8| (f32::from(a) * (1.0 - t) + f32::from(b) * t) as u8;
        Self {
            r: mix(self.r, other.r),
            g: mix(self.g, other.g),
            b: mix(self.b, other.b),
        }
    }
}

/// Fully saturated colour on the three-segment hue wheel.
pub fn hsv_to_rgb(hue: u8) -> Rgb {
    let mut scaled = u16::from(hue) * 3;
    if scaled < 255 {
        Rgb::new((255 - scaled) as u8, scaled as u8, 0)
    } else if scaled < 510 {
        scaled -= 255;
        Rgb::new(0, (255 - scaled) as u8, scaled as u8)
    } else {
        scaled -= 510;
        Rgb::new(scaled as u8, 0, (255 - scaled) as u8)
    }
}

/// Wraps an accumulated floating hue onto the 8-bit wheel.
pub fn wrap_hue(hue: f32) -> u8 {
    hue.rem_euclid(255.0) as u8
}

/// Advances a running hue accumulator, keeping it in `0..255`.
pub fn advance_hue(acc: &mut f32, step: f32) {
    *acc += step;
    if *acc >= 255.0 {
        *acc -= 255.0;
    }
}

/// 1.0 at `distance == 0`, falling linearly to 0.0 at `width`.
pub fn falloff(distance: f32, width: f32) -> f32 {
    if width <= 0.0 {
        return 0.0;
    }
    1.0 - (distance.abs() / width).min(1.0)
}

/// Clamps a brightness factor to `MIN_BRIGHTNESS..=1.0`.
pub fn clamp_brightness(brightness: f32) -> f32 {
    brightness.clamp(MIN_BRIGHTNESS, 1.0)
}

/// Position of `led` along the strip in `0.0..=1.0`.
pub fn led_position(led: usize, led_count: usize) -> f32 {
    if led_count <= 1 {
        0.0
    } else {
        led as f32 / (led_count - 1) as f32
    }
}

/// Maps a dB level onto `0.0..=1.0` given the floor that maps to zero.
pub fn normalize_db(db: f32, floor_db: f32) -> f32 {
    ((db - floor_db) / -floor_db).clamp(0.0, 1.0)
}
