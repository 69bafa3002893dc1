//! Effects driven only by the motion sample. Acceleration is expected in g,
//! angular rate in degrees per second.

use super::{
    color::{advance_hue, clamp_brightness, falloff, hsv_to_rgb, led_position, wrap_hue, Rgb},
    Effect,
};
use crate::{frame::PixelFrame, spectrum::SpectrumReader, MotionSample};

/// Single colour picked from the direction of gravity.
#[derive(Debug, Default)]
pub struct GravityRainbow;

impl Effect for GravityRainbow {
    fn name(&self) -> &'static str {
        "Gravity Rainbow"
    }

    fn render(&mut self, motion: &MotionSample, _: &SpectrumReader, frame: &mut PixelFrame) {
        frame.fill(hsv_to_rgb((motion.tilt_angle() * 255.0) as u8));
    }
}

/// Red-orange glow that brightens with spin speed, never fully dark.
#[derive(Debug, Default)]
pub struct SpinFire;

impl Effect for SpinFire {
    fn name(&self) -> &'static str {
        "Spin Fire"
    }

    fn render(&mut self, motion: &MotionSample, _: &SpectrumReader, frame: &mut PixelFrame) {
        let intensity = (motion.gyro_z.abs() / 4.0 + 40.0).min(255.0) as u8;
        frame.fill(Rgb::new(intensity, intensity / 3, 0));
    }
}

/// Rainbow gradient whose hue advances with spin speed.
#[derive(Debug, Default)]
pub struct CentrifugalRainbow {
    hue: f32,
}

impl Effect for CentrifugalRainbow {
    fn name(&self) -> &'static str {
        "Centrifugal Rainbow"
    }

    fn render(&mut self, motion: &MotionSample, _: &SpectrumReader, frame: &mut PixelFrame) {
        advance_hue(&mut self.hue, motion.gyro_z.abs() / 500.0);
        let base = self.hue as u8;
        for led in 0..frame.led_count() {
            frame.set(led, hsv_to_rgb(base.wrapping_add((led * 6) as u8)));
        }
    }
}

/// Cyan whose brightness follows spin speed.
#[derive(Debug, Default)]
pub struct FlowTrail;

impl Effect for FlowTrail {
    fn name(&self) -> &'static str {
        "Flow Trail"
    }

    fn render(&mut self, motion: &MotionSample, _: &SpectrumReader, frame: &mut PixelFrame) {
        let level = (motion.gyro_z.abs() / 4.0).min(255.0) as u8;
        frame.fill(Rgb::new(0, level, level));
    }
}

/// Gravity-direction hue with a slight gradient along the strip.
#[derive(Debug, Default)]
pub struct GravityCompass;

impl Effect for GravityCompass {
    fn name(&self) -> &'static str {
        "Gravity Compass"
    }

    fn render(&mut self, motion: &MotionSample, _: &SpectrumReader, frame: &mut PixelFrame) {
        let hue = (motion.tilt_angle() * 255.0) as u8;
        for led in 0..frame.led_count() {
            frame.set(led, hsv_to_rgb(hue.wrapping_add(led as u8)));
        }
    }
}

/// Flowing gradient that speeds up and brightens with smoothed angular velocity.
#[derive(Debug, Default)]
pub struct VelocityPrism {
    velocity: f32,
    hue_offset: f32,
}

impl Effect for VelocityPrism {
    fn name(&self) -> &'static str {
        "Velocity Prism"
    }

    fn render(&mut self, motion: &MotionSample, _: &SpectrumReader, frame: &mut PixelFrame) {
        self.velocity = self.velocity * 0.9 + motion.gyro_magnitude() * 0.1;
        let hue_base = (self.velocity / 50.0).min(255.0);
        advance_hue(&mut self.hue_offset, 0.2 + hue_base * 0.05);
        let brightness = clamp_brightness(0.4 + (self.velocity / 1000.0).min(0.6));

        let count = frame.led_count();
        for led in 0..count {
            let hue = wrap_hue(hue_base + led_position(led, count) * 50.0 + self.hue_offset);
            frame.set(led, hsv_to_rgb(hue).scale(brightness));
        }
    }
}

/// White strobe that gets brighter the faster the poi spins.
#[derive(Debug, Default)]
pub struct WarpSpeed;

impl Effect for WarpSpeed {
    fn name(&self) -> &'static str {
        "Warp Speed"
    }

    fn render(&mut self, motion: &MotionSample, _: &SpectrumReader, frame: &mut PixelFrame) {
        let flash = (motion.gyro_z.abs() / 5.0).min(255.0) as u8;
        frame.fill(Rgb::new(flash, flash, flash));
    }
}

/// Warm and cold halves separated by a blend zone that follows tilt.
#[derive(Debug, Default)]
pub struct FireIceSplit;

impl FireIceSplit {
    const BLEND_WIDTH: f32 = 0.3;
}

impl Effect for FireIceSplit {
    fn name(&self) -> &'static str {
        "Fire/Ice Split"
    }

    fn render(&mut self, motion: &MotionSample, _: &SpectrumReader, frame: &mut PixelFrame) {
        let split = (motion.accel_y + 1.0) / 2.0;
        let blend_start = split - Self::BLEND_WIDTH / 2.0;

        let count = frame.led_count();
        for led in 0..count {
            let pos = led_position(led, count);
            let fire_share = ((pos - blend_start) / Self::BLEND_WIDTH).clamp(0.0, 1.0);
            let fire = hsv_to_rgb((pos * 40.0) as u8);
            let ice = hsv_to_rgb((180.0 + (1.0 - pos) * 40.0) as u8);
            frame.set(led, ice.blend(fire, fire_share));
        }
    }
}

/// Bright band around a smoothed horizon line set by the Z axis.
#[derive(Debug)]
pub struct ShiftingHorizon {
    hue_offset: f32,
    horizon: f32,
}

impl Default for ShiftingHorizon {
    fn default() -> Self {
        Self {
            hue_offset: 0.0,
            horizon: 0.5,
        }
    }
}

impl Effect for ShiftingHorizon {
    fn name(&self) -> &'static str {
        "Shifting Horizon"
    }

    fn render(&mut self, motion: &MotionSample, _: &SpectrumReader, frame: &mut PixelFrame) {
        let target = (motion.accel_z + 1.0) / 2.0;
        self.horizon = self.horizon * 0.9 + target * 0.1;
        advance_hue(&mut self.hue_offset, 0.08);

        let count = frame.led_count();
        for led in 0..count {
            let pos = led_position(led, count);
            let proximity = falloff(pos - self.horizon, 0.25);
            let hue = wrap_hue(self.hue_offset + pos * 120.0);
            frame.set(led, hsv_to_rgb(hue).scale(clamp_brightness(0.2 + proximity * 0.8)));
        }
    }
}

/// One white LED that rolls along the strip with gravity.
#[derive(Debug, Default)]
pub struct GravityBall;

impl GravityBall {
    /// Position of the ball for a Y-axis reading, in LED units.
    ///
    /// Readings above 10 in magnitude are taken to be milli-g.
    pub fn ball_index(accel_y: f32, led_count: usize) -> Option<usize> {
        let ay = if accel_y.abs() > 10.0 { accel_y / 1000.0 } else { accel_y };
        let pos = (ay.clamp(-1.0, 1.0) + 1.0) / 2.0;
        let index = (pos * led_count as f32 - 1.0).max(0.0) as usize;
        (index < led_count).then_some(index)
    }
}

impl Effect for GravityBall {
    fn name(&self) -> &'static str {
        "Gravity Ball"
    }

    fn render(&mut self, motion: &MotionSample, _: &SpectrumReader, frame: &mut PixelFrame) {
        frame.clear();
        if let Some(led) = Self::ball_index(motion.accel_y, frame.led_count()) {
            frame.set(led, Rgb::WHITE);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::spectrum::SpectrumBuffer;

    fn reader() -> SpectrumReader {
        SpectrumBuffer::new(16).reader(Duration::from_millis(10))
    }

    fn spin(gyro_z: f32) -> MotionSample {
        MotionSample {
            gyro_z,
            ..MotionSample::default()
        }
    }

    #[test]
    fn spin_fire_has_a_visible_floor_and_saturates() {
        let mut frame = PixelFrame::new(3);
        SpinFire.render(&spin(0.0), &reader(), &mut frame);
        assert_eq!(frame.get(0), Some(Rgb::new(40, 13, 0)));

        SpinFire.render(&spin(-4000.0), &reader(), &mut frame);
        assert_eq!(frame.get(2), Some(Rgb::new(255, 85, 0)));
    }

    #[test]
    fn gravity_rainbow_follows_tilt() {
        let mut frame = PixelFrame::new(4);
        let pointing = MotionSample {
            accel_x: -1.0,
            ..MotionSample::default()
        };
        GravityRainbow.render(&pointing, &reader(), &mut frame);
        assert!((0..4).all(|led| frame.get(led) == Some(hsv_to_rgb(255))));
    }

    #[test]
    fn centrifugal_rainbow_only_moves_while_spinning() {
        let mut effect = CentrifugalRainbow::default();
        let mut still = PixelFrame::new(21);
        effect.render(&spin(0.0), &reader(), &mut still);
        let mut again = PixelFrame::new(21);
        effect.render(&spin(0.0), &reader(), &mut again);
        assert_eq!(still, again);

        effect.render(&spin(5000.0), &reader(), &mut again);
        assert_ne!(still, again);
        assert_eq!(still.get(1), Some(hsv_to_rgb(6)));
    }

    #[test]
    fn fire_ice_split_moves_with_tilt() {
        let mut frame = PixelFrame::new(21);
        let tilted = |accel_y| MotionSample {
            accel_y,
            ..MotionSample::default()
        };

        // Split at the top: everything below is ice.
        FireIceSplit.render(&tilted(1.0), &reader(), &mut frame);
        assert_eq!(frame.get(0), Some(hsv_to_rgb(220)));

        // Split at the bottom: everything above is fire.
        FireIceSplit.render(&tilted(-1.0), &reader(), &mut frame);
        assert_eq!(frame.get(20), Some(hsv_to_rgb(40)));
    }

    #[test]
    fn shifting_horizon_is_brightest_near_the_line() {
        let mut effect = ShiftingHorizon::default();
        let mut frame = PixelFrame::new(21);
        effect.render(&MotionSample::default(), &reader(), &mut frame);

        let level = |c: Rgb| u16::from(c.r) + u16::from(c.g) + u16::from(c.b);
        let middle = level(frame.get(10).unwrap());
        let edge = level(frame.get(0).unwrap());
        assert!(middle > edge);
        assert!(edge > 0);
    }

    #[test]
    fn gravity_ball_lights_exactly_one_led() {
        assert_eq!(GravityBall::ball_index(-1.0, 21), Some(0));
        assert_eq!(GravityBall::ball_index(1.0, 21), Some(20));
        assert_eq!(GravityBall::ball_index(0.0, 21), Some(9));
        assert_eq!(GravityBall::ball_index(1000.0, 21), Some(20));
        assert_eq!(GravityBall::ball_index(0.0, 0), None);

        let mut frame = PixelFrame::new(21);
        frame.fill(Rgb::new(1, 1, 1));
        GravityBall.render(&spin(0.0), &reader(), &mut frame);
        let lit: Vec<_> = (0..21).filter(|led| frame.get(*led) != Some(Rgb::BLACK)).collect();
        assert_eq!(lit, vec![9]);
        assert_eq!(frame.get(9), Some(Rgb::WHITE));
    }

    #[test]
    fn velocity_prism_brightens_with_sustained_speed() {
        let mut effect = VelocityPrism::default();
        let mut frame = PixelFrame::new(21);
        effect.render(&spin(0.0), &reader(), &mut frame);
        let calm = frame.get(0).unwrap();

        for _ in 0..50 {
            effect.render(&spin(6000.0), &reader(), &mut frame);
        }
        let fast = frame.get(0).unwrap();
        let level = |c: Rgb| u16::from(c.r) + u16::from(c.g) + u16::from(c.b);
        assert!(level(fast) > level(calm));
    }
}
