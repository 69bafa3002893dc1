use crate::effects::color::Rgb;

pub const BYTES_PER_PIXEL: usize = 3;

/// One complete LED colour assignment for a strip, packed as R, G, B bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PixelFrame {
    bytes: Vec<u8>,
}

impl PixelFrame {
    /// Creates an all-dark frame for `led_count` LEDs.
    pub fn new(led_count: usize) -> Self {
        Self {
            bytes: vec![0; led_count * BYTES_PER_PIXEL],
        }
    }

    pub fn led_count(&self) -> usize {
        self.bytes.len() / BYTES_PER_PIXEL
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn set(&mut self, led: usize, color: Rgb) {
        let start = led * BYTES_PER_PIXEL;
        if let Some(px) = self.bytes.get_mut(start..start + BYTES_PER_PIXEL) {
            px.copy_from_slice(&[color.r, color.g, color.b]);
        }
    }

    pub fn get(&self, led: usize) -> Option<Rgb> {
        let start = led * BYTES_PER_PIXEL;
        self.bytes
            .get(start..start + BYTES_PER_PIXEL)
            .map(|px| Rgb::new(px[0], px[1], px[2]))
    }

    pub fn fill(&mut self, color: Rgb) {
        for px in self.bytes.chunks_exact_mut(BYTES_PER_PIXEL) {
            px.copy_from_slice(&[color.r, color.g, color.b]);
        }
    }

    pub fn clear(&mut self) {
        self.bytes.fill(0);
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        &mut self.bytes
    }
}
