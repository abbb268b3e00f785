//! Time to frequency domain conversion for frequency-domain plugins.

use std::f32::consts::PI;
use std::sync::Arc;

use rustfft::num_complex::Complex;
use rustfft::{Fft, FftPlanner};

/// Windowed forward FFT of one block, planned once per block size.
pub struct Spectrum {
    fft: Arc<dyn Fft<f32>>,
    window: Vec<f32>,
    buffer: Vec<Complex<f32>>,
    scratch: Vec<Complex<f32>>,
}

/// Symmetric Hann window of length `size`: both ends are zero and a window
/// of length 1 is `[1.0]`.
pub fn hann(size: usize) -> Vec<f32> {
    if size == 1 {
        return vec![1.0];
    }
    let denominator = (size - 1) as f32;
    (0..size)
        .map(|i| 0.5 * (1.0 - (2.0 * PI * i as f32 / denominator).cos()))
        .collect()
}

impl Spectrum {
    pub fn new(block_size: usize) -> Self {
        let fft = FftPlanner::new().plan_fft_forward(block_size);
        let scratch = vec![Complex::default(); fft.get_inplace_scratch_len()];
        Self {
            fft,
            window: hann(block_size),
            buffer: Vec::with_capacity(block_size),
            scratch,
        }
    }

    pub fn block_size(&self) -> usize {
        self.window.len()
    }

    /// Bins `0..=block_size / 2` of the windowed block as interleaved re/im
    /// pairs, the layout frequency-domain plugins receive.
    pub fn transform(&mut self, block: &[f32]) -> Vec<f32> {
        self.buffer.clear();
        self.buffer.extend(
            block
                .iter()
                .zip(&self.window)
                .map(|(&x, &w)| Complex::new(x * w, 0.0)),
        );
        self.buffer.resize(self.window.len(), Complex::default());
        self.fft
            .process_with_scratch(&mut self.buffer, &mut self.scratch);

        self.buffer[..self.window.len() / 2 + 1]
            .iter()
            .flat_map(|c| [c.re, c.im])
            .collect()
    }
}
