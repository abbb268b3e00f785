use std::borrow::Cow;
use std::time::Duration;

/// Number of blocks needed to cover `len` samples: one per step position
/// inside the signal.
pub fn frame_count(len: usize, step_size: usize) -> usize {
    len.div_ceil(step_size)
}

/// Timestamp of block `index`, computed from the sample position rather than
/// accumulated so that rounding errors do not build up.
pub fn frame_timestamp(
    start: Duration,
    index: usize,
    step_size: usize,
    sample_rate: f32,
) -> Duration {
    let samples = index as f64 * step_size as f64;
    start + Duration::from_secs_f64(samples / f64::from(sample_rate))
}

/// Blocks of `block_size` samples at `step_size` stride; the tail is
/// zero-padded.
pub struct Frames<'a> {
    signal: &'a [f32],
    block_size: usize,
    step_size: usize,
    index: usize,
    count: usize,
}

impl<'a> Frames<'a> {
    pub fn new(signal: &'a [f32], block_size: usize, step_size: usize) -> Self {
        Self {
            signal,
            block_size,
            step_size,
            index: 0,
            count: frame_count(signal.len(), step_size),
        }
    }
}

impl<'a> Iterator for Frames<'a> {
    type Item = Cow<'a, [f32]>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.index >= self.count {
            return None;
        }
        let start = self.index * self.step_size;
        self.index += 1;

        let end = start + self.block_size;
        if end <= self.signal.len() {
            return Some(Cow::Borrowed(&self.signal[start..end]));
        }
        let mut block = self.signal[start..].to_vec();
        block.resize(self.block_size, 0.0);
        Some(Cow::Owned(block))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.count - self.index;
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for Frames<'_> {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts() {
        assert_eq!(frame_count(44100, 512), 87);
        assert_eq!(frame_count(1024, 512), 2);
        assert_eq!(frame_count(1, 512), 1);
        assert_eq!(frame_count(0, 512), 0);
    }

    #[test]
    fn overlapping_frames_are_padded() {
        let signal = [1.0, 2.0, 3.0, 4.0, 5.0];
        let frames: Vec<Vec<f32>> = Frames::new(&signal, 4, 2).map(|f| f.into_owned()).collect();
        assert_eq!(
            frames,
            vec![
                vec![1.0, 2.0, 3.0, 4.0],
                vec![3.0, 4.0, 5.0, 0.0],
                vec![5.0, 0.0, 0.0, 0.0],
            ]
        );
    }

    #[test]
    fn full_frames_are_borrowed() {
        let signal = [0.0; 8];
        let mut frames = Frames::new(&signal, 4, 4);
        assert_eq!(frames.len(), 2);
        assert!(matches!(frames.next(), Some(Cow::Borrowed(_))));
        assert!(matches!(frames.next(), Some(Cow::Borrowed(_))));
        assert!(frames.next().is_none());
    }

    #[test]
    fn step_larger_than_block() {
        let signal = [1.0, 2.0, 3.0, 4.0, 5.0];
        let frames: Vec<Vec<f32>> = Frames::new(&signal, 2, 3).map(|f| f.into_owned()).collect();
        assert_eq!(frames, vec![vec![1.0, 2.0], vec![4.0, 5.0]]);
    }

    #[test]
    fn timestamps() {
        assert_eq!(frame_timestamp(Duration::ZERO, 0, 512, 44100.0), Duration::ZERO);
        assert_eq!(
            frame_timestamp(Duration::from_secs(1), 2, 50, 100.0),
            Duration::from_secs(2)
        );
    }
}
