//! Block-based audio buffers and the post-processing chain.
//!
//! The scheduler hands each voice an [`AudioView`] starting at the voice's
//! sub-block offset, so a voice triggered mid-block writes only the samples
//! after its start frame.

/// A non-interleaved block of audio, one buffer per channel.
pub struct AudioBlock {
    sample_rate: f32,
    channels: Vec<Vec<f32>>,
}

impl AudioBlock {
    pub fn new(channels: usize, frames: usize, sample_rate: f32) -> Self {
        Self {
            sample_rate,
            channels: (0..channels).map(|_| vec![0.0; frames]).collect(),
        }
    }

    pub fn frames_per_buffer(&self) -> usize {
        self.channels.first().map(|c| c.len()).unwrap_or(0)
    }

    pub fn frames_per_second(&self) -> f32 {
        self.sample_rate
    }

    pub fn num_channels(&self) -> usize {
        self.channels.len()
    }

    pub fn channel(&self, index: usize) -> &[f32] {
        &self.channels[index]
    }

    pub fn channel_mut(&mut self, index: usize) -> &mut [f32] {
        &mut self.channels[index]
    }

    /// Zero all channels. Call once per callback before rendering voices.
    pub fn clear(&mut self) {
        for channel in &mut self.channels {
            channel.fill(0.0);
        }
    }

    /// Multiply every sample by `gain`.
    pub fn scale(&mut self, gain: f32) {
        if gain == 1.0 {
            return;
        }
        for channel in &mut self.channels {
            for sample in channel.iter_mut() {
                *sample *= gain;
            }
        }
    }

    /// A mutable view of all channels starting at `frame`.
    pub fn view_from(&mut self, frame: usize) -> AudioView<'_> {
        AudioView {
            start: frame,
            block: self,
        }
    }

    /// A view of the whole block.
    pub fn view(&mut self) -> AudioView<'_> {
        self.view_from(0)
    }
}

/// Borrowed window into an [`AudioBlock`], possibly offset into the block.
///
/// The view is an offset plus a borrow of the block, so taking one per
/// voice per block costs nothing. The render path must stay free of heap
/// allocation.
pub struct AudioView<'a> {
    block: &'a mut AudioBlock,
    start: usize,
}

impl AudioView<'_> {
    pub fn frames(&self) -> usize {
        self.block.frames_per_buffer().saturating_sub(self.start)
    }

    pub fn sample_rate(&self) -> f32 {
        self.block.sample_rate
    }

    pub fn num_channels(&self) -> usize {
        self.block.channels.len()
    }

    pub fn channel_mut(&mut self, index: usize) -> &mut [f32] {
        let channel = &mut self.block.channels[index];
        let start = self.start.min(channel.len());
        &mut channel[start..]
    }

    /// Add `value` to frame `frame` of every channel.
    pub fn add_to_all(&mut self, frame: usize, value: f32) {
        for channel in &mut self.block.channels {
            if let Some(sample) = channel.get_mut(self.start + frame) {
                *sample += value;
            }
        }
    }
}

/// A named stage in the scheduler's post-processing chain.
///
/// Processors run in order after all voices have rendered, on the full block.
/// Names are used to position processors relative to each other.
pub trait AudioProcessor: Send {
    fn name(&self) -> &str;
    fn process(&mut self, audio: &mut AudioBlock);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn view_from_offsets_all_channels() {
        let mut block = AudioBlock::new(2, 8, 48_000.0);
        let mut view = block.view_from(6);
        assert_eq!(view.frames(), 2);
        view.add_to_all(0, 1.0);
        assert_eq!(block.channel(0)[6], 1.0);
        assert_eq!(block.channel(1)[6], 1.0);
        assert_eq!(block.channel(0)[5], 0.0);
    }

    #[test]
    fn view_from_past_end_is_empty() {
        let mut block = AudioBlock::new(1, 4, 48_000.0);
        assert_eq!(block.view_from(10).frames(), 0);
    }

    #[test]
    fn scale_applies_gain() {
        let mut block = AudioBlock::new(1, 2, 48_000.0);
        block.channel_mut(0).fill(0.5);
        block.scale(2.0);
        assert_eq!(block.channel(0), &[1.0, 1.0]);
    }
}
