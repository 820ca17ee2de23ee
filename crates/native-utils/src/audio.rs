use rubato::{FastFixedIn, PolynomialDegree, Resampler};

pub const RECOGNITION_PCM16_SAMPLE_RATE: f64 = 16000.0;

/// Creates a resampler to convert between audio sample rates.
pub fn create_resampler(
    in_sampling_rate: f64,
    out_sampling_rate: f64,
    chunk_size: usize,
) -> anyhow::Result<FastFixedIn<f32>> {
    let resampler = FastFixedIn::<f32>::new(
        out_sampling_rate / in_sampling_rate,
        1.0,
        PolynomialDegree::Cubic,
        chunk_size,
        1,
    )?;
    Ok(resampler)
}

/// Averages interleaved samples down to one channel.
pub fn mix_to_mono(interleaved: &[f32], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return interleaved.to_vec();
    }
    interleaved
        .chunks_exact(channels)
        .map(|frame| frame.iter().sum::<f32>() / channels as f32)
        .collect()
}

/// Converts a slice of f32 samples to a vector of i16 samples.
pub fn convert_f32_to_i16(pcm32: &[f32]) -> Vec<i16> {
    pcm32
        .iter()
        .map(|&sample| (sample * i16::MAX as f32).clamp(i16::MIN as f32, i16::MAX as f32) as i16)
        .collect()
}

/// Turns mono device audio into fixed-size 16-bit frames at the recognition rate.
///
/// Input arrives in whatever block sizes the device callback delivers; the
/// resampler needs fixed input chunks, so both sides are buffered.
pub struct PcmFramer {
    resampler: Option<FastFixedIn<f32>>,
    pending_in: Vec<f32>,
    pending_out: Vec<f32>,
    frame_size: usize,
}

impl PcmFramer {
    pub fn new(in_sampling_rate: f64, frame_size: usize) -> anyhow::Result<Self> {
        let resampler = if (in_sampling_rate - RECOGNITION_PCM16_SAMPLE_RATE).abs() < f64::EPSILON
        {
            None
        } else {
            // Ten milliseconds of device audio per resampler call.
            let chunk_size = (in_sampling_rate / 100.0).round().max(1.0) as usize;
            Some(create_resampler(
                in_sampling_rate,
                RECOGNITION_PCM16_SAMPLE_RATE,
                chunk_size,
            )?)
        };
        Ok(Self {
            resampler,
            pending_in: Vec::new(),
            pending_out: Vec::with_capacity(frame_size * 2),
            frame_size,
        })
    }

    /// Feeds mono samples and returns every frame that is now complete.
    pub fn push(&mut self, mono: &[f32]) -> anyhow::Result<Vec<Vec<i16>>> {
        match &mut self.resampler {
            None => self.pending_out.extend_from_slice(mono),
            Some(resampler) => {
                self.pending_in.extend_from_slice(mono);
                loop {
                    let needed = resampler.input_frames_next();
                    if self.pending_in.len() < needed {
                        break;
                    }
                    let chunk: Vec<f32> = self.pending_in.drain(..needed).collect();
                    let mut out = resampler.process(&[chunk], None)?;
                    if let Some(channel) = out.pop() {
                        self.pending_out.extend(channel);
                    }
                }
            }
        }

        let mut frames = Vec::new();
        while self.pending_out.len() >= self.frame_size {
            let frame: Vec<f32> = self.pending_out.drain(..self.frame_size).collect();
            frames.push(convert_f32_to_i16(&frame));
        }
        Ok(frames)
    }
}
