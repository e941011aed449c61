// Sample-rate conversion
//
// The session only sees the two traits below. `RubatoResampling` is the
// production binding: rubato's FFT resampler, which low-pass filters before
// decimating. `LinearResampling` is a cheap interpolator kept for tests and
// for callers that want deterministic, filter-free output.

use rubato::{FftFixedIn, Resampler as _};

use crate::codec::{EngineFailure, EngineResult};
use crate::types::SampleRate;

/// Input frames handed to rubato per FFT block
const RUBATO_CHUNK_SIZE: usize = 1024;

/// Creates resamplers for a fixed (input rate, output rate) pair
pub trait ResamplerFactory {
    type Resampler: Resampler;

    fn allocate(&self, from: SampleRate, to: SampleRate) -> EngineResult<Self::Resampler>;
}

/// Stateful converter between two sample rates
pub trait Resampler {
    /// Convert the next stretch of input. Some output may be held back
    /// until more input arrives or [`Resampler::flush`] is called.
    fn process(&mut self, input: &[i16]) -> EngineResult<Vec<i16>>;

    /// Emit everything still held back and start over with a clean state.
    ///
    /// Across a whole stream the output holds `input × to / from` samples,
    /// rounded to the nearest sample.
    fn flush(&mut self) -> EngineResult<Vec<i16>>;

    /// Independent copy that continues the stream exactly like `self`
    fn try_clone(&self) -> EngineResult<Self>
    where
        Self: Sized;
}

impl<F: ResamplerFactory + ?Sized> ResamplerFactory for &F {
    type Resampler = F::Resampler;

    fn allocate(&self, from: SampleRate, to: SampleRate) -> EngineResult<Self::Resampler> {
        (**self).allocate(from, to)
    }
}

/// Output samples a stream of `consumed` input samples converts to
fn expected_output(consumed: u64, from: SampleRate, to: SampleRate) -> u64 {
    let (from, to) = (from.hz() as u64, to.hz() as u64);
    (consumed * to + from / 2) / from
}

fn to_sample(value: f64) -> i16 {
    value.round().clamp(i16::MIN as f64, i16::MAX as f64) as i16
}

fn identity_failure(from: SampleRate, to: SampleRate) -> EngineFailure {
    EngineFailure::new(format!("no conversion needed for {} -> {}", from, to))
}

/// Factory for [`RubatoResampler`]
#[derive(Debug, Default, Clone, Copy)]
pub struct RubatoResampling;

impl ResamplerFactory for RubatoResampling {
    type Resampler = RubatoResampler;

    fn allocate(&self, from: SampleRate, to: SampleRate) -> EngineResult<RubatoResampler> {
        if from == to {
            return Err(identity_failure(from, to));
        }
        RubatoResampler::new(from, to)
    }
}

/// Mono FFT resampler on top of `rubato::FftFixedIn`.
///
/// rubato consumes fixed-size blocks, so input is queued until a block is
/// full. The leading `output_delay` samples rubato produces are dropped, and
/// `flush` pushes silence through until the delayed tail is out.
pub struct RubatoResampler {
    input_rate: SampleRate,
    output_rate: SampleRate,
    inner: FftFixedIn<f32>,
    /// Input waiting for a full block
    pending: Vec<f32>,
    /// Last block fed to `inner`; its overlap is all the state rubato keeps
    last_block: Vec<f32>,
    delay_left: usize,
    consumed: u64,
    produced: u64,
}

impl RubatoResampler {
    pub fn new(input_rate: SampleRate, output_rate: SampleRate) -> EngineResult<Self> {
        let inner = Self::build(input_rate, output_rate)?;
        Ok(Self {
            input_rate,
            output_rate,
            delay_left: inner.output_delay(),
            inner,
            pending: Vec::new(),
            last_block: Vec::new(),
            consumed: 0,
            produced: 0,
        })
    }

    fn build(input_rate: SampleRate, output_rate: SampleRate) -> EngineResult<FftFixedIn<f32>> {
        // One sub-chunk: the FFT block is exactly the input block
        FftFixedIn::<f32>::new(
            input_rate.hz() as usize,
            output_rate.hz() as usize,
            RUBATO_CHUNK_SIZE,
            1,
            1,
        )
        .map_err(|e| EngineFailure::new(format!("rubato setup failed: {}", e)))
    }

    pub fn input_rate(&self) -> SampleRate {
        self.input_rate
    }

    pub fn output_rate(&self) -> SampleRate {
        self.output_rate
    }

    fn emit(&mut self, resampled: &[Vec<f32>], limit: Option<u64>, output: &mut Vec<i16>) {
        let Some(channel) = resampled.first() else {
            return;
        };
        for &value in channel {
            if self.delay_left > 0 {
                self.delay_left -= 1;
                continue;
            }
            if limit.is_some_and(|limit| self.produced >= limit) {
                break;
            }
            output.push(to_sample(value as f64));
            self.produced += 1;
        }
    }
}

fn rubato_failure(err: rubato::ResampleError) -> EngineFailure {
    EngineFailure::new(format!("rubato failed: {}", err))
}

impl Resampler for RubatoResampler {
    fn process(&mut self, input: &[i16]) -> EngineResult<Vec<i16>> {
        self.consumed += input.len() as u64;
        self.pending.extend(input.iter().map(|&s| s as f32));

        let mut output = Vec::new();
        loop {
            let needed = self.inner.input_frames_next();
            if self.pending.len() < needed {
                break;
            }
            let block: Vec<f32> = self.pending.drain(..needed).collect();
            let resampled = self
                .inner
                .process(&[block.as_slice()], None)
                .map_err(rubato_failure)?;
            self.emit(&resampled, None, &mut output);
            self.last_block = block;
        }
        Ok(output)
    }

    fn flush(&mut self) -> EngineResult<Vec<i16>> {
        let expected = expected_output(self.consumed, self.input_rate, self.output_rate);
        let mut rest = std::mem::take(&mut self.pending);
        let mut output = Vec::new();

        while self.produced < expected {
            let resampled = if rest.is_empty() {
                self.inner.process_partial(None::<&[&[f32]]>, None)
            } else {
                let input = [rest.as_slice()];
                let result = self.inner.process_partial(Some(&input[..]), None);
                rest.clear();
                result
            }
            .map_err(rubato_failure)?;
            self.emit(&resampled, Some(expected), &mut output);
        }

        *self = Self::new(self.input_rate, self.output_rate)?;
        Ok(output)
    }

    fn try_clone(&self) -> EngineResult<Self> {
        let mut inner = Self::build(self.input_rate, self.output_rate)?;
        // Replaying the last block rebuilds the overlap bit for bit
        if !self.last_block.is_empty() {
            inner
                .process(&[self.last_block.as_slice()], None)
                .map_err(rubato_failure)?;
        }
        Ok(Self {
            input_rate: self.input_rate,
            output_rate: self.output_rate,
            inner,
            pending: self.pending.clone(),
            last_block: self.last_block.clone(),
            delay_left: self.delay_left,
            consumed: self.consumed,
            produced: self.produced,
        })
    }
}

/// Factory for [`LinearResampler`]
#[derive(Debug, Default, Clone, Copy)]
pub struct LinearResampling;

impl ResamplerFactory for LinearResampling {
    type Resampler = LinearResampler;

    fn allocate(&self, from: SampleRate, to: SampleRate) -> EngineResult<LinearResampler> {
        if from == to {
            return Err(identity_failure(from, to));
        }
        Ok(LinearResampler::new(from, to))
    }
}

/// Linear interpolation resampler
#[derive(Debug, Clone)]
pub struct LinearResampler {
    input_rate: SampleRate,
    output_rate: SampleRate,
    /// Input samples advanced per output sample
    step: f64,
    /// Last sample of the previous call
    history: Option<i16>,
    /// Read position relative to `history` (or to the first sample if none)
    position: f64,
    consumed: u64,
    produced: u64,
}

impl LinearResampler {
    pub fn new(input_rate: SampleRate, output_rate: SampleRate) -> Self {
        Self {
            input_rate,
            output_rate,
            step: input_rate.hz() as f64 / output_rate.hz() as f64,
            history: None,
            position: 0.0,
            consumed: 0,
            produced: 0,
        }
    }

    pub fn input_rate(&self) -> SampleRate {
        self.input_rate
    }

    pub fn output_rate(&self) -> SampleRate {
        self.output_rate
    }

    pub fn reset(&mut self) {
        self.history = None;
        self.position = 0.0;
        self.consumed = 0;
        self.produced = 0;
    }
}

impl Resampler for LinearResampler {
    fn process(&mut self, input: &[i16]) -> EngineResult<Vec<i16>> {
        if input.is_empty() {
            return Ok(Vec::new());
        }
        self.consumed += input.len() as u64;

        let mut combined = Vec::with_capacity(input.len() + 1);
        combined.extend(self.history);
        combined.extend_from_slice(input);

        let last = (combined.len() - 1) as f64;
        let mut output = Vec::with_capacity((input.len() as f64 / self.step) as usize + 1);

        while self.position < last {
            let index = self.position.floor() as usize;
            let frac = self.position - index as f64;
            let s0 = combined[index] as f64;
            let s1 = combined[index + 1] as f64;
            output.push(to_sample(s0 + (s1 - s0) * frac));
            self.position += self.step;
        }

        // The last sample becomes the next call's history at position 0
        self.position -= last;
        self.history = combined.last().copied();
        self.produced += output.len() as u64;

        Ok(output)
    }

    /// Holds the last input sample for the positions past the end
    fn flush(&mut self) -> EngineResult<Vec<i16>> {
        let expected = expected_output(self.consumed, self.input_rate, self.output_rate);
        let missing = expected.saturating_sub(self.produced) as usize;
        let output = vec![self.history.unwrap_or(0); missing];
        self.reset();
        Ok(output)
    }

    fn try_clone(&self) -> EngineResult<Self> {
        Ok(self.clone())
    }
}
