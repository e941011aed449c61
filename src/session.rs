// Encoding session: drives WAV/PCM input through resampling, the codec and
// the Ogg packetizer.

use std::path::Path;

use tracing::{debug, warn};

use crate::codec::{CodecEngine, EngineFailure, FrameEncoder};
use crate::error::{Error, Result};
use crate::ogg::speex::{CommentHeader, SpeexHeader};
use crate::ogg::OggPacketizer;
use crate::resample::{Resampler, ResamplerFactory, RubatoResampling};
use crate::types::{EncodingSessionConfig, SampleRate, SpeexMode};
use crate::wav::parse_wav;

/// One Speex-in-Ogg encoding session.
///
/// Owns exactly one encoder state and at most one resampler. Calls must be
/// serialized by the caller; independent sessions share nothing.
///
/// Audio that does not fill a whole frame is held until the next call.
/// [`SpeexEncoder::finish`] flushes the resampler, zero-pads the last partial
/// frame and closes the stream, so a session that is never finished loses
/// its final fraction of a frame.
///
/// ```no_run
/// # #[cfg(feature = "native-speex")]
/// # fn demo() -> speexogg::Result<()> {
/// use speexogg::{NativeSpeex, SampleRate, SpeexEncoder, SpeexMode};
///
/// let mut encoder = SpeexEncoder::with_mode(NativeSpeex, SpeexMode::Wideband, 5, SampleRate::Hz16000)?;
/// let mut ogg = encoder.encode_audio(&vec![0i16; 16000], SampleRate::Hz16000)?;
/// ogg.extend(encoder.finish()?);
/// assert!(!ogg.is_empty());
/// # Ok(())
/// # }
/// ```
pub struct SpeexEncoder<E: CodecEngine, F: ResamplerFactory = RubatoResampling> {
    config: EncodingSessionConfig,
    encoder: E::Encoder,
    resampling: F,
    resampler: Option<(SampleRate, F::Resampler)>,
    /// Output-rate samples short of a whole frame
    pending: Vec<i16>,
    frame_size: usize,
    bitrate: i32,
    packetizer: Option<OggPacketizer>,
    frames_encoded: u64,
    finished: bool,
}

/// Resampler state as it would stand after the call succeeds
type StagedResampler<R> = Option<(SampleRate, R)>;

impl<E: CodecEngine> SpeexEncoder<E, RubatoResampling> {
    /// Create a session using rubato for sample-rate conversion
    pub fn new(engine: E, config: EncodingSessionConfig) -> Result<Self> {
        Self::with_resampler(engine, RubatoResampling, config)
    }

    pub fn with_mode(
        engine: E,
        mode: SpeexMode,
        quality: i32,
        output_sample_rate: SampleRate,
    ) -> Result<Self> {
        Self::new(engine, EncodingSessionConfig::new(mode, quality, output_sample_rate))
    }
}

impl<E: CodecEngine, F: ResamplerFactory> SpeexEncoder<E, F> {
    /// Create a session with a caller-supplied resampler binding.
    ///
    /// The encoder state is allocated here and released on every error path.
    pub fn with_resampler(engine: E, resampling: F, config: EncodingSessionConfig) -> Result<Self> {
        if !(1..=255).contains(&config.max_frames_per_page) {
            return Err(Error::InvalidFramesPerPage(config.max_frames_per_page));
        }

        let mut encoder = engine.allocate(config.mode).map_err(|e| {
            warn!(reason = %e, mode = %config.mode, "encoder allocation failed");
            Error::CouldNotAllocateEncoderState
        })?;

        let frame_size = encoder.frame_size().map_err(|e| {
            warn!(reason = %e, "frame size query failed");
            Error::CouldNotObtainFrameSize
        })?;
        encoder.bitrate().map_err(|e| {
            warn!(reason = %e, "bitrate query failed");
            Error::CouldNotObtainBitrate
        })?;

        encoder.set_quality(config.quality).map_err(|e| {
            warn!(reason = %e, quality = config.quality, "quality rejected");
            Error::CouldNotSetQuality(config.quality)
        })?;
        // Bitrate follows the quality setting
        let bitrate = encoder.bitrate().map_err(|_| Error::CouldNotObtainBitrate)?;

        debug!(
            mode = %config.mode,
            quality = config.quality,
            output_rate = config.output_sample_rate.hz(),
            frame_size,
            bitrate,
            "speex encoding session created"
        );

        Ok(Self {
            config,
            encoder,
            resampling,
            resampler: None,
            pending: Vec::new(),
            frame_size,
            bitrate,
            packetizer: None,
            frames_encoded: 0,
            finished: false,
        })
    }

    pub fn config(&self) -> &EncodingSessionConfig {
        &self.config
    }

    pub fn mode(&self) -> SpeexMode {
        self.config.mode
    }

    pub fn quality(&self) -> i32 {
        self.config.quality
    }

    pub fn output_sample_rate(&self) -> SampleRate {
        self.config.output_sample_rate
    }

    /// Samples per codec frame
    pub fn frame_size(&self) -> usize {
        self.frame_size
    }

    pub fn bitrate(&self) -> i32 {
        self.bitrate
    }

    /// Frames encoded by successful calls so far
    pub fn frames_encoded(&self) -> u64 {
        self.frames_encoded
    }

    /// Output-rate samples waiting for the rest of their frame
    pub fn pending_samples(&self) -> usize {
        self.pending.len()
    }

    /// Input rate of the live resampler, if one was created
    pub fn resampler_input_rate(&self) -> Option<SampleRate> {
        self.resampler.as_ref().map(|(rate, _)| *rate)
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Emit the identification and comment headers ahead of any audio.
    ///
    /// Returns an empty buffer when the headers already went out. A resampler
    /// for `sample_rate` is prepared if it differs from the output rate and
    /// none is live yet.
    pub fn start_encoding(&mut self, sample_rate: SampleRate) -> Result<Vec<u8>> {
        if self.finished {
            return Err(Error::StreamFinished);
        }

        let mut packetizer = self.staged_packetizer()?;
        let resampler = match self.resampler {
            None if sample_rate != self.config.output_sample_rate => {
                Some((sample_rate, self.allocate_resampler(sample_rate)?))
            }
            _ => None,
        };

        let mut out = Vec::new();
        packetizer.write_headers(&mut out)?;

        self.packetizer = Some(packetizer);
        if resampler.is_some() {
            self.resampler = resampler;
        }
        Ok(out)
    }

    /// Encode `samples` recorded at `sample_rate`.
    ///
    /// The returned bytes continue the session's Ogg stream: headers first if
    /// none were emitted yet, then data pages for every whole frame available.
    /// A trailing partial frame is held back for the next call or `finish`.
    /// On error nothing is returned and the session is left as it was, so
    /// the call can be retried.
    pub fn encode_audio(&mut self, samples: &[i16], sample_rate: SampleRate) -> Result<Vec<u8>> {
        if self.finished {
            return Err(Error::StreamFinished);
        }

        let mut packetizer = self.staged_packetizer()?;
        let (mut pcm, resampler) = self.stage_input(samples, sample_rate)?;

        let whole = pcm.len() - pcm.len() % self.frame_size;
        let rest = pcm.split_off(whole);
        let frames = self.encode_frames(&pcm)?;

        let mut out = Vec::new();
        let pages = packetizer.write_frames(&frames, self.frame_size as u64, &mut out)?;

        self.packetizer = Some(packetizer);
        self.resampler = resampler;
        self.pending = rest;
        self.frames_encoded += frames.len() as u64;

        debug!(
            input_samples = samples.len(),
            input_rate = sample_rate.hz(),
            frames = frames.len(),
            pending = self.pending.len(),
            pages,
            bytes = out.len(),
            "encoded audio chunk"
        );
        Ok(out)
    }

    /// Parse a WAV buffer and encode its samples at the rate it declares
    pub fn encode_wav(&mut self, wav: &[u8]) -> Result<Vec<u8>> {
        let audio = parse_wav(wav)?;
        self.encode_audio(&audio.samples, audio.format.sample_rate)
    }

    /// Read a WAV file from disk and encode it like [`SpeexEncoder::encode_wav`]
    pub fn encode_wav_file(&mut self, path: impl AsRef<Path>) -> Result<Vec<u8>> {
        let path = path.as_ref();
        let wav = std::fs::read(path)?;
        debug!(path = %path.display(), bytes = wav.len(), "read WAV file");
        self.encode_wav(&wav)
    }

    /// Close the stream.
    ///
    /// Drains the resampler, encodes the held-back samples as a last
    /// zero-padded frame and appends the end-of-stream page. The final
    /// granule position counts real samples only. Headers are written first
    /// if nothing was emitted yet. Further audio is rejected afterwards.
    pub fn finish(&mut self) -> Result<Vec<u8>> {
        if self.finished {
            return Err(Error::StreamFinished);
        }

        let mut packetizer = self.staged_packetizer()?;
        let mut pcm = self.pending.clone();
        if let Some((rate, mut resampler)) = self.staged_resampler()? {
            let tail = resampler
                .flush()
                .map_err(|e| self.resample_failed(rate, e))?;
            pcm.extend(tail);
        }

        let frame_size = self.frame_size;
        let padding = (frame_size - pcm.len() % frame_size) % frame_size;
        if padding > 0 {
            debug!(
                samples = pcm.len() % frame_size,
                frame_size, "zero-padding final partial frame"
            );
        }
        let frames = self.encode_frames(&pcm)?;

        let mut out = Vec::new();
        packetizer.write_final(&frames, frame_size as u64, padding as u64, &mut out)?;

        self.packetizer = Some(packetizer);
        self.resampler = None;
        self.pending.clear();
        self.frames_encoded += frames.len() as u64;
        self.finished = true;

        debug!(
            frames = frames.len(),
            padding,
            total_frames = self.frames_encoded,
            "stream finished"
        );
        Ok(out)
    }

    /// Encode `pcm` frame by frame; a short last frame is padded with zeros
    fn encode_frames(&mut self, pcm: &[i16]) -> Result<Vec<Vec<u8>>> {
        let frame_size = self.frame_size;
        let mut frames = Vec::with_capacity(pcm.len().div_ceil(frame_size));

        for (index, chunk) in pcm.chunks(frame_size).enumerate() {
            let result = if chunk.len() == frame_size {
                self.encoder.encode_frame(chunk)
            } else {
                let mut padded = chunk.to_vec();
                padded.resize(frame_size, 0);
                self.encoder.encode_frame(&padded)
            };

            let compressed = result.map_err(|e| {
                warn!(reason = %e, index, "frame encoding failed");
                Error::EncodeFrameFailed { index }
            })?;
            frames.push(compressed);
        }
        Ok(frames)
    }

    /// Output-rate audio for this call: held-back samples, then the old
    /// resampler's tail if the input rate changed, then `samples` converted.
    ///
    /// Works on a copy of the resampler; the session itself is untouched.
    fn stage_input(
        &self,
        samples: &[i16],
        sample_rate: SampleRate,
    ) -> Result<(Vec<i16>, StagedResampler<F::Resampler>)> {
        let mut pcm = self.pending.clone();

        let mut staged = match self.staged_resampler()? {
            Some((rate, mut old)) if rate != sample_rate => {
                let tail = old.flush().map_err(|e| self.resample_failed(rate, e))?;
                debug!(
                    from = rate.hz(),
                    to = sample_rate.hz(),
                    tail = tail.len(),
                    "input rate changed"
                );
                pcm.extend(tail);
                None
            }
            staged => staged,
        };

        if sample_rate == self.config.output_sample_rate {
            pcm.extend_from_slice(samples);
            return Ok((pcm, staged));
        }

        let mut resampler = match staged.take() {
            Some((_, resampler)) => resampler,
            None => self.allocate_resampler(sample_rate)?,
        };
        let converted = resampler
            .process(samples)
            .map_err(|e| self.resample_failed(sample_rate, e))?;
        pcm.extend(converted);
        Ok((pcm, Some((sample_rate, resampler))))
    }

    /// Copy of the packetizer to write into; the header is built on first use
    fn staged_packetizer(&self) -> Result<OggPacketizer> {
        if let Some(packetizer) = &self.packetizer {
            return Ok(packetizer.clone());
        }

        let header = SpeexHeader::new(
            self.config.output_sample_rate,
            self.config.mode,
            self.frame_size,
            self.bitrate,
        )?;
        let comment = CommentHeader::new(self.config.comments.clone());
        OggPacketizer::new(
            self.config.stream_serial,
            self.config.max_frames_per_page,
            &header,
            &comment,
        )
    }

    /// Copy of the live resampler to process into
    fn staged_resampler(&self) -> Result<StagedResampler<F::Resampler>> {
        match &self.resampler {
            Some((rate, resampler)) => {
                let copy = resampler
                    .try_clone()
                    .map_err(|e| self.setup_failed(*rate, e))?;
                Ok(Some((*rate, copy)))
            }
            None => Ok(None),
        }
    }

    fn allocate_resampler(&self, input_rate: SampleRate) -> Result<F::Resampler> {
        let output_rate = self.config.output_sample_rate;
        let resampler = self
            .resampling
            .allocate(input_rate, output_rate)
            .map_err(|e| self.setup_failed(input_rate, e))?;
        debug!(
            from = input_rate.hz(),
            to = output_rate.hz(),
            "created resampler"
        );
        Ok(resampler)
    }

    fn setup_failed(&self, input_rate: SampleRate, failure: EngineFailure) -> Error {
        warn!(reason = %failure, "resampler setup failed");
        Error::CouldNotSetupResampler {
            from: input_rate.hz(),
            to: self.config.output_sample_rate.hz(),
        }
    }

    fn resample_failed(&self, input_rate: SampleRate, failure: EngineFailure) -> Error {
        warn!(reason = %failure, "resampling failed");
        Error::ResampleFailed {
            from: input_rate.hz(),
            to: self.config.output_sample_rate.hz(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{EngineFailure, EngineResult};
    use crate::ogg::page::OggPage;
    use crate::resample::LinearResampler;
    use std::cell::{Cell, RefCell};
    use std::io::Cursor;
    use std::rc::Rc;

    #[derive(Default, Clone)]
    struct FakeEngine {
        live: Rc<Cell<usize>>,
        seen: Rc<RefCell<Vec<Vec<i16>>>>,
        fail_allocate: bool,
        fail_frame_size: bool,
        fail_bitrate: bool,
        fail_encode_at: Option<usize>,
        fail_next: Rc<Cell<bool>>,
        zero_frame_size: bool,
    }

    struct FakeEncoder {
        engine: FakeEngine,
        frame_size: usize,
        quality: i32,
        encoded: usize,
    }

    impl CodecEngine for FakeEngine {
        type Encoder = FakeEncoder;

        fn allocate(&self, mode: SpeexMode) -> EngineResult<FakeEncoder> {
            if self.fail_allocate {
                return Err(EngineFailure::new("out of memory"));
            }
            self.live.set(self.live.get() + 1);
            let frame_size = match mode {
                _ if self.zero_frame_size => 0,
                SpeexMode::Narrowband => 160,
                SpeexMode::Wideband => 320,
                SpeexMode::UltraWideband => 640,
            };
            Ok(FakeEncoder {
                engine: self.clone(),
                frame_size,
                quality: 8,
                encoded: 0,
            })
        }
    }

    impl FrameEncoder for FakeEncoder {
        fn set_quality(&mut self, quality: i32) -> EngineResult<()> {
            if !(0..=10).contains(&quality) {
                return Err(EngineFailure::new("quality out of range"));
            }
            self.quality = quality;
            Ok(())
        }

        fn frame_size(&self) -> EngineResult<usize> {
            if self.engine.fail_frame_size {
                return Err(EngineFailure::new("no frame size"));
            }
            Ok(self.frame_size)
        }

        fn bitrate(&self) -> EngineResult<i32> {
            if self.engine.fail_bitrate {
                return Err(EngineFailure::new("no bitrate"));
            }
            Ok(2000 * (self.quality + 1))
        }

        fn encode_frame(&mut self, pcm: &[i16]) -> EngineResult<Vec<u8>> {
            if self.engine.fail_next.replace(false) {
                return Err(EngineFailure::new("transient failure"));
            }
            if self.engine.fail_encode_at == Some(self.encoded) {
                self.encoded += 1;
                return Err(EngineFailure::new("encode failed"));
            }
            assert_eq!(pcm.len(), self.frame_size);
            self.engine.seen.borrow_mut().push(pcm.to_vec());
            let packet = vec![self.quality as u8, (self.encoded % 256) as u8, 0xAB];
            self.encoded += 1;
            Ok(packet)
        }
    }

    impl Drop for FakeEncoder {
        fn drop(&mut self) {
            self.engine.live.set(self.engine.live.get() - 1);
        }
    }

    #[derive(Default, Clone)]
    struct CountingResampling {
        created: Rc<Cell<usize>>,
        fail: bool,
    }

    impl ResamplerFactory for CountingResampling {
        type Resampler = LinearResampler;

        fn allocate(&self, from: SampleRate, to: SampleRate) -> EngineResult<LinearResampler> {
            if self.fail {
                return Err(EngineFailure::new("resampler unavailable"));
            }
            self.created.set(self.created.get() + 1);
            Ok(LinearResampler::new(from, to))
        }
    }

    fn linear_session(
        engine: &FakeEngine,
        resampling: &CountingResampling,
    ) -> SpeexEncoder<FakeEngine, CountingResampling> {
        SpeexEncoder::with_resampler(
            engine.clone(),
            resampling.clone(),
            EncodingSessionConfig::new(SpeexMode::Wideband, 5, SampleRate::Hz16000),
        )
        .unwrap()
    }

    fn wav_bytes(samples: &[i16], sample_rate: u32) -> Vec<u8> {
        let data_size = (samples.len() * 2) as u32;
        let mut wav = Vec::new();
        wav.extend_from_slice(b"RIFF");
        wav.extend_from_slice(&(36 + data_size).to_le_bytes());
        wav.extend_from_slice(b"WAVEfmt ");
        wav.extend_from_slice(&16u32.to_le_bytes());
        wav.extend_from_slice(&1u16.to_le_bytes());
        wav.extend_from_slice(&1u16.to_le_bytes());
        wav.extend_from_slice(&sample_rate.to_le_bytes());
        wav.extend_from_slice(&(sample_rate * 2).to_le_bytes());
        wav.extend_from_slice(&2u16.to_le_bytes());
        wav.extend_from_slice(&16u16.to_le_bytes());
        wav.extend_from_slice(b"data");
        wav.extend_from_slice(&data_size.to_le_bytes());
        for s in samples {
            wav.extend_from_slice(&s.to_le_bytes());
        }
        wav
    }

    fn session(engine: &FakeEngine) -> SpeexEncoder<FakeEngine> {
        SpeexEncoder::with_mode(engine.clone(), SpeexMode::Wideband, 5, SampleRate::Hz16000).unwrap()
    }

    fn pages(bytes: &[u8]) -> Vec<OggPage> {
        OggPage::read_all(&mut Cursor::new(bytes))
    }

    #[test]
    fn test_one_second_of_silence() {
        let engine = FakeEngine::default();
        let mut encoder = session(&engine);
        let out = encoder.encode_audio(&vec![0i16; 16000], SampleRate::Hz16000).unwrap();

        let pages = pages(&out);
        assert_eq!(pages.len(), 3);
        let header = SpeexHeader::parse(&pages[0].data).unwrap();
        assert_eq!(header.rate, 16000);
        assert_eq!(header.frame_size, 320);
        assert_eq!(header.bitrate, 12000);
        assert_eq!(pages[2].packets().len(), 50);
        assert_eq!(encoder.frames_encoded(), 50);
    }

    #[test]
    fn test_partial_frame_is_zero_padded() {
        let engine = FakeEngine::default();
        let mut encoder = session(&engine);
        let samples = vec![7i16; 320 + 100];
        let out = encoder.encode_audio(&samples, SampleRate::Hz16000).unwrap();
        assert_eq!(pages(&out)[2].packets().len(), 1);
        assert_eq!(encoder.pending_samples(), 100);
        assert_eq!(engine.seen.borrow().len(), 1);

        let end = pages(&encoder.finish().unwrap());
        assert_eq!(end.len(), 2);
        assert_eq!(end[0].packets().len(), 1);
        assert_eq!(end[0].header.granule_position, 420);
        assert_eq!(end[1].header.granule_position, 420);

        let seen = engine.seen.borrow();
        assert_eq!(seen.len(), 2);
        assert!(seen[1][..100].iter().all(|&s| s == 7));
        assert!(seen[1][100..].iter().all(|&s| s == 0));
    }

    #[test]
    fn test_small_chunks_fill_whole_frames() {
        let engine = FakeEngine::default();
        let mut encoder = session(&engine);

        let mut stream = Vec::new();
        for _ in 0..10 {
            stream.extend(encoder.encode_audio(&[1000; 100], SampleRate::Hz16000).unwrap());
        }
        assert_eq!(encoder.frames_encoded(), 3);
        assert_eq!(encoder.pending_samples(), 40);
        {
            let seen = engine.seen.borrow();
            assert_eq!(seen.len(), 3);
            assert!(seen.iter().flatten().all(|&s| s == 1000));
        }

        stream.extend(encoder.finish().unwrap());
        assert_eq!(encoder.frames_encoded(), 4);
        let seen = engine.seen.borrow();
        assert!(seen[3][..40].iter().all(|&s| s == 1000));
        assert!(seen[3][40..].iter().all(|&s| s == 0));

        let pages = pages(&stream);
        let data_frames: usize = pages[2..].iter().map(|p| p.packets().len()).sum();
        assert_eq!(data_frames, 4);
        let last = pages.last().unwrap();
        assert!(last.header.is_eos());
        assert_eq!(last.header.granule_position, 1000);
    }

    #[test]
    fn test_headers_emitted_once_across_calls() {
        let engine = FakeEngine::default();
        let mut encoder = session(&engine);

        let start = encoder.start_encoding(SampleRate::Hz16000).unwrap();
        assert_eq!(pages(&start).len(), 2);
        assert!(encoder.start_encoding(SampleRate::Hz16000).unwrap().is_empty());

        let chunk = encoder.encode_audio(&vec![1i16; 640], SampleRate::Hz16000).unwrap();
        let chunk_pages = pages(&chunk);
        assert_eq!(chunk_pages.len(), 1);
        assert_eq!(chunk_pages[0].header.page_sequence, 2);
        assert_eq!(chunk_pages[0].header.granule_position, 640);
    }

    #[test]
    fn test_no_resampler_at_output_rate() {
        let engine = FakeEngine::default();
        let resampling = CountingResampling::default();
        let mut encoder = linear_session(&engine, &resampling);

        for _ in 0..3 {
            encoder.encode_audio(&vec![0i16; 1000], SampleRate::Hz16000).unwrap();
        }
        assert_eq!(resampling.created.get(), 0);
        assert_eq!(encoder.resampler_input_rate(), None);
    }

    #[test]
    fn test_resampler_created_lazily_and_reused() {
        let engine = FakeEngine::default();
        let resampling = CountingResampling::default();
        let mut encoder = linear_session(&engine, &resampling);

        // The interpolator holds back the positions past the last input sample
        let out = encoder.encode_audio(&vec![0i16; 8000], SampleRate::Hz8000).unwrap();
        assert_eq!(pages(&out)[2].packets().len(), 49);
        assert_eq!(encoder.pending_samples(), 15998 - 49 * 320);
        encoder.encode_audio(&vec![0i16; 8000], SampleRate::Hz8000).unwrap();
        assert_eq!(resampling.created.get(), 1);

        encoder.encode_audio(&vec![0i16; 32000], SampleRate::Hz32000).unwrap();
        assert_eq!(resampling.created.get(), 2);
        assert_eq!(encoder.resampler_input_rate(), Some(SampleRate::Hz32000));
    }

    #[test]
    fn test_resampler_failure_keeps_session_usable() {
        let engine = FakeEngine::default();
        let resampling = CountingResampling {
            fail: true,
            ..Default::default()
        };
        let mut encoder = linear_session(&engine, &resampling);

        let err = encoder.encode_audio(&[0; 100], SampleRate::Hz44100).unwrap_err();
        assert!(matches!(err, Error::CouldNotSetupResampler { from: 44100, to: 16000 }));
        assert_eq!(encoder.pending_samples(), 0);

        // Headers only; the 100 samples wait for the rest of their frame
        let out = encoder.encode_audio(&[0; 100], SampleRate::Hz16000).unwrap();
        assert_eq!(pages(&out).len(), 2);
        let end = pages(&encoder.finish().unwrap());
        assert_eq!(end[0].packets().len(), 1);
        assert_eq!(end[1].header.granule_position, 100);
    }

    #[test]
    fn test_rate_change_drains_old_resampler_first() {
        let engine = FakeEngine::default();
        let resampling = CountingResampling::default();
        let mut encoder = linear_session(&engine, &resampling);

        encoder.encode_audio(&vec![100i16; 8000], SampleRate::Hz8000).unwrap();
        assert_eq!(encoder.frames_encoded(), 49);

        // 16000 samples from the 8 kHz stream, then 320 new ones: 51 frames
        encoder.encode_audio(&[5; 320], SampleRate::Hz16000).unwrap();
        assert_eq!(encoder.frames_encoded(), 51);
        assert_eq!(encoder.pending_samples(), 0);
        assert_eq!(encoder.resampler_input_rate(), None);

        let seen = engine.seen.borrow();
        assert!(seen[49].iter().all(|&s| s == 100));
        assert!(seen[50].iter().all(|&s| s == 5));
    }

    fn two_chunks(fail_second: bool) -> (Vec<u8>, Vec<Vec<i16>>) {
        let engine = FakeEngine::default();
        let mut encoder = session(&engine);
        let first: Vec<i16> = (0..4000).map(|i| ((i * 29) % 3000) as i16).collect();
        let second: Vec<i16> = (0..4000).map(|i| ((i * 41) % 2500) as i16).collect();

        let mut stream = encoder.encode_audio(&first, SampleRate::Hz8000).unwrap();
        if fail_second {
            engine.fail_next.set(true);
            let err = encoder.encode_audio(&second, SampleRate::Hz8000).unwrap_err();
            assert!(matches!(err, Error::EncodeFrameFailed { index: 0 }));
        }
        stream.extend(encoder.encode_audio(&second, SampleRate::Hz8000).unwrap());
        stream.extend(encoder.finish().unwrap());

        let seen = engine.seen.borrow().clone();
        (stream, seen)
    }

    #[test]
    fn test_retry_after_failure_matches_clean_run() {
        let (clean_stream, clean_seen) = two_chunks(false);
        let (retried_stream, retried_seen) = two_chunks(true);
        assert_eq!(retried_seen, clean_seen);
        assert_eq!(retried_stream, clean_stream);
    }

    #[test]
    fn test_failed_rate_change_keeps_old_resampler() {
        let engine = FakeEngine::default();
        let resampling = CountingResampling::default();
        let mut encoder = linear_session(&engine, &resampling);

        encoder.encode_audio(&vec![100i16; 8000], SampleRate::Hz8000).unwrap();
        let pending = encoder.pending_samples();

        engine.fail_next.set(true);
        assert!(encoder.encode_audio(&vec![0i16; 32000], SampleRate::Hz32000).is_err());
        assert_eq!(encoder.resampler_input_rate(), Some(SampleRate::Hz8000));
        assert_eq!(encoder.pending_samples(), pending);
        assert_eq!(resampling.created.get(), 2);

        // Still one continuous 8 kHz stream: 16000 + 16000 samples
        encoder.encode_audio(&vec![100i16; 8000], SampleRate::Hz8000).unwrap();
        encoder.finish().unwrap();
        assert_eq!(encoder.frames_encoded(), 100);
        assert!(engine.seen.borrow().iter().flatten().all(|&s| s == 100));
    }

    #[test]
    fn test_failed_call_returns_nothing_and_keeps_headers_pending() {
        let engine = FakeEngine {
            fail_encode_at: Some(1),
            ..Default::default()
        };
        let mut encoder = session(&engine);

        let err = encoder.encode_audio(&vec![0i16; 960], SampleRate::Hz16000).unwrap_err();
        assert!(matches!(err, Error::EncodeFrameFailed { index: 1 }));
        assert_eq!(encoder.frames_encoded(), 0);

        let out = encoder.encode_audio(&vec![0i16; 320], SampleRate::Hz16000).unwrap();
        let pages = pages(&out);
        assert_eq!(pages.len(), 3);
        assert_eq!(pages[0].header.page_sequence, 0);
        assert_eq!(pages[2].header.granule_position, 320);
    }

    #[test]
    fn test_quality_out_of_range_releases_state() {
        let engine = FakeEngine::default();
        let result = SpeexEncoder::with_mode(engine.clone(), SpeexMode::Wideband, 11, SampleRate::Hz16000);
        assert!(matches!(result, Err(Error::CouldNotSetQuality(11))));
        assert_eq!(engine.live.get(), 0);
    }

    #[test]
    fn test_construction_errors() {
        let engine = FakeEngine {
            fail_allocate: true,
            ..Default::default()
        };
        assert!(matches!(
            SpeexEncoder::with_mode(engine, SpeexMode::Wideband, 5, SampleRate::Hz16000),
            Err(Error::CouldNotAllocateEncoderState)
        ));

        let engine = FakeEngine {
            fail_frame_size: true,
            ..Default::default()
        };
        assert!(matches!(
            SpeexEncoder::with_mode(engine.clone(), SpeexMode::Wideband, 5, SampleRate::Hz16000),
            Err(Error::CouldNotObtainFrameSize)
        ));
        assert_eq!(engine.live.get(), 0);

        let engine = FakeEngine {
            fail_bitrate: true,
            ..Default::default()
        };
        assert!(matches!(
            SpeexEncoder::with_mode(engine.clone(), SpeexMode::Wideband, 5, SampleRate::Hz16000),
            Err(Error::CouldNotObtainBitrate)
        ));
        assert_eq!(engine.live.get(), 0);
    }

    #[test]
    fn test_invalid_page_bound() {
        let mut config = EncodingSessionConfig::default();
        config.max_frames_per_page = 0;
        let engine = FakeEngine::default();
        assert!(matches!(
            SpeexEncoder::new(engine.clone(), config),
            Err(Error::InvalidFramesPerPage(0))
        ));
        assert_eq!(engine.live.get(), 0);
    }

    #[test]
    fn test_header_needs_frame_size() {
        let engine = FakeEngine {
            zero_frame_size: true,
            ..Default::default()
        };
        let mut encoder = session(&engine);

        assert!(matches!(
            encoder.start_encoding(SampleRate::Hz16000),
            Err(Error::NotEnoughDataToCreateSpeexHeader)
        ));
        assert!(matches!(
            encoder.encode_audio(&[0; 320], SampleRate::Hz16000),
            Err(Error::NotEnoughDataToCreateSpeexHeader)
        ));
        assert!(engine.seen.borrow().is_empty());
    }

    #[test]
    fn test_session_drop_releases_state() {
        let engine = FakeEngine::default();
        let encoder = session(&engine);
        assert_eq!(engine.live.get(), 1);
        drop(encoder);
        assert_eq!(engine.live.get(), 0);
    }

    #[test]
    fn test_finish_closes_stream() {
        let engine = FakeEngine::default();
        let mut encoder = session(&engine);
        encoder.encode_audio(&vec![0i16; 320], SampleRate::Hz16000).unwrap();

        let end = encoder.finish().unwrap();
        let end_pages = pages(&end);
        assert_eq!(end_pages.len(), 1);
        assert!(end_pages[0].header.is_eos());
        assert_eq!(end_pages[0].header.granule_position, 320);

        assert!(matches!(
            encoder.encode_audio(&[0; 10], SampleRate::Hz16000),
            Err(Error::StreamFinished)
        ));
        assert!(encoder.is_finished());
    }

    #[test]
    fn test_encode_wav_uses_declared_rate() {
        let wav = wav_bytes(&[0; 160], 8000);

        let engine = FakeEngine::default();
        let mut encoder =
            SpeexEncoder::with_mode(engine, SpeexMode::Narrowband, 5, SampleRate::Hz8000).unwrap();
        let out = encoder.encode_wav(&wav).unwrap();
        assert_eq!(pages(&out)[2].packets().len(), 1);
        assert_eq!(encoder.resampler_input_rate(), None);

        assert!(matches!(
            encoder.encode_wav(&wav[..40]),
            Err(Error::IncorrectFileSize { .. })
        ));
    }

    #[test]
    fn test_encode_wav_file() {
        let path = std::env::temp_dir().join(format!("speexogg-session-{}.wav", std::process::id()));
        std::fs::write(&path, wav_bytes(&[3; 640], 16000)).unwrap();

        let engine = FakeEngine::default();
        let mut encoder = session(&engine);
        let out = encoder.encode_wav_file(&path);
        std::fs::remove_file(&path).unwrap();

        assert_eq!(pages(&out.unwrap())[2].packets().len(), 2);
        assert_eq!(encoder.frames_encoded(), 2);
    }

    #[test]
    fn test_encode_wav_file_missing() {
        let engine = FakeEngine::default();
        let mut encoder = session(&engine);
        let path = std::env::temp_dir().join("speexogg-session-does-not-exist.wav");

        let err = encoder.encode_wav_file(&path).unwrap_err();
        assert!(matches!(err, Error::Io(_)));
        assert_eq!(err.code(), "IO_ERROR");
        assert!(!encoder.start_encoding(SampleRate::Hz16000).unwrap().is_empty());
    }
}
