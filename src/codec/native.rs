// libspeex binding
//
// Links the system libspeex. Only the handful of entry points the encoder
// needs are declared here.

use std::os::raw::{c_char, c_int, c_void};

use super::{CodecEngine, EngineFailure, EngineResult, FrameEncoder};
use crate::types::SpeexMode;

const SPEEX_GET_FRAME_SIZE: c_int = 3;
const SPEEX_SET_QUALITY: c_int = 4;
const SPEEX_GET_BITRATE: c_int = 19;

const QUALITY_RANGE: std::ops::RangeInclusive<i32> = 0..=10;

/// Largest compressed frame libspeex can produce for one frame
const MAX_FRAME_BYTES: usize = 2000;

#[repr(C)]
struct SpeexBits {
    chars: *mut c_char,
    nb_bits: c_int,
    char_ptr: c_int,
    bit_ptr: c_int,
    owner: c_int,
    overflow: c_int,
    buf_size: c_int,
    reserved1: c_int,
    reserved2: *mut c_void,
}

#[link(name = "speex")]
extern "C" {
    fn speex_lib_get_mode(mode: c_int) -> *const c_void;
    fn speex_encoder_init(mode: *const c_void) -> *mut c_void;
    fn speex_encoder_destroy(state: *mut c_void);
    fn speex_encoder_ctl(state: *mut c_void, request: c_int, ptr: *mut c_void) -> c_int;
    fn speex_encode_int(state: *mut c_void, input: *mut i16, bits: *mut SpeexBits) -> c_int;
    fn speex_bits_init(bits: *mut SpeexBits);
    fn speex_bits_destroy(bits: *mut SpeexBits);
    fn speex_bits_reset(bits: *mut SpeexBits);
    fn speex_bits_insert_terminator(bits: *mut SpeexBits);
    fn speex_bits_write(bits: *mut SpeexBits, bytes: *mut c_char, max_len: c_int) -> c_int;
}

/// Codec engine backed by libspeex
#[derive(Debug, Default, Clone, Copy)]
pub struct NativeSpeex;

impl CodecEngine for NativeSpeex {
    type Encoder = NativeEncoder;

    fn allocate(&self, mode: SpeexMode) -> EngineResult<NativeEncoder> {
        // SAFETY: mode ids 0..=2 are the ones libspeex defines; the returned
        // mode pointer refers to static data inside the library.
        let state = unsafe {
            let mode_ptr = speex_lib_get_mode(mode.id());
            if mode_ptr.is_null() {
                return Err(EngineFailure::new(format!("libspeex has no {} mode", mode)));
            }
            speex_encoder_init(mode_ptr)
        };
        if state.is_null() {
            return Err(EngineFailure::new("speex_encoder_init returned null"));
        }

        let mut bits = Box::new(SpeexBits {
            chars: std::ptr::null_mut(),
            nb_bits: 0,
            char_ptr: 0,
            bit_ptr: 0,
            owner: 0,
            overflow: 0,
            buf_size: 0,
            reserved1: 0,
            reserved2: std::ptr::null_mut(),
        });
        // SAFETY: bits points at a live, exclusively owned SpeexBits
        unsafe { speex_bits_init(bits.as_mut()) };

        Ok(NativeEncoder { state, bits })
    }
}

/// Owned libspeex encoder state
pub struct NativeEncoder {
    state: *mut c_void,
    bits: Box<SpeexBits>,
}

impl NativeEncoder {
    fn ctl_get(&self, request: c_int) -> EngineResult<c_int> {
        let mut value: c_int = 0;
        // SAFETY: state is a live encoder and value outlives the call
        let status = unsafe {
            speex_encoder_ctl(self.state, request, &mut value as *mut c_int as *mut c_void)
        };
        if status != 0 {
            return Err(EngineFailure::new(format!(
                "speex_encoder_ctl({}) failed with {}",
                request, status
            )));
        }
        Ok(value)
    }
}

impl FrameEncoder for NativeEncoder {
    fn set_quality(&mut self, quality: i32) -> EngineResult<()> {
        if !QUALITY_RANGE.contains(&quality) {
            return Err(EngineFailure::new(format!(
                "quality {} outside {:?}",
                quality, QUALITY_RANGE
            )));
        }
        let mut value: c_int = quality;
        // SAFETY: state is a live encoder and value outlives the call
        let status = unsafe {
            speex_encoder_ctl(
                self.state,
                SPEEX_SET_QUALITY,
                &mut value as *mut c_int as *mut c_void,
            )
        };
        if status != 0 {
            return Err(EngineFailure::new(format!("SPEEX_SET_QUALITY failed with {}", status)));
        }
        Ok(())
    }

    fn frame_size(&self) -> EngineResult<usize> {
        let size = self.ctl_get(SPEEX_GET_FRAME_SIZE)?;
        usize::try_from(size).map_err(|_| EngineFailure::new("negative frame size"))
    }

    fn bitrate(&self) -> EngineResult<i32> {
        self.ctl_get(SPEEX_GET_BITRATE)
    }

    fn encode_frame(&mut self, pcm: &[i16]) -> EngineResult<Vec<u8>> {
        let frame_size = self.frame_size()?;
        if pcm.len() != frame_size {
            return Err(EngineFailure::new(format!(
                "expected {} samples, got {}",
                frame_size,
                pcm.len()
            )));
        }

        // speex_encode_int may scribble on its input
        let mut input = pcm.to_vec();
        let mut out = vec![0u8; MAX_FRAME_BYTES];

        // SAFETY: state and bits are live and exclusively owned; input holds
        // frame_size samples and out has MAX_FRAME_BYTES of room.
        let written = unsafe {
            speex_bits_reset(self.bits.as_mut());
            speex_encode_int(self.state, input.as_mut_ptr(), self.bits.as_mut());
            speex_bits_insert_terminator(self.bits.as_mut());
            speex_bits_write(
                self.bits.as_mut(),
                out.as_mut_ptr() as *mut c_char,
                MAX_FRAME_BYTES as c_int,
            )
        };
        if written <= 0 {
            return Err(EngineFailure::new("speex_bits_write produced no data"));
        }

        out.truncate(written as usize);
        Ok(out)
    }
}

impl Drop for NativeEncoder {
    fn drop(&mut self) {
        // SAFETY: both handles were initialised in allocate and are released once
        unsafe {
            speex_bits_destroy(self.bits.as_mut());
            speex_encoder_destroy(self.state);
        }
    }
}

// SAFETY: the encoder state is only reached through &mut self or &self ctl
// reads; it never aliases across threads.
unsafe impl Send for NativeEncoder {}
