use thiserror::Error;

pub const SCREEN_WIDTH: usize = 160;
pub const SCREEN_HEIGHT: usize = 144;

/// One completed frame: 2-bit shade indices, row-major.
pub type Frame = [[u8; SCREEN_WIDTH]; SCREEN_HEIGHT];

/// One stereo PCM sample pair, each side in -1.0..=1.0.
pub type StereoSample = (f32, f32);

// Logical button bits (pressed = 1). The bus inverts to the hardware's
// active-low P1 encoding when the CPU reads.
pub const BTN_RIGHT: u8 = 0x01;
pub const BTN_LEFT: u8 = 0x02;
pub const BTN_UP: u8 = 0x04;
pub const BTN_DOWN: u8 = 0x08;
pub const BTN_A: u8 = 0x10;
pub const BTN_B: u8 = 0x20;
pub const BTN_SELECT: u8 = 0x40;
pub const BTN_START: u8 = 0x80;

/// Transient failure reported by a host sink. The emulator logs it, drops
/// the offending frame or sample buffer, and keeps running; the per-tick
/// path itself never fails.
#[derive(Debug, Error)]
#[error("host sink fault: {0}")]
pub struct HostError(pub String);

/// Sink for completed 160x144 frames, called once per v-blank.
pub trait HostVideo {
    fn present(&mut self, frame: &Frame) -> Result<(), HostError>;
}

/// Sink for PCM output, called whenever the internal buffer fills.
pub trait HostAudio {
    fn enqueue(&mut self, samples: &[StereoSample], sample_rate: u32) -> Result<(), HostError>;
}

/// Source of the currently-held buttons, polled once per frame.
pub trait HostInput {
    fn buttons(&mut self) -> u8;
}

/// Discards frames; useful for tests and audio-only runs.
pub struct NullVideo;

impl HostVideo for NullVideo {
    fn present(&mut self, _frame: &Frame) -> Result<(), HostError> {
        Ok(())
    }
}

/// Discards samples.
pub struct NullAudio;

impl HostAudio for NullAudio {
    fn enqueue(&mut self, _samples: &[StereoSample], _sample_rate: u32) -> Result<(), HostError> {
        Ok(())
    }
}

/// Reports no buttons held.
pub struct NullInput;

impl HostInput for NullInput {
    fn buttons(&mut self) -> u8 {
        0
    }
}
