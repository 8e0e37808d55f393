//! Frame export for offline playback.
//!
//! A run is written to a directory holding a `_meta` file and one `NNN.dat` file per frame.
//! Every value is native-endian.
//!
//! `_meta`: dimension `u8`, frame rate `u32`, frame count `u64`, particle radius `f32`, then one
//! `f32` domain extent per dimension.
//!
//! Frame: a positions section followed by a speeds section. Each section is a `u64` particle
//! count followed by that many values.

use std::{io::Write, path::{Path, PathBuf}};

use encode::{EncodingError, FluidFrameEncoder};
use undertow_fluids::pcisph::d2::PcisphFluid2D;

pub mod as_bytes;
pub mod decode;
pub mod encode;

pub trait EncodeFluid {
    fn encode_state<W: Write>(&self, encoder: &mut FluidFrameEncoder<W>) -> Result<(), EncodingError>;
}

impl EncodeFluid for PcisphFluid2D {
    fn encode_state<W: Write>(&self, encoder: &mut FluidFrameEncoder<W>) -> Result<(), EncodingError> {
        let particles = self.particles();

        encoder.encode_section(particles.len(), particles.positions().iter().copied())?;
        encoder.encode_section(particles.len(), particles.velocities().iter().map(|v| v.length()))?;

        Ok(())
    }
}

/// Frame files are numbered from zero and zero-padded to the width of the last frame number.
pub(crate) fn frame_path(dir: &Path, frame: u64, num_frames: u64) -> PathBuf {
    let max_digits = num_frames.saturating_sub(1).checked_ilog10().unwrap_or(0) + 1;
    let digits = frame.checked_ilog10().unwrap_or(0) + 1;
    let zeros = max_digits.saturating_sub(digits);

    dir.join(format!("{}{frame}.dat", "0".repeat(zeros as usize)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_names_are_padded() {
        let dir = Path::new("out");
        assert_eq!(frame_path(dir, 7, 120), dir.join("007.dat"));
        assert_eq!(frame_path(dir, 119, 120), dir.join("119.dat"));
        assert_eq!(frame_path(dir, 0, 1), dir.join("0.dat"));
        assert_eq!(frame_path(dir, 3, 10), dir.join("3.dat"));
    }
}
