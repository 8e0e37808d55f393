use std::{fs::File, io::{BufWriter, Write}, path::PathBuf};

use thiserror::Error;

use undertow_fluids::{scene::Scene, Fluid};

use crate::{frame_path, EncodeFluid};

use super::as_bytes::AsBytes;

pub struct FluidDataEncoder {
    /// The directory the frames are written to. Must not exist yet.
    path: PathBuf,
    num_frames: u64,
    fps: u32,
    current_frame: u64,
}

impl FluidDataEncoder {
    pub fn new(path: PathBuf, num_frames: u64, fps: u32) -> Result<FluidDataEncoder, EncodingError> {
        std::fs::create_dir(&path)?;

        Ok(Self {
            path,
            num_frames,
            fps,
            current_frame: 0,
        })
    }

    /// Frames written so far.
    pub fn frames_written(&self) -> u64 {
        self.current_frame
    }

    pub fn encode_metadata<F: Fluid>(&mut self, scene: &Scene<F>) -> Result<(), EncodingError> {
        let path = self.path.join("_meta");
        let mut writer = BufWriter::new(File::create(path)?);
        let size = scene.size();

        writer.write_all(&[2])?;
        writer.write_all(&self.fps.to_ne_bytes())?;
        writer.write_all(&self.num_frames.to_ne_bytes())?;
        writer.write_all(&scene.particle_radius().to_bytes())?;
        writer.write_all(&size.x.to_bytes())?;
        writer.write_all(&size.y.to_bytes())?;
        writer.flush()?;

        Ok(())
    }

    pub fn encode_frame<F: Fluid + EncodeFluid>(&mut self, scene: &Scene<F>) -> Result<(), EncodingError> {
        if self.current_frame >= self.num_frames {
            return Err(EncodingError::TooManyFrames(self.num_frames));
        }

        let path = frame_path(&self.path, self.current_frame, self.num_frames);
        let writer = BufWriter::new(File::create(path)?);
        let mut encoder = FluidFrameEncoder { writer };

        scene.fluid.encode_state(&mut encoder)?;
        encoder.writer.flush()?;

        self.current_frame += 1;

        Ok(())
    }
}

pub struct FluidFrameEncoder<W: Write> {
    writer: BufWriter<W>,
}

impl<W: Write> FluidFrameEncoder<W> {
    pub fn new(writer: W) -> Self {
        Self { writer: BufWriter::new(writer) }
    }

    pub fn into_inner(self) -> Result<W, EncodingError> {
        self.writer.into_inner().map_err(|e| EncodingError::Io(e.into_error()))
    }

    /// Writes `len` followed by the values. The iterator must yield exactly `len` values.
    pub fn encode_section<const N: usize, T, I>(&mut self, len: usize, values: I) -> Result<(), EncodingError>
    where
        I: Iterator<Item = T>,
        T: AsBytes<N>,
    {
        self.writer.write_all(&(len as u64).to_ne_bytes())?;

        let mut written = 0;
        for v in values {
            self.writer.write_all(&v.to_bytes())?;
            written += 1;
        }

        if written != len {
            return Err(EncodingError::SectionLength { expected: len, written });
        }

        Ok(())
    }
}

#[derive(Debug, Error)]
pub enum EncodingError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("section announced {expected} values but {written} were written")]
    SectionLength { expected: usize, written: usize },
    #[error("all {0} frames have already been written")]
    TooManyFrames(u64),
}
