use std::{fs::File, io::{BufReader, Read}, path::PathBuf};

use glam::Vec2;
use smallvec::SmallVec;
use thiserror::Error;

use crate::{as_bytes::AsBytes, frame_path};

pub struct FluidDataDecoder {
    /// The directory the frames reside in.
    path: PathBuf,
    num_frames: u64,
    current_frame: u64,
}

impl FluidDataDecoder {
    pub fn new(path: PathBuf) -> FluidDataDecoder {
        Self {
            path,
            num_frames: 0,
            current_frame: 0,
        }
    }

    fn read_array<const N: usize, R: Read>(reader: &mut R) -> Result<[u8; N], DecodingError> {
        let mut bytes = [0; N];
        reader.read_exact(&mut bytes)?;
        Ok(bytes)
    }

    fn read_section<const N: usize, T: AsBytes<N>, R: Read>(reader: &mut R) -> Result<Vec<T>, DecodingError> {
        let len = u64::from_ne_bytes(Self::read_array(reader)?);
        let size = len.checked_mul(N as u64).ok_or(DecodingError::Corrupt(len))?;

        let mut bytes = Vec::new();
        reader.take(size).read_to_end(&mut bytes)?;

        if bytes.len() as u64 != size {
            return Err(DecodingError::Truncated { expected: len, found: (bytes.len() / N) as u64 });
        }

        Ok(bytes
            .chunks_exact(N)
            .map(|b| {
                let mut value = [0; N];
                value.copy_from_slice(b);
                T::from_bytes(value)
            })
            .collect())
    }

    pub fn decode_metadata(&mut self) -> Result<FluidMetadata, DecodingError> {
        let path = self.path.join("_meta");
        let mut reader = BufReader::new(File::open(path)?);

        let [dim] = Self::read_array::<1, _>(&mut reader)?;
        if dim != 2 {
            return Err(DecodingError::UnsupportedDimension(dim));
        }

        let fps = u32::from_ne_bytes(Self::read_array(&mut reader)?);
        let num_frames = u64::from_ne_bytes(Self::read_array(&mut reader)?);
        let particle_radius = f32::from_bytes(Self::read_array(&mut reader)?);
        let mut size = SmallVec::new();

        for _ in 0..dim {
            size.push(f32::from_bytes(Self::read_array(&mut reader)?));
        }

        self.num_frames = num_frames;

        Ok(FluidMetadata {
            dim,
            fps,
            num_frames,
            particle_radius,
            size,
        })
    }

    /// Reads the next frame, or `None` once every frame has been read.
    pub fn decode_frame(&mut self) -> Result<Option<FluidFrameData>, DecodingError> {
        if self.current_frame >= self.num_frames {
            return Ok(None)
        }

        let path = frame_path(&self.path, self.current_frame, self.num_frames);
        let mut reader = BufReader::new(File::open(path)?);

        let positions = Self::read_section::<8, Vec2, _>(&mut reader)?;
        let speeds = Self::read_section::<4, f32, _>(&mut reader)?;

        if positions.len() != speeds.len() {
            return Err(DecodingError::LengthMismatch {
                positions: positions.len(),
                speeds: speeds.len(),
            });
        }

        self.current_frame += 1;

        Ok(Some(FluidFrameData { positions, speeds }))
    }

    /// Rewinds to the first frame.
    pub fn reset(&mut self) {
        self.current_frame = 0;
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FluidMetadata {
    pub dim: u8,
    pub fps: u32,
    pub num_frames: u64,
    pub particle_radius: f32,
    pub size: SmallVec<[f32; 4]>,
}

impl FluidMetadata {
    /// Domain extents.
    pub fn extent(&self) -> Vec2 {
        Vec2::new(self.size[0], self.size[1])
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FluidFrameData {
    pub positions: Vec<Vec2>,
    pub speeds: Vec<f32>,
}

#[derive(Debug, Error)]
pub enum DecodingError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("only two-dimensional runs are supported, found dimension {0}")]
    UnsupportedDimension(u8),
    #[error("frame holds {positions} positions but {speeds} speeds")]
    LengthMismatch { positions: usize, speeds: usize },
    #[error("section announced {expected} values but only {found} are present")]
    Truncated { expected: u64, found: u64 },
    #[error("section length {0} cannot be addressed")]
    Corrupt(u64),
}
