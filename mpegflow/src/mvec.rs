//! # Motion field dump files
//!
//! `.mvec` files store a sequence of motion fields, so that extraction and descriptor
//! computation can run separately. Everything is little-endian:
//!
//! * header: `b"MVF1"`, grid step as `u32`.
//! * per field: index `u64`, pts `i64`, timestamp `f64`, width `u32`, height `u32`, flags `u8`
//!   (bit 0 - no motion vectors), then `width * height` cells of `dx: f32`, `dy: f32`,
//!   `missing: u8` in row-major order.
//!
//! Raw images are not stored.

use crate::motion_field::MotionField;
use nalgebra as na;
use std::io::{self, Read, Write};

const MAGIC: &[u8; 4] = b"MVF1";
const FLAG_NO_MOTION_VECTORS: u8 = 1;
/// Upper bound on cells of a single field, well above any real grid.
const MAX_FIELD_CELLS: usize = 1 << 24;

/// Writes motion fields into a `.mvec` stream.
pub struct MvecWriter<W> {
    writer: W,
}

impl<W: Write> MvecWriter<W> {
    /// Create a writer, emitting the file header.
    pub fn new(mut writer: W, grid_step: usize) -> io::Result<Self> {
        writer.write_all(MAGIC)?;
        writer.write_all(&(grid_step as u32).to_le_bytes())?;
        Ok(Self { writer })
    }

    pub fn write_field(&mut self, field: &MotionField) -> io::Result<()> {
        let (width, height) = field.dim();
        let out = &mut self.writer;

        out.write_all(&(field.index as u64).to_le_bytes())?;
        out.write_all(&field.pts.to_le_bytes())?;
        out.write_all(&field.timestamp.to_le_bytes())?;
        out.write_all(&(width as u32).to_le_bytes())?;
        out.write_all(&(height as u32).to_le_bytes())?;

        let flags = if field.has_no_motion_vectors {
            FLAG_NO_MOTION_VECTORS
        } else {
            0
        };
        out.write_all(&[flags])?;

        for (x, y, motion) in field.iter() {
            out.write_all(&motion.x.to_le_bytes())?;
            out.write_all(&motion.y.to_le_bytes())?;
            out.write_all(&[field.is_missing(x, y) as u8])?;
        }

        Ok(())
    }

    pub fn flush(&mut self) -> io::Result<()> {
        self.writer.flush()
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

/// Reads motion fields from a `.mvec` stream.
pub struct MvecReader<R> {
    reader: R,
    grid_step: usize,
    done: bool,
}

fn read_array<const N: usize>(reader: &mut impl Read) -> io::Result<[u8; N]> {
    let mut buf = [0u8; N];
    reader.read_exact(&mut buf)?;
    Ok(buf)
}

impl<R: Read> MvecReader<R> {
    /// Create a reader, validating the file header.
    pub fn new(mut reader: R) -> io::Result<Self> {
        if &read_array::<4>(&mut reader)? != MAGIC {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "Not a motion field file",
            ));
        }

        let grid_step = u32::from_le_bytes(read_array(&mut reader)?) as usize;

        Ok(Self {
            reader,
            grid_step,
            done: false,
        })
    }

    /// Grid step the fields were extracted with.
    pub fn grid_step(&self) -> usize {
        self.grid_step
    }

    /// Read the next field, `Ok(None)` at a clean end of file.
    pub fn read_field(&mut self) -> io::Result<Option<MotionField>> {
        let mut index = [0u8; 8];

        // Only a completely missing record is a clean end.
        match self.reader.read(&mut index[..1])? {
            0 => return Ok(None),
            _ => self.reader.read_exact(&mut index[1..])?,
        }

        let index = u64::from_le_bytes(index) as usize;
        let pts = i64::from_le_bytes(read_array(&mut self.reader)?);
        let timestamp = f64::from_le_bytes(read_array(&mut self.reader)?);
        let width = u32::from_le_bytes(read_array(&mut self.reader)?) as usize;
        let height = u32::from_le_bytes(read_array(&mut self.reader)?) as usize;
        let [flags] = read_array::<1>(&mut self.reader)?;

        if width > u16::MAX as usize
            || height > u16::MAX as usize
            || width
                .checked_mul(height)
                .map_or(true, |cells| cells > MAX_FIELD_CELLS)
        {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("Invalid field dimensions {}x{}", width, height),
            ));
        }

        let mut field = MotionField::new(width, height);
        field.index = index;
        field.pts = pts;
        field.timestamp = timestamp;
        field.has_no_motion_vectors = flags & FLAG_NO_MOTION_VECTORS != 0;

        for y in 0..height {
            for x in 0..width {
                let dx = f32::from_le_bytes(read_array(&mut self.reader)?);
                let dy = f32::from_le_bytes(read_array(&mut self.reader)?);
                let [missing] = read_array::<1>(&mut self.reader)?;

                field.set_motion(x, y, na::Vector2::new(dx, dy));
                if missing != 0 {
                    field.set_missing(x, y);
                }
            }
        }

        Ok(Some(field))
    }
}

impl<R: Read> Iterator for MvecReader<R> {
    type Item = io::Result<MotionField>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        let ret = self.read_field().transpose();

        if !matches!(ret, Some(Ok(_))) {
            self.done = true;
        }

        ret
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_and_read_back() {
        let mut first = MotionField::new(3, 2);
        first.index = 4;
        first.pts = 3600;
        first.timestamp = 0.04;
        first.set_motion(2, 1, na::Vector2::new(-4.0, 2.5));
        first.set_missing(0, 1);

        let mut second = MotionField::new(3, 2);
        second.index = 5;
        second.has_no_motion_vectors = true;

        let mut writer = MvecWriter::new(Vec::<u8>::new(), 16).unwrap();
        writer.write_field(&first).unwrap();
        writer.write_field(&second).unwrap();
        let data = writer.into_inner();

        assert_eq!(data.len(), 8 + 2 * (33 + 6 * 9));

        let reader = MvecReader::new(data.as_slice()).unwrap();
        assert_eq!(reader.grid_step(), 16);

        let fields = reader.collect::<io::Result<Vec<_>>>().unwrap();
        assert_eq!(fields, vec![first, second]);
    }

    #[test]
    fn bad_header() {
        assert!(MvecReader::new(&b"MVF2\x10\0\0\0"[..]).is_err());
        assert!(MvecReader::new(&b"MV"[..]).is_err());
    }

    #[test]
    fn oversized_field() {
        let mut data = Vec::<u8>::new();
        data.extend_from_slice(b"MVF1");
        data.extend_from_slice(&16u32.to_le_bytes());
        data.extend_from_slice(&0u64.to_le_bytes());
        data.extend_from_slice(&0i64.to_le_bytes());
        data.extend_from_slice(&0f64.to_le_bytes());
        data.extend_from_slice(&u32::MAX.to_le_bytes());
        data.extend_from_slice(&u32::MAX.to_le_bytes());
        data.push(0);

        let mut reader = MvecReader::new(data.as_slice()).unwrap();
        let err = reader.next().unwrap().unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
        assert!(reader.next().is_none());

        // Each dimension fits, their product does not.
        let mut data = data[..32].to_vec();
        data.extend_from_slice(&60000u32.to_le_bytes());
        data.extend_from_slice(&60000u32.to_le_bytes());
        data.push(0);

        let mut reader = MvecReader::new(data.as_slice()).unwrap();
        assert!(reader.read_field().is_err());
    }

    #[test]
    fn truncated_field() {
        let mut writer = MvecWriter::new(Vec::<u8>::new(), 16).unwrap();
        writer.write_field(&MotionField::new(2, 2)).unwrap();
        let mut data = writer.into_inner();
        data.truncate(data.len() - 3);

        let mut reader = MvecReader::new(data.as_slice()).unwrap();
        assert!(reader.next().unwrap().is_err());
        assert!(reader.next().is_none());
    }
}
