//! Sample conversion between the capture pipeline and the voice driver.

use std::io::{self, Read, Seek, SeekFrom};

use symphonia_core::io::MediaSource;

use spotcast_common::models::voice::PcmStream;

/// Converts one signed 16-bit sample to f32 in [-1.0, 1.0).
#[inline]
pub fn i16_to_f32(sample: i16) -> f32 {
    sample as f32 / 32768.0
}

/// Reads s16le PCM from a capture stream and yields f32le samples.
///
/// The voice driver's raw input expects interleaved 32-bit floats, while the
/// capture process emits 16-bit integers. Chunk boundaries can split a
/// sample, so a dangling byte is carried into the next read.
pub struct S16ToF32Reader<R> {
    inner: R,
    carry: Option<u8>,
    scratch: Vec<u8>,
    pending: Vec<u8>,
    pending_pos: usize,
}

impl<R: Read> S16ToF32Reader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            carry: None,
            scratch: Vec::new(),
            pending: Vec::new(),
            pending_pos: 0,
        }
    }

    /// Pulls the next batch from the source. Returns `false` at end of stream.
    fn fill(&mut self, want_samples: usize) -> io::Result<bool> {
        self.pending.clear();
        self.pending_pos = 0;

        while self.pending.is_empty() {
            self.scratch.resize(want_samples.max(1) * 2, 0);
            let n = self.inner.read(&mut self.scratch)?;
            if n == 0 {
                return Ok(false);
            }

            let mut bytes = &self.scratch[..n];
            if let Some(lo) = self.carry.take() {
                let sample = i16::from_le_bytes([lo, bytes[0]]);
                self.pending.extend_from_slice(&i16_to_f32(sample).to_le_bytes());
                bytes = &bytes[1..];
            }

            let mut pairs = bytes.chunks_exact(2);
            for pair in &mut pairs {
                let sample = i16::from_le_bytes([pair[0], pair[1]]);
                self.pending.extend_from_slice(&i16_to_f32(sample).to_le_bytes());
            }
            if let [last] = pairs.remainder() {
                self.carry = Some(*last);
            }
        }
        Ok(true)
    }
}

impl<R: Read> Read for S16ToF32Reader<R> {
    fn read(&mut self, out: &mut [u8]) -> io::Result<usize> {
        if out.is_empty() {
            return Ok(0);
        }
        if self.pending_pos >= self.pending.len() && !self.fill(out.len().div_ceil(4))? {
            return Ok(0);
        }
        let available = &self.pending[self.pending_pos..];
        let n = out.len().min(available.len());
        out[..n].copy_from_slice(&available[..n]);
        self.pending_pos += n;
        Ok(n)
    }
}

impl<R> Seek for S16ToF32Reader<R> {
    fn seek(&mut self, _pos: SeekFrom) -> io::Result<u64> {
        Err(io::Error::new(io::ErrorKind::Unsupported, "live capture stream is not seekable"))
    }
}

impl MediaSource for S16ToF32Reader<PcmStream> {
    fn is_seekable(&self) -> bool {
        false
    }

    fn byte_len(&self) -> Option<u64> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn read_floats<R: Read>(mut reader: R) -> Vec<f32> {
        let mut bytes = Vec::new();
        reader.read_to_end(&mut bytes).unwrap();
        bytes
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect()
    }

    #[test]
    fn converts_full_scale() {
        let mut input = Vec::new();
        for s in [0i16, i16::MIN, 16384, -16384] {
            input.extend_from_slice(&s.to_le_bytes());
        }
        let out = read_floats(S16ToF32Reader::new(Cursor::new(input)));
        assert_eq!(out, vec![0.0, -1.0, 0.5, -0.5]);
    }

    #[test]
    fn samples_split_across_chunks() {
        let (tx, stream) = PcmStream::channel(8);
        let bytes = 16384i16.to_le_bytes();
        let second = (-16384i16).to_le_bytes();
        tx.send(vec![bytes[0]]).unwrap();
        tx.send(vec![bytes[1], second[0]]).unwrap();
        tx.send(vec![second[1]]).unwrap();
        drop(tx);

        let out = read_floats(S16ToF32Reader::new(stream));
        assert_eq!(out, vec![0.5, -0.5]);
    }

    #[test]
    fn not_seekable() {
        let (_tx, stream) = PcmStream::channel(1);
        let mut reader = S16ToF32Reader::new(stream);
        assert!(!reader.is_seekable());
        assert!(reader.byte_len().is_none());
        assert!(reader.seek(SeekFrom::Start(0)).is_err());
    }
}
