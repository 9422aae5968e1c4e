//! WAV packaging.
//!
//! Wraps raw PCM samples in the canonical 44-byte RIFF/WAVE header. This is
//! the wire contract with every client: mono, 16-bit, little-endian, no
//! compression, no extra chunks — parseable by any standard WAV reader.

use std::io::Cursor;

/// Size of the canonical PCM WAV header produced here, in bytes.
pub const HEADER_LEN: usize = 44;

/// Package mono 16-bit samples into a complete WAV file.
///
/// Output length is exactly [`HEADER_LEN`] + 2 bytes per sample.
pub fn package(samples: &[i16], sample_rate: u32) -> Result<Vec<u8>, hound::Error> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = Cursor::new(Vec::with_capacity(HEADER_LEN + samples.len() * 2));
    let mut writer = hound::WavWriter::new(&mut cursor, spec)?;
    for &sample in samples {
        writer.write_sample(sample)?;
    }
    writer.finalize()?;

    Ok(cursor.into_inner())
}
