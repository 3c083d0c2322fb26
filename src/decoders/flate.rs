//! FlateDecode (zlib/deflate).

use crate::decoders::StreamDecoder;
use crate::error::{Error, Result};
use flate2::read::{DeflateDecoder, ZlibDecoder};
use flate2::write::ZlibEncoder;
use flate2::Compression;
use std::io::{Read, Write};

/// Inflates `/FlateDecode` streams.
///
/// Zlib-wrapped data is tried first, then bare deflate. A stream that breaks
/// part way keeps the bytes inflated before the break.
pub struct FlateDecoder;

/// Inflate with `reader`, returning the output and the error that stopped it.
fn inflate(reader: impl Read) -> (Vec<u8>, Option<std::io::Error>) {
    let mut output = Vec::new();
    let mut reader = reader;
    let err = reader.read_to_end(&mut output).err();
    (output, err)
}

impl StreamDecoder for FlateDecoder {
    fn decode(&self, input: &[u8]) -> Result<Vec<u8>> {
        if input.is_empty() {
            return Ok(Vec::new());
        }

        let (output, zlib_err) = inflate(ZlibDecoder::new(input));
        match zlib_err {
            None => return Ok(output),
            Some(e) if !output.is_empty() => {
                log::warn!("Flate stream broke after {} bytes, keeping them: {}", output.len(), e);
                return Ok(output);
            },
            Some(_) => {},
        }

        log::debug!("No zlib header, inflating {} bytes as raw deflate", input.len());
        let (output, deflate_err) = inflate(DeflateDecoder::new(input));
        if !output.is_empty() {
            if let Some(e) = deflate_err {
                log::warn!("Raw deflate stream broke after {} bytes: {}", output.len(), e);
            }
            return Ok(output);
        }

        Err(Error::Decode(format!(
            "cannot inflate {} bytes (zlib: {}, deflate: {})",
            input.len(),
            zlib_err.map_or_else(|| "no output".to_string(), |e| e.to_string()),
            deflate_err.map_or_else(|| "no output".to_string(), |e| e.to_string()),
        )))
    }

    fn name(&self) -> &str {
        "FlateDecode"
    }
}

/// Compress data for a `/FlateDecode` stream.
pub fn flate_encode(data: &[u8]) -> Result<Vec<u8>> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data)?;
    Ok(encoder.finish()?)
}
