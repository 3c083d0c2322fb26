//! PNG and TIFF predictors for FlateDecode streams.
//!
//! Cross-reference streams written by most producers use PNG Up (12) with
//! `Columns` equal to the sum of the `W` widths, so this path is hot when
//! loading modern files.

use crate::error::{Error, Result};

/// Decode parameters for predictor reversal.
#[derive(Debug, Clone)]
pub struct DecodeParams {
    /// Predictor algorithm (1 = none, 2 = TIFF, 10-15 = PNG)
    pub predictor: i64,
    /// Number of samples per row
    pub columns: usize,
    /// Number of color components per sample
    pub colors: usize,
    /// Bits per component
    pub bits_per_component: usize,
}

impl Default for DecodeParams {
    fn default() -> Self {
        Self {
            predictor: 1,
            columns: 1,
            colors: 1,
            bits_per_component: 8,
        }
    }
}

impl DecodeParams {
    /// Bytes of sample data per row, excluding any PNG tag byte.
    ///
    /// # Errors
    ///
    /// [`Error::Decode`] when `Columns * Colors * BitsPerComponent`
    /// overflows.
    pub fn pixel_bytes_per_row(&self) -> Result<usize> {
        self.columns
            .checked_mul(self.colors)
            .and_then(|samples| samples.checked_mul(self.bits_per_component))
            .map(|bits| bits.div_ceil(8))
            .ok_or_else(|| {
                Error::Decode(format!(
                    "predictor row of {} columns, {} colors, {} bits overflows",
                    self.columns, self.colors, self.bits_per_component
                ))
            })
    }

    /// Row width, rejected when a single row is wider than the whole input.
    fn row_bytes_within(&self, data: &[u8]) -> Result<usize> {
        let row = self.pixel_bytes_per_row()?;
        if row > data.len() {
            return Err(Error::Decode(format!(
                "predictor row of {} bytes exceeds {} bytes of data",
                row,
                data.len()
            )));
        }
        Ok(row)
    }

    /// Bytes per complete pixel, at least one.
    fn bytes_per_pixel(&self) -> usize {
        self.colors
            .saturating_mul(self.bits_per_component)
            .div_ceil(8)
            .max(1)
    }
}

/// Reverse the predictor described by `params`.
pub fn decode_predictor(data: &[u8], params: &DecodeParams) -> Result<Vec<u8>> {
    if data.is_empty() {
        return Ok(Vec::new());
    }
    match params.predictor {
        1 => Ok(data.to_vec()),
        2 => decode_tiff(data, params),
        10..=15 => decode_png(data, params),
        other => Err(Error::Decode(format!("Unsupported predictor: {}", other))),
    }
}

fn decode_tiff(data: &[u8], params: &DecodeParams) -> Result<Vec<u8>> {
    let row_len = params.row_bytes_within(data)?;
    if params.bits_per_component != 8 {
        return Err(Error::Decode(format!(
            "TIFF predictor with {} bits per component",
            params.bits_per_component
        )));
    }
    let bpp = params.bytes_per_pixel();
    let mut output = Vec::with_capacity(data.len());
    for row in data.chunks(row_len) {
        let start = output.len();
        for (i, &byte) in row.iter().enumerate() {
            let left = if i >= bpp { output[start + i - bpp] } else { 0 };
            output.push(byte.wrapping_add(left));
        }
    }
    Ok(output)
}

fn decode_png(data: &[u8], params: &DecodeParams) -> Result<Vec<u8>> {
    let pixel_bytes = params.row_bytes_within(data)?;
    let row_len = pixel_bytes + 1;
    let bpp = params.bytes_per_pixel();

    let mut output = Vec::with_capacity(data.len() / row_len * pixel_bytes);
    let mut prev = vec![0u8; pixel_bytes];
    let mut row = vec![0u8; pixel_bytes];

    for chunk in data.chunks(row_len) {
        // A trailing short row is zero-extended
        let tag = chunk[0];
        let encoded = &chunk[1..];

        for i in 0..pixel_bytes {
            let raw = encoded.get(i).copied().unwrap_or(0);
            let left = if i >= bpp { row[i - bpp] } else { 0 };
            let up = prev[i];
            let up_left = if i >= bpp { prev[i - bpp] } else { 0 };
            row[i] = match tag {
                0 => raw,
                1 => raw.wrapping_add(left),
                2 => raw.wrapping_add(up),
                3 => raw.wrapping_add(((left as u16 + up as u16) / 2) as u8),
                4 => raw.wrapping_add(paeth(left, up, up_left)),
                _ => return Err(Error::Decode(format!("Invalid PNG predictor tag: {}", tag))),
            };
        }

        output.extend_from_slice(&row);
        std::mem::swap(&mut prev, &mut row);
    }

    Ok(output)
}

fn paeth(a: u8, b: u8, c: u8) -> u8 {
    let p = a as i16 + b as i16 - c as i16;
    let pa = (p - a as i16).abs();
    let pb = (p - b as i16).abs();
    let pc = (p - c as i16).abs();
    if pa <= pb && pa <= pc {
        a
    } else if pb <= pc {
        b
    } else {
        c
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn png(predictor: i64, columns: usize) -> DecodeParams {
        DecodeParams {
            predictor,
            columns,
            ..Default::default()
        }
    }

    #[test]
    fn test_no_predictor() {
        let result = decode_predictor(b"Hello", &DecodeParams::default()).unwrap();
        assert_eq!(result, b"Hello");
    }

    #[test]
    fn test_png_up_predictor() {
        let encoded = vec![
            2, 10, 20, 30, 40, 50, // row 0
            2, 5, 5, 5, 5, 5, // row 1
        ];
        let result = decode_predictor(&encoded, &png(12, 5)).unwrap();
        assert_eq!(result, vec![10, 20, 30, 40, 50, 15, 25, 35, 45, 55]);
    }

    #[test]
    fn test_png_row_tag_overrides_declared_predictor() {
        // Predictor 12 declared, but the second row is tagged Sub
        let encoded = vec![0, 1, 2, 3, 1, 1, 1, 1];
        let result = decode_predictor(&encoded, &png(12, 3)).unwrap();
        assert_eq!(result, vec![1, 2, 3, 1, 2, 3]);
    }

    #[test]
    fn test_png_invalid_tag() {
        let result = decode_predictor(&[9, 0, 0], &png(15, 2));
        assert!(result.is_err());
    }

    #[test]
    fn test_tiff_predictor() {
        let params = DecodeParams {
            predictor: 2,
            columns: 4,
            ..Default::default()
        };
        let result = decode_predictor(&[1, 1, 1, 1], &params).unwrap();
        assert_eq!(result, vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_unsupported_predictor() {
        assert!(decode_predictor(b"x", &png(7, 1)).is_err());
    }

    #[test]
    fn test_oversized_columns_rejected() {
        let params = DecodeParams {
            predictor: 12,
            columns: 1 << 62,
            colors: 4,
            ..Default::default()
        };
        assert!(matches!(params.pixel_bytes_per_row(), Err(Error::Decode(_))));
        assert!(matches!(decode_predictor(&[2, 0, 0, 0], &params), Err(Error::Decode(_))));
    }

    #[test]
    fn test_row_wider_than_data_rejected() {
        let result = decode_predictor(&[2, 1, 2, 3], &png(12, 1_000_000));
        assert!(matches!(result, Err(Error::Decode(_))));

        let tiff = DecodeParams {
            predictor: 2,
            columns: 64,
            ..Default::default()
        };
        assert!(decode_predictor(&[1, 1], &tiff).is_err());
    }
}
