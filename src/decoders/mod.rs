//! Stream filters.
//!
//! Only the filters the object graph engine needs to read and write its own
//! structure are implemented: FlateDecode (with PNG/TIFF predictors) and
//! ASCIIHexDecode. Any other filter name decodes to
//! [`Error::UnsupportedFilter`], and the raw bytes stay untouched in the
//! [`Context`](crate::context::Context).

use crate::error::{Error, Result};
use crate::object::{Dict, Object};

mod flate;
mod predictor;

pub use flate::{flate_encode, FlateDecoder};
pub use predictor::{decode_predictor, DecodeParams};

/// Trait for stream decoders.
///
/// Each decoder implements one filter algorithm.
pub trait StreamDecoder {
    /// Decode the input data.
    fn decode(&self, input: &[u8]) -> Result<Vec<u8>>;

    /// Get the filter name of this decoder (e.g., "FlateDecode").
    fn name(&self) -> &str;
}

/// ASCIIHexDecode: pairs of hex digits up to an optional `>` end marker.
pub struct AsciiHexDecoder;

impl StreamDecoder for AsciiHexDecoder {
    fn decode(&self, input: &[u8]) -> Result<Vec<u8>> {
        let end = input.iter().position(|&b| b == b'>').unwrap_or(input.len());
        crate::parser::decode_hex(&input[..end])
    }

    fn name(&self) -> &str {
        "ASCIIHexDecode"
    }
}

/// Look up the decoder registered for a filter name.
pub fn decoder_for(filter: &str) -> Result<Box<dyn StreamDecoder>> {
    match filter {
        "FlateDecode" | "Fl" => Ok(Box::new(FlateDecoder)),
        "ASCIIHexDecode" | "AHx" => Ok(Box::new(AsciiHexDecoder)),
        other => Err(Error::UnsupportedFilter(other.to_string())),
    }
}

/// Decode stream data using a filter pipeline.
///
/// Filters are applied in order; the predictor (if any) runs last.
pub fn decode_stream_with_params(
    data: &[u8],
    filters: &[String],
    params: Option<&DecodeParams>,
) -> Result<Vec<u8>> {
    let mut current = data.to_vec();

    for filter_name in filters {
        current = decoder_for(filter_name)?.decode(&current)?;
    }

    if let Some(params) = params {
        if params.predictor != 1 {
            current = decode_predictor(&current, params)?;
        }
    }

    Ok(current)
}

/// Decode a stream payload according to its dictionary's `Filter` and
/// `DecodeParms` entries.
pub fn decode_stream_dict(dict: &Dict, data: &[u8]) -> Result<Vec<u8>> {
    let filters = dict
        .get("Filter")
        .map(extract_filter_names)
        .unwrap_or_default();
    if filters.is_empty() {
        return Ok(data.to_vec());
    }
    let params = extract_decode_params(dict.get("DecodeParms"));
    decode_stream_with_params(data, &filters, params.as_ref())
}

/// Extract filter names from a Filter entry (a single name or an array of names).
fn extract_filter_names(filter_obj: &Object) -> Vec<String> {
    match filter_obj {
        Object::Name(name) => vec![name.clone()],
        Object::Array(arr) => arr
            .iter()
            .filter_map(|obj| obj.as_name().map(|s| s.to_string()))
            .collect(),
        _ => vec![],
    }
}

/// Extract predictor parameters from a DecodeParms entry.
fn extract_decode_params(params_obj: Option<&Object>) -> Option<DecodeParams> {
    let dict = match params_obj? {
        Object::Dictionary(d) => d,
        Object::Array(arr) => arr.iter().find_map(|obj| obj.as_dict())?,
        _ => return None,
    };

    let int = |key: &str, default: i64| dict.get(key).and_then(Object::as_integer).unwrap_or(default);

    let positive = |key: &str, default: i64| usize::try_from(int(key, default).max(1)).unwrap_or(usize::MAX);

    Some(DecodeParams {
        predictor: int("Predictor", 1),
        columns: positive("Columns", 1),
        colors: positive("Colors", 1),
        bits_per_component: positive("BitsPerComponent", 8),
    })
}
