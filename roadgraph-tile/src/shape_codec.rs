//! # Shape codec
//!
//! Compact encoding of edge geometry.
//!
//! Each coordinate is quantized to [`SHAPE_PRECISION`] (six decimal places),
//! and written as the zig-zag varint delta from the previous point,
//! latitude first, then longitude.
//! The precision is fixed, so the output doesn't depend on the platform's floating point width.

use bytes::Buf;
use bytes_varint::{VarIntSupport, VarIntSupportMut};
use geo::{Coord, coord};
use thiserror::Error;

/// Quantization factor for encoded coordinates.
pub const SHAPE_PRECISION: f64 = 1e6;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ShapeDecodingError {
    #[error("The encoded shape ends in the middle of a coordinate (byte {0}).")]
    Truncated(usize),
    #[error("The encoded shape contains a varint that does not fit in 64 bits (byte {0}).")]
    Overflow(usize),
    #[error("A coordinate in the encoded shape overflows (byte {0}).")]
    CoordinateOverflow(usize),
    #[error("The encoded shape is empty.")]
    Empty,
}

#[inline]
fn quantize(value: f64) -> i64 {
    (value * SHAPE_PRECISION).round() as i64
}

/// Encodes a sequence of coordinates (x = longitude, y = latitude).
pub fn encode<I: IntoIterator<Item = Coord<f64>>>(points: I) -> Vec<u8> {
    let mut buf = Vec::new();
    let (mut last_lat, mut last_lon) = (0i64, 0i64);
    for point in points {
        let lat = quantize(point.y);
        let lon = quantize(point.x);
        buf.put_i64_varint(lat - last_lat);
        buf.put_i64_varint(lon - last_lon);
        last_lat = lat;
        last_lon = lon;
    }
    buf
}

/// A streaming decoder over an encoded shape.
///
/// The decoder is cheap to construct, so "restarting" is just creating a new one.
pub struct ShapeDecoder<'a> {
    encoded: &'a [u8],
    remaining: &'a [u8],
    lat: i64,
    lon: i64,
}

impl<'a> ShapeDecoder<'a> {
    #[must_use]
    pub fn new(encoded: &'a [u8]) -> Self {
        Self {
            encoded,
            remaining: encoded,
            lat: 0,
            lon: 0,
        }
    }

    fn offset(&self) -> usize {
        self.encoded.len() - self.remaining.len()
    }

    fn next_delta(&mut self) -> Result<i64, ShapeDecodingError> {
        let position = self.offset();
        if !self.remaining.has_remaining() {
            return Err(ShapeDecodingError::Truncated(position));
        }
        self.remaining.try_get_i64_varint().map_err(|_| {
            if self.remaining.has_remaining() {
                ShapeDecodingError::Overflow(position)
            } else {
                ShapeDecodingError::Truncated(position)
            }
        })
    }
}

impl Iterator for ShapeDecoder<'_> {
    type Item = Result<Coord<f64>, ShapeDecodingError>;

    fn next(&mut self) -> Option<Self::Item> {
        if !self.remaining.has_remaining() {
            return None;
        }

        let start = self.offset();
        let coordinate = self
            .next_delta()
            .and_then(|lat| self.next_delta().map(|lon| (lat, lon)))
            .and_then(|(d_lat, d_lon)| {
                self.lat
                    .checked_add(d_lat)
                    .zip(self.lon.checked_add(d_lon))
                    .ok_or(ShapeDecodingError::CoordinateOverflow(start))
            });
        match coordinate {
            Ok((lat, lon)) => {
                self.lat = lat;
                self.lon = lon;
                // Division (not multiplication by the reciprocal) gives the closest double
                // to the decimal value, so 1.5 decodes as exactly 1.5.
                Some(Ok(coord! {
                    x: self.lon as f64 / SHAPE_PRECISION,
                    y: self.lat as f64 / SHAPE_PRECISION,
                }))
            }
            Err(e) => {
                // Fuse after an error
                self.remaining = &[];
                Some(Err(e))
            }
        }
    }
}

/// Decodes a full shape.
pub fn decode(encoded: &[u8]) -> Result<Vec<Coord<f64>>, ShapeDecodingError> {
    ShapeDecoder::new(encoded).collect()
}

/// Decodes only the first coordinate of a shape.
pub fn decode_first(encoded: &[u8]) -> Result<Coord<f64>, ShapeDecodingError> {
    ShapeDecoder::new(encoded)
        .next()
        .unwrap_or(Err(ShapeDecodingError::Empty))
}
