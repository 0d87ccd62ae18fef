//! Frame validation utilities for test pattern verification.
//!
//! This module provides functions to validate that transferred frames
//! contain the expected test patterns. Useful for testing against the
//! simulated SDK and for smoke-testing real cameras with dark frames.

use crate::traits::{BitDepth, CameraError, Result};
use crate::transfer::{ImageBuffer, ReadoutGeometry};

/// Ramp sample at column `x`, row `y` of the readout.
///
/// The ramp is `x + y`, wrapped to the sample width, so every row starts
/// one level above the previous row.
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub const fn ramp_sample(x: usize, y: usize, depth: BitDepth) -> u16 {
    let value = x.wrapping_add(y);
    match depth {
        BitDepth::Eight => (value & 0xff) as u16,
        BitDepth::Sixteen => (value & 0xffff) as u16,
    }
}

/// Validates that a frame contains the ramp pattern.
///
/// Every sample is compared, so a transfer that shifted or dropped bytes
/// anywhere in the frame is caught.
///
/// # Arguments
///
/// * `image` - The frame to validate
///
/// # Errors
///
/// Returns `Validation` with the first mismatching coordinate.
pub fn validate_ramp(image: &ImageBuffer) -> Result<()> {
    let geometry = *image.geometry();
    for y in 0..geometry.rows {
        for x in 0..geometry.width {
            let expected = ramp_sample(x, y, geometry.bit_depth);
            let actual = image.pixel(x, y).ok_or_else(|| {
                CameraError::Validation(format!("Failed to get pixel at ({x}, {y})"))
            })?;
            if actual != expected {
                return Err(CameraError::Validation(format!(
                    "Ramp mismatch at ({x}, {y}): expected {expected}, got {actual}"
                )));
            }
        }
    }
    Ok(())
}

/// Validates that no sample of a dark frame exceeds `ceiling`.
///
/// # Arguments
///
/// * `image` - The frame to validate
/// * `ceiling` - Highest acceptable level (0 for the simulated camera,
///   roughly the bias level plus read noise for real sensors)
///
/// # Errors
///
/// Returns `Validation` naming the first sample above the ceiling.
pub fn validate_dark(image: &ImageBuffer, ceiling: u16) -> Result<()> {
    let geometry = *image.geometry();
    for y in 0..geometry.rows {
        for x in 0..geometry.width {
            let level = image.pixel(x, y).unwrap_or(u16::MAX);
            if level > ceiling {
                return Err(CameraError::Validation(format!(
                    "Dark frame level {level} at ({x}, {y}) exceeds {ceiling}"
                )));
            }
        }
    }
    Ok(())
}

/// Validates a row-by-row drain.
///
/// Checks that exactly `geometry.rows` rows arrived, that every row is
/// `geometry.row_bytes()` long and that the rows carry the ramp in order
/// (the first sample of row `y` is the ramp value for `(0, y)`).
///
/// # Errors
///
/// Returns `Validation` if:
/// - The number of rows differs from the geometry
/// - Any row has the wrong length
/// - A row is out of order
pub fn validate_row_sequence(rows: &[Vec<u8>], geometry: &ReadoutGeometry) -> Result<()> {
    if rows.len() != geometry.rows {
        return Err(CameraError::Validation(format!(
            "Expected {} rows, got {}",
            geometry.rows,
            rows.len()
        )));
    }
    let row_geometry = ReadoutGeometry::new(geometry.width, 1, geometry.bit_depth);
    for (y, row) in rows.iter().enumerate() {
        let image = ImageBuffer::from_bytes(row_geometry, row.clone()).map_err(|_| {
            CameraError::Validation(format!(
                "Row {y} holds {} bytes, expected {}",
                row.len(),
                geometry.row_bytes()
            ))
        })?;
        if geometry.width == 0 {
            continue;
        }
        let expected = ramp_sample(0, y, geometry.bit_depth);
        if image.pixel(0, 0) != Some(expected) {
            return Err(CameraError::Validation(format!(
                "Row {y} out of order: starts at {:?}, expected {expected}",
                image.pixel(0, 0)
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp_image(width: usize, rows: usize, depth: BitDepth) -> ImageBuffer {
        let geometry = ReadoutGeometry::new(width, rows, depth);
        let mut bytes = Vec::with_capacity(geometry.frame_bytes());
        for y in 0..rows {
            bytes.extend(ramp_row(width, y, depth));
        }
        ImageBuffer::from_bytes(geometry, bytes).expect("sizes match")
    }

    fn ramp_row(width: usize, y: usize, depth: BitDepth) -> Vec<u8> {
        let mut row = Vec::new();
        for x in 0..width {
            let value = ramp_sample(x, y, depth);
            match depth {
                BitDepth::Eight => row.push(u8::try_from(value).expect("fits in a byte")),
                BitDepth::Sixteen => row.extend_from_slice(&value.to_ne_bytes()),
            }
        }
        row
    }

    #[test]
    fn test_ramp_sample_wraps() {
        assert_eq!(ramp_sample(3, 4, BitDepth::Sixteen), 7);
        assert_eq!(ramp_sample(200, 100, BitDepth::Eight), 44);
        assert_eq!(ramp_sample(65_535, 1, BitDepth::Sixteen), 0);
    }

    #[test]
    fn test_validate_ramp_success() {
        for depth in [BitDepth::Eight, BitDepth::Sixteen] {
            let image = ramp_image(300, 20, depth);
            let result = validate_ramp(&image);
            assert!(result.is_ok(), "Ramp validation should succeed: {result:?}");
        }
    }

    #[test]
    fn test_validate_ramp_detects_corruption() {
        let mut image = ramp_image(16, 4, BitDepth::Sixteen);
        if let Some(byte) = image.as_bytes_mut().get_mut(40) {
            *byte ^= 0x5a;
        }
        assert!(
            validate_ramp(&image).is_err(),
            "Ramp validation should fail on a corrupted sample"
        );
    }

    #[test]
    fn test_validate_dark() {
        let geometry = ReadoutGeometry::new(8, 8, BitDepth::Sixteen);
        let dark = ImageBuffer::for_geometry(geometry);
        assert!(validate_dark(&dark, 0).is_ok());

        let lit = ramp_image(8, 8, BitDepth::Sixteen);
        assert!(validate_dark(&lit, 5).is_err());
        assert!(validate_dark(&lit, 14).is_ok());
    }

    #[test]
    fn test_validate_row_sequence_success() {
        let geometry = ReadoutGeometry::new(10, 5, BitDepth::Sixteen);
        let rows: Vec<Vec<u8>> = (0..5).map(|y| ramp_row(10, y, BitDepth::Sixteen)).collect();
        let result = validate_row_sequence(&rows, &geometry);
        assert!(result.is_ok(), "Row sequence should validate: {result:?}");
    }

    #[test]
    fn test_validate_row_sequence_missing_row() {
        let geometry = ReadoutGeometry::new(10, 5, BitDepth::Sixteen);
        let rows: Vec<Vec<u8>> = (0..4).map(|y| ramp_row(10, y, BitDepth::Sixteen)).collect();
        assert!(validate_row_sequence(&rows, &geometry).is_err());
    }

    #[test]
    fn test_validate_row_sequence_out_of_order() {
        let geometry = ReadoutGeometry::new(10, 3, BitDepth::Eight);
        let rows = vec![
            ramp_row(10, 0, BitDepth::Eight),
            ramp_row(10, 2, BitDepth::Eight),
            ramp_row(10, 1, BitDepth::Eight),
        ];
        assert!(validate_row_sequence(&rows, &geometry).is_err());
    }

    #[test]
    fn test_validate_row_sequence_short_row() {
        let geometry = ReadoutGeometry::new(10, 1, BitDepth::Sixteen);
        let rows = vec![vec![0; 19]];
        assert!(validate_row_sequence(&rows, &geometry).is_err());
    }
}
