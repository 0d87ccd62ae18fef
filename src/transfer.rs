//! Buffer sizing rules shared by row and frame transfers.
//!
//! 16-bit samples are kept in the byte order the transport delivered them;
//! nothing here swaps bytes.

use crate::traits::{BitDepth, CameraError, ImageArea, ReadoutDimensions, Result};

/// Readout geometry and sample width for one exposure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadoutGeometry {
    /// Pixels per row.
    pub width: usize,
    /// Number of rows.
    pub rows: usize,
    /// Sample width.
    pub bit_depth: BitDepth,
}

impl ReadoutGeometry {
    /// Create a geometry from explicit dimensions.
    #[must_use]
    pub const fn new(width: usize, rows: usize, bit_depth: BitDepth) -> Self {
        Self {
            width,
            rows,
            bit_depth,
        }
    }

    /// Geometry of a configured image area.
    #[must_use]
    pub fn from_area(area: &ImageArea, bit_depth: BitDepth) -> Self {
        Self::new(
            usize::try_from(area.width()).unwrap_or(0),
            usize::try_from(area.height()).unwrap_or(0),
            bit_depth,
        )
    }

    /// Geometry reported by the camera.
    #[must_use]
    pub fn from_dimensions(dims: &ReadoutDimensions, bit_depth: BitDepth) -> Self {
        Self::new(
            usize::try_from(dims.width).unwrap_or(0),
            usize::try_from(dims.height).unwrap_or(0),
            bit_depth,
        )
    }

    /// Bytes in a single row.
    #[must_use]
    pub const fn row_bytes(&self) -> usize {
        self.width * self.bit_depth.bytes_per_pixel()
    }

    /// Pixels in the whole frame.
    #[must_use]
    pub const fn pixel_count(&self) -> usize {
        self.width * self.rows
    }

    /// Bytes in the whole frame.
    #[must_use]
    pub const fn frame_bytes(&self) -> usize {
        self.row_bytes() * self.rows
    }
}

/// Fail unless a transfer moved exactly the expected number of bytes.
pub fn check_transfer(expected: usize, actual: usize) -> Result<()> {
    if expected == actual {
        Ok(())
    } else {
        Err(CameraError::TransferSizeMismatch { expected, actual })
    }
}

/// Frame data together with the geometry it was read with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageBuffer {
    geometry: ReadoutGeometry,
    data: Vec<u8>,
}

impl ImageBuffer {
    /// Allocate a zeroed buffer sized for `geometry`.
    #[must_use]
    pub fn for_geometry(geometry: ReadoutGeometry) -> Self {
        Self {
            geometry,
            data: vec![0; geometry.frame_bytes()],
        }
    }

    /// Wrap existing bytes, which must match the geometry exactly.
    pub fn from_bytes(geometry: ReadoutGeometry, data: Vec<u8>) -> Result<Self> {
        check_transfer(geometry.frame_bytes(), data.len())?;
        Ok(Self { geometry, data })
    }

    /// Geometry this buffer was sized for.
    #[must_use]
    pub const fn geometry(&self) -> &ReadoutGeometry {
        &self.geometry
    }

    /// Raw bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Raw bytes, writable.
    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Take the raw bytes.
    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }

    /// Bytes of one row.
    #[must_use]
    pub fn row(&self, index: usize) -> Option<&[u8]> {
        let row_bytes = self.geometry.row_bytes();
        let start = index.checked_mul(row_bytes)?;
        self.data.get(start..start.checked_add(row_bytes)?)
    }

    /// Sample at (x, y). 16-bit samples are decoded in native byte order.
    #[must_use]
    pub fn pixel(&self, x: usize, y: usize) -> Option<u16> {
        if x >= self.geometry.width {
            return None;
        }
        let row = self.row(y)?;
        match self.geometry.bit_depth {
            BitDepth::Eight => row.get(x).map(|&v| u16::from(v)),
            BitDepth::Sixteen => {
                let offset = x * 2;
                let bytes = row.get(offset..offset + 2)?;
                Some(u16::from_ne_bytes([*bytes.first()?, *bytes.get(1)?]))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_bytes_follow_area_width() {
        for (area, depth) in [
            (ImageArea::new(0, 0, 3072, 3072), BitDepth::Sixteen),
            (ImageArea::new(100, 40, 612, 296), BitDepth::Eight),
            (ImageArea::new(7, 3, 8, 4), BitDepth::Sixteen),
        ] {
            let geometry = ReadoutGeometry::from_area(&area, depth);
            let width = usize::try_from(area.lr_x - area.ul_x).expect("positive width");
            let rows = usize::try_from(area.lr_y - area.ul_y).expect("positive height");
            assert_eq!(geometry.row_bytes(), width * depth.bytes_per_pixel());
            assert_eq!(geometry.rows, rows);
            assert_eq!(geometry.frame_bytes(), geometry.row_bytes() * rows);
        }
    }

    #[test]
    fn test_full_frame_size() {
        let geometry =
            ReadoutGeometry::from_area(&ImageArea::new(0, 0, 3072, 3072), BitDepth::Sixteen);
        assert_eq!(geometry.frame_bytes(), 18_874_368);
        assert_eq!(geometry.pixel_count(), 3072 * 3072);
    }

    #[test]
    fn test_from_dimensions_clamps_negative() {
        let dims = ReadoutDimensions {
            width: -4,
            height: 10,
            ..ReadoutDimensions::default()
        };
        let geometry = ReadoutGeometry::from_dimensions(&dims, BitDepth::Eight);
        assert_eq!(geometry.width, 0);
        assert_eq!(geometry.rows, 10);
    }

    #[test]
    fn test_from_area_inverted_is_empty() {
        let area = ImageArea::new(50, 20, 10, 80);
        let geometry = ReadoutGeometry::from_area(&area, BitDepth::Eight);
        assert_eq!(geometry.width, 0);
        assert_eq!(geometry.rows, 60);
        assert_eq!(geometry.frame_bytes(), 0);
    }

    #[test]
    fn test_check_transfer() {
        assert!(check_transfer(16, 16).is_ok());
        let err = check_transfer(16, 12).expect_err("short transfer should fail");
        assert!(matches!(
            err,
            CameraError::TransferSizeMismatch {
                expected: 16,
                actual: 12
            }
        ));
    }

    #[test]
    fn test_pixel_access_sixteen_bit() {
        let geometry = ReadoutGeometry::new(2, 2, BitDepth::Sixteen);
        let mut bytes = Vec::new();
        for value in [1u16, 2, 3, 0xabcd] {
            bytes.extend_from_slice(&value.to_ne_bytes());
        }
        let image = ImageBuffer::from_bytes(geometry, bytes).expect("sizes match");
        assert_eq!(image.pixel(0, 0), Some(1));
        assert_eq!(image.pixel(1, 1), Some(0xabcd));
        assert_eq!(image.pixel(2, 0), None);
        assert_eq!(image.pixel(0, 2), None);
    }

    #[test]
    fn test_pixel_access_eight_bit() {
        let geometry = ReadoutGeometry::new(3, 1, BitDepth::Eight);
        let image = ImageBuffer::from_bytes(geometry, vec![9, 8, 7]).expect("sizes match");
        assert_eq!(image.pixel(2, 0), Some(7));
        assert_eq!(image.row(0), Some(&[9u8, 8, 7][..]));
    }

    #[test]
    fn test_from_bytes_rejects_wrong_size() {
        let geometry = ReadoutGeometry::new(4, 4, BitDepth::Sixteen);
        assert!(ImageBuffer::from_bytes(geometry, vec![0; 31]).is_err());
    }
}
