//! Bounds-checked row addressing over a locked sample.

/// Row accessor honoring signed strides. A negative stride means the buffer
/// stores rows bottom-up, so the top image row is the last row in memory.
#[derive(Debug, Clone, Copy)]
pub struct RowView<'a> {
    bytes: &'a [u8],
    pitch: usize,
    /// Byte offset of image row 0 for bottom-up buffers
    top: Option<usize>,
}

impl<'a> RowView<'a> {
    /// `rows` is the image height the buffer is expected to hold.
    pub fn new(bytes: &'a [u8], stride: isize, rows: usize) -> Self {
        let pitch = stride.unsigned_abs();
        let top = if stride < 0 {
            let expected = rows.saturating_sub(1) * pitch;
            if expected < bytes.len() {
                Some(expected)
            } else if bytes.len() >= pitch {
                Some(bytes.len() - pitch)
            } else {
                Some(0)
            }
        } else {
            None
        };
        Self { bytes, pitch, top }
    }

    pub fn pitch(&self) -> usize {
        self.pitch
    }

    /// Up to `span` bytes of image row `y`. `None` when the row starts outside the buffer.
    pub fn row(&self, y: usize, span: usize) -> Option<&'a [u8]> {
        if self.pitch == 0 {
            return None;
        }
        let distance = y.checked_mul(self.pitch)?;
        let start = match self.top {
            Some(top) => top.checked_sub(distance)?,
            None => distance,
        };
        if start >= self.bytes.len() {
            return None;
        }
        let end = start.saturating_add(span).min(self.bytes.len());
        Some(&self.bytes[start..end])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_top_down_rows() {
        let bytes: Vec<u8> = (0..12).collect();
        let rows = RowView::new(&bytes, 4, 3);
        assert_eq!(rows.row(0, 4), Some(&bytes[0..4]));
        assert_eq!(rows.row(2, 4), Some(&bytes[8..12]));
        assert_eq!(rows.row(3, 4), None);
    }

    #[test]
    fn test_bottom_up_rows() {
        let bytes: Vec<u8> = (0..12).collect();
        let rows = RowView::new(&bytes, -4, 3);
        assert_eq!(rows.row(0, 4), Some(&bytes[8..12]));
        assert_eq!(rows.row(2, 4), Some(&bytes[0..4]));
        assert_eq!(rows.row(3, 4), None);
    }

    #[test]
    fn test_truncated_buffer_clips_rows() {
        let bytes = [1u8; 10];
        let rows = RowView::new(&bytes, 4, 3);
        assert_eq!(rows.row(2, 4).map(<[u8]>::len), Some(2));

        let rows = RowView::new(&bytes, -4, 4);
        // Expected top row lies past the end, so the last full row is used
        assert_eq!(rows.row(0, 4).map(<[u8]>::len), Some(4));
        assert_eq!(rows.row(1, 4).map(<[u8]>::len), Some(4));
        assert_eq!(rows.row(2, 4), None);
    }
}
