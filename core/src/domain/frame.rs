//! Raw frame model reported by protocol-session scanners.

/// Pixel layout of a raw frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameFormat {
    /// One sample per pixel.
    Gray,
    /// Interleaved red, green and blue samples.
    Rgb,
    /// A single colour plane of a three-pass scan.
    Red,
    Green,
    Blue,
}

impl FrameFormat {
    /// Samples per pixel in a single frame.
    pub fn channels(self) -> usize {
        match self {
            Self::Rgb => 3,
            _ => 1,
        }
    }
}

/// Geometry of a frame as reported by the device before reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameParameters {
    pub format: FrameFormat,
    pub last_frame: bool,
    /// Bytes per scan line, including any padding.
    pub bytes_per_line: usize,
    pub pixels_per_line: usize,
    pub lines: usize,
    /// Bits per sample: 1, 8 or 16.
    pub depth: u8,
}

impl FrameParameters {
    /// Size of the buffer that holds the whole frame.
    pub fn buffer_len(&self) -> usize {
        self.bytes_per_line.saturating_mul(self.lines)
    }

    /// Number of complete scan lines contained in the first `len` bytes.
    pub fn complete_lines(&self, len: usize) -> usize {
        if self.bytes_per_line == 0 {
            return 0;
        }
        (len / self.bytes_per_line).min(self.lines)
    }

    /// Parameters describing only the first `lines` lines of this frame.
    pub fn truncated(&self, lines: usize) -> Self {
        Self {
            lines: lines.min(self.lines),
            ..*self
        }
    }
}
