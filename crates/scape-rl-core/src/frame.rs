//! Frame headers and RGB frame payloads

use crate::error::{Result, ScapeRLError};

/// Header line announcing a transient "not yet capturable" condition.
/// Only valid as a response to `FRAME`/`STEP`; the client retries it.
pub const NOT_CAPTURABLE: &str = "ERR no-headless";

/// Number of colour channels in every frame (RGB)
pub const FRAME_CHANNELS: u32 = 3;

/// Sanity cap on frame payloads (64 MB)
const MAX_FRAME_BYTES: usize = 64 * 1024 * 1024;

/// Parsed `FRAME w h c len` header line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub width: u32,
    pub height: u32,
    pub channels: u32,
    pub len: usize,
}

impl FrameHeader {
    /// Parse a frame header line.
    ///
    /// The line must be `FRAME <width> <height> <channels> <len>` with
    /// exactly three channels and a payload length matching the geometry.
    pub fn parse(line: &str) -> Result<Self> {
        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.len() < 5 || parts[0] != "FRAME" {
            return Err(ScapeRLError::Protocol(format!("bad frame header: {line}")));
        }

        fn field<T: std::str::FromStr>(raw: &str, name: &str) -> Result<T> {
            raw.parse()
                .map_err(|_| ScapeRLError::Protocol(format!("bad frame field {name}: {raw}")))
        }

        let header = Self {
            width: field(parts[1], "width")?,
            height: field(parts[2], "height")?,
            channels: field(parts[3], "channels")?,
            len: field(parts[4], "len")?,
        };

        if header.channels != FRAME_CHANNELS {
            return Err(ScapeRLError::Protocol(format!(
                "unexpected channel count: {}",
                header.channels
            )));
        }
        let expected =
            header.width as u64 * header.height as u64 * header.channels as u64;
        if header.len as u64 != expected || header.len > MAX_FRAME_BYTES {
            return Err(ScapeRLError::Protocol(format!(
                "frame length {} does not match {}x{}x{}",
                header.len, header.width, header.height, header.channels
            )));
        }

        Ok(header)
    }
}

/// One rendered snapshot of the simulation output.
///
/// Row-major RGB bytes, `data.len() == width * height * 3`. Consumed once
/// per step; never cached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    pub channels: u32,
    pub data: Vec<u8>,
}

impl Frame {
    /// Build a frame from a validated header and its payload bytes.
    pub fn from_parts(header: FrameHeader, data: Vec<u8>) -> Result<Self> {
        if data.len() != header.len {
            return Err(ScapeRLError::Protocol(format!(
                "frame payload {} bytes, header says {}",
                data.len(),
                header.len
            )));
        }
        Ok(Self {
            width: header.width,
            height: header.height,
            channels: header.channels,
            data,
        })
    }

    /// Nearest-neighbour resize to `out_w` x `out_h`.
    pub fn resize_nearest(&self, out_w: u32, out_h: u32) -> Frame {
        let mut data = Vec::with_capacity((out_w * out_h * self.channels) as usize);
        let c = self.channels as usize;

        // Sample positions are spread evenly over [0, dim-1], truncating
        // like an integer cast of a linspace.
        let src_index = |out: u32, out_dim: u32, src_dim: u32| -> usize {
            if out_dim <= 1 {
                return 0;
            }
            ((out as u64 * (src_dim as u64 - 1)) / (out_dim as u64 - 1)) as usize
        };

        for y in 0..out_h {
            let sy = src_index(y, out_h, self.height);
            for x in 0..out_w {
                let sx = src_index(x, out_w, self.width);
                let offset = (sy * self.width as usize + sx) * c;
                data.extend_from_slice(&self.data[offset..offset + c]);
            }
        }

        Frame {
            width: out_w,
            height: out_h,
            channels: self.channels,
            data,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_valid_header() {
        let header = FrameHeader::parse("FRAME 765 503 3 1154385").unwrap();
        assert_eq!(header.width, 765);
        assert_eq!(header.height, 503);
        assert_eq!(header.channels, 3);
        assert_eq!(header.len, 765 * 503 * 3);
    }

    #[test]
    fn test_parse_rejects_wrong_token() {
        assert!(matches!(
            FrameHeader::parse("STATE 765 503 3 1154385"),
            Err(ScapeRLError::Protocol(_))
        ));
    }

    #[test]
    fn test_parse_rejects_short_header() {
        assert!(matches!(
            FrameHeader::parse("FRAME 765 503 3"),
            Err(ScapeRLError::Protocol(_))
        ));
    }

    #[test]
    fn test_parse_rejects_wrong_channel_count() {
        assert!(matches!(
            FrameHeader::parse("FRAME 10 10 4 400"),
            Err(ScapeRLError::Protocol(_))
        ));
    }

    #[test]
    fn test_parse_rejects_length_mismatch() {
        assert!(matches!(
            FrameHeader::parse("FRAME 10 10 3 299"),
            Err(ScapeRLError::Protocol(_))
        ));
    }

    #[test]
    fn test_from_parts_rejects_short_payload() {
        let header = FrameHeader::parse("FRAME 2 2 3 12").unwrap();
        assert!(matches!(
            Frame::from_parts(header, vec![0; 11]),
            Err(ScapeRLError::Protocol(_))
        ));
    }

    #[test]
    fn test_resize_preserves_corners() {
        // 2x2 frame with distinct corner colours
        let header = FrameHeader::parse("FRAME 2 2 3 12").unwrap();
        let data = vec![
            10, 10, 10, 20, 20, 20, // top row
            30, 30, 30, 40, 40, 40, // bottom row
        ];
        let frame = Frame::from_parts(header, data).unwrap();

        let resized = frame.resize_nearest(4, 4);
        assert_eq!(resized.width, 4);
        assert_eq!(resized.height, 4);
        assert_eq!(resized.data.len(), 4 * 4 * 3);
        // Corners keep their source colours
        assert_eq!(&resized.data[0..3], &[10, 10, 10]);
        assert_eq!(&resized.data[(3 * 3)..(3 * 3) + 3], &[20, 20, 20]);
        let last = resized.data.len() - 3;
        assert_eq!(&resized.data[last..], &[40, 40, 40]);
    }
}
