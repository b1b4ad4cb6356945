//! Screen capture and PNG encoding.
//!
//! Grabs the primary display once per call and converts the BGRA pixels
//! (stride may include padding) to packed RGB. Every failure here is
//! recoverable from the agent's point of view: it skips the tick and tries
//! again on the next one.

use std::io::{Cursor, ErrorKind};
use std::time::{Duration, Instant};

use image::codecs::png::PngEncoder;
use image::{ImageBuffer, RgbImage};
use scrap::{Capturer, Display};

use super::CapturedFrame;

/// How long to wait for the compositor to hand over a frame.
const FRAME_WAIT: Duration = Duration::from_secs(1);

#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    #[error("no display found: {0}")]
    NoDisplay(std::io::Error),
    #[error("failed to start capture: {0}")]
    StartCapture(std::io::Error),
    #[error("failed to read frame: {0}")]
    ReadFrame(std::io::Error),
    #[error("no frame became ready within {FRAME_WAIT:?}")]
    FrameTimeout,
    #[error("captured {0}x{1} frame has a mismatched pixel buffer")]
    BadDimensions(u32, u32),
    #[error("PNG encode failed: {0}")]
    Encode(#[from] image::ImageError),
}

/// Capture the primary display as packed RGB.
pub fn grab() -> Result<CapturedFrame, CaptureError> {
    let display = Display::primary().map_err(CaptureError::NoDisplay)?;
    let width = display.width();
    let height = display.height();

    let mut capturer = Capturer::new(display).map_err(CaptureError::StartCapture)?;
    let deadline = Instant::now() + FRAME_WAIT;

    loop {
        match capturer.frame() {
            Ok(frame) => {
                // scrap gives us BGRA pixels (stride may include padding)
                let stride = frame.len() / height;
                let rgb = bgra_to_rgb(&frame, width, height, stride);

                return Ok(CapturedFrame {
                    width: width as u32,
                    height: height as u32,
                    rgb,
                });
            }
            Err(ref e) if e.kind() == ErrorKind::WouldBlock => {
                // Frame not ready yet — just wait
                if Instant::now() >= deadline {
                    return Err(CaptureError::FrameTimeout);
                }

                std::thread::sleep(Duration::from_millis(5));
            }
            Err(e) => return Err(CaptureError::ReadFrame(e)),
        }
    }
}

/// PNG encode an RGB frame.
pub fn encode_png(frame: &CapturedFrame) -> Result<Vec<u8>, CaptureError> {
    let mut buf = Cursor::new(Vec::new());
    let encoder = PngEncoder::new(&mut buf);

    let img: RgbImage = ImageBuffer::from_raw(frame.width, frame.height, frame.rgb.clone())
        .ok_or(CaptureError::BadDimensions(frame.width, frame.height))?;

    img.write_with_encoder(encoder)?;

    Ok(buf.into_inner())
}

/// Capture the primary display and return it as PNG bytes.
pub fn grab_png() -> Result<Vec<u8>, CaptureError> {
    encode_png(&grab()?)
}

/// Convert a BGRA buffer to packed RGB, honoring the source row stride.
fn bgra_to_rgb(bgra: &[u8], width: usize, height: usize, stride: usize) -> Vec<u8> {
    let mut rgb = Vec::with_capacity(width * height * 3);

    for y in 0..height {
        for x in 0..width {
            let offset = y * stride + x * 4;
            if offset + 2 < bgra.len() {
                rgb.push(bgra[offset + 2]); // R (BGRA → R is at +2)
                rgb.push(bgra[offset + 1]); // G
                rgb.push(bgra[offset]); // B
            } else {
                rgb.extend_from_slice(&[0, 0, 0]);
            }
        }
    }

    rgb
}
