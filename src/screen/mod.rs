pub mod capture;

pub use capture::grab_png;

/// One captured screen in packed RGB, no row padding.
#[derive(Debug, Clone)]
pub struct CapturedFrame {
    pub width: u32,
    pub height: u32,
    /// `width * height * 3` bytes, RGB order.
    pub rgb: Vec<u8>,
}
