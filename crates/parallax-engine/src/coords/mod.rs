//! Pixel-space geometry shared by surfaces and the view cache.
//!
//! Window rectangles follow the window system convention:
//! - device pixels
//! - origin top-left of the screen
//! - +X right, +Y down
//!
//! The view cache converts these to image-plate metres (origin lower-left, +Y up).

mod rect;

pub use rect::PixelRect;
