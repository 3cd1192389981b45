/// RAW image processing module
///
/// This module handles:
/// - Decoding sensor data and developing it to RGB (loader.rs)
/// - Sizing developed images for previews (processor.rs)
/// - Encoding and writing previews to disk (preview.rs)

pub mod loader;
pub mod preview;
pub mod processor;
