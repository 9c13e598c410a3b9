//! Tool response normalization.

mod display;
mod images;
mod normalize;
mod parts;

pub use display::{DisplayContent, DisplayImage, ImageResult, is_image_result};
pub use images::ImageStore;
pub use normalize::{
    NormalizedResult, content_blocks, normalize, summarize, to_display, to_model_parts,
};
pub use parts::{FileData, InlineData, Part};
