//! Local image post-processing: letterboxing, tri-panel pages, speech
//! bubbles and the encoders used before images leave the process.

mod bubble;
mod encode;
mod layout;
mod letterbox;
mod typeface;

pub use bubble::{draw_bubble, fit_caption, BubbleBox, BubbleStyle, CaptionFit};
pub use encode::{
    compress_jpeg, decode_grayscale, encode_jpeg, encode_png, png_under_cap, JpegBudget,
    PNG_EDIT_CAP_BYTES,
};
pub use layout::{draw_panel_border, PanelRect, TriPanelLayout, DEFAULT_BORDER, DEFAULT_GAP};
pub use letterbox::letterbox;
pub use typeface::{BlockFace, OutlineFace, Typeface};
