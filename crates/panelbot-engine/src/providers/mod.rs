//! Request builders for the two image backends. Each builder turns a prompt
//! and its references into one `RequestSpec`; sending, retrying and
//! response parsing are handled by `retry::RetryController`.

mod ark;
mod openai;
mod size;

use std::env;

pub use ark::{ArkImageRequest, ArkImages, ArkOptions, DEFAULT_ARK_ENDPOINT};
pub use openai::{EditReference, OpenAiImages, DEFAULT_OPENAI_API_BASE, DEFAULT_OPENAI_MODEL};
pub use size::{ark_size_token, format_dims, is_gpt_image_model, normalize_openai_size, parse_dims};

pub fn non_empty_env(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

/// First variable in `keys` that is set to something non-blank.
pub fn first_non_empty_env(keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| non_empty_env(key))
}
