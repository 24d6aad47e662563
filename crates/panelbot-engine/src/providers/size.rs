const DALL_E_2_SIZES: &[&str] = &["256x256", "512x512", "1024x1024"];
const FALLBACK_SIZE: &str = "1024x1024";
const DEFAULT_ARK_TOKEN: &str = "2K";

pub fn parse_dims(size: &str) -> Option<(u32, u32)> {
    let raw = size.trim().to_ascii_lowercase();
    let (w, h) = raw.split_once('x')?;
    let width = w.trim().parse::<u32>().ok()?;
    let height = h.trim().parse::<u32>().ok()?;
    Some((width.max(1), height.max(1)))
}

pub fn format_dims(width: u32, height: u32) -> String {
    format!("{width}x{height}")
}

pub fn is_gpt_image_model(model: &str) -> bool {
    model.trim().to_ascii_lowercase().starts_with("gpt-image-")
}

pub fn is_dall_e_2(model: &str) -> bool {
    model.trim().eq_ignore_ascii_case("dall-e-2")
}

/// DALL·E-2 only accepts three square sizes; every other model gets the
/// requested size untouched.
pub fn normalize_openai_size(model: &str, raw: &str) -> String {
    let normalized = raw.trim().to_ascii_lowercase();
    if is_dall_e_2(model) && !DALL_E_2_SIZES.contains(&normalized.as_str()) {
        return FALLBACK_SIZE.to_string();
    }
    if normalized.is_empty() {
        return FALLBACK_SIZE.to_string();
    }
    normalized
}

/// Maps `WxH` to the largest coarse token whose edge does not exceed the long
/// edge. Anything that is not a dimension string is passed through.
pub fn ark_size_token(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return DEFAULT_ARK_TOKEN.to_string();
    }
    match parse_dims(trimmed) {
        Some((width, height)) => {
            let long_edge = width.max(height);
            let token = if long_edge >= 4096 {
                "4K"
            } else if long_edge >= 2048 {
                "2K"
            } else {
                "1K"
            };
            token.to_string()
        }
        None if trimmed.to_ascii_lowercase().contains('x') => DEFAULT_ARK_TOKEN.to_string(),
        None => trimmed.to_string(),
    }
}
