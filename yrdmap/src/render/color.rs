use plotters::style::RGBColor;

use crate::error::MapError;

/// Named colors accepted in scale and style settings (matplotlib/CSS names)
const NAMED_COLORS: &[(&str, (u8, u8, u8))] = &[
    ("white", (255, 255, 255)),
    ("black", (0, 0, 0)),
    ("gray", (128, 128, 128)),
    ("grey", (128, 128, 128)),
    ("lightgray", (211, 211, 211)),
    ("darkred", (139, 0, 0)),
    ("red", (255, 0, 0)),
    ("tomato", (255, 99, 71)),
    ("lightsalmon", (255, 160, 122)),
    ("salmon", (250, 128, 114)),
    ("orange", (255, 165, 0)),
    ("yellow", (255, 255, 0)),
    ("green", (0, 128, 0)),
    ("cyan", (0, 255, 255)),
    ("deepskyblue", (0, 191, 255)),
    ("skyblue", (135, 206, 235)),
    ("blue", (0, 0, 255)),
    ("darkblue", (0, 0, 139)),
    ("navy", (0, 0, 128)),
];

/// Resolve a color name or `#rrggbb` hex string
pub fn parse_color(value: &str) -> Result<RGBColor, MapError> {
    let value = value.trim();
    if let Some(hex) = value.strip_prefix('#') {
        return parse_hex(hex).ok_or_else(|| MapError::UnknownColor(value.to_string()));
    }

    let lower = value.to_ascii_lowercase();
    NAMED_COLORS
        .iter()
        .find(|(name, _)| *name == lower)
        .map(|(_, (r, g, b))| RGBColor(*r, *g, *b))
        .ok_or_else(|| MapError::UnknownColor(value.to_string()))
}

fn parse_hex(hex: &str) -> Option<RGBColor> {
    if hex.len() != 6 || !hex.is_ascii() {
        return None;
    }
    let channel = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).ok();
    Some(RGBColor(channel(0)?, channel(2)?, channel(4)?))
}
