//! Resolved style attributes and color parsing

use crate::error::StyleError;
use indexmap::IndexMap;

/// Ordered property -> value mapping produced by the cascade
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AttributeSet {
    values: IndexMap<String, String>,
}

impl AttributeSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a property; an override keeps the property's original position
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.values.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn get_f64(&self, key: &str) -> Result<Option<f64>, StyleError> {
        self.get(key)
            .map(|v| {
                v.trim_end_matches('m')
                    .trim()
                    .parse::<f64>()
                    .ok()
                    .filter(|n| n.is_finite())
                    .ok_or_else(|| invalid(key, v))
            })
            .transpose()
    }

    pub fn get_bool(&self, key: &str) -> Result<Option<bool>, StyleError> {
        self.get(key)
            .map(|v| match v.to_ascii_lowercase().as_str() {
                "true" | "yes" | "1" => Ok(true),
                "false" | "no" | "0" => Ok(false),
                _ => Err(invalid(key, v)),
            })
            .transpose()
    }

    pub fn get_color(&self, key: &str) -> Result<Option<[f32; 4]>, StyleError> {
        self.get(key)
            .map(|v| parse_color(v).ok_or_else(|| invalid(key, v)))
            .transpose()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Flatten into `key=value` tokens in cascade order
    pub fn to_tokens(&self) -> Vec<String> {
        self.iter().map(|(k, v)| format!("{}={}", k, v)).collect()
    }
}

fn invalid(key: &str, value: &str) -> StyleError {
    StyleError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
    }
}

/// Parse `#rgb`, `#rrggbb`, `#rrggbbaa`, `rgb(r, g, b)`, `rgba(r, g, b, a)` or a named color
///
/// Channels are normalized to 0..1; `rgba` alpha is already 0..1.
pub fn parse_color(value: &str) -> Option<[f32; 4]> {
    let value = value.trim().to_ascii_lowercase();

    if let Some(hex) = value.strip_prefix('#') {
        return parse_hex(hex);
    }

    if let Some(args) = value.strip_prefix("rgba(").and_then(|v| v.strip_suffix(')')) {
        let parts: Vec<f32> = args.split(',').map(|p| p.trim().parse::<f32>().ok()).collect::<Option<_>>()?;
        if parts.len() != 4 {
            return None;
        }
        return Some([parts[0] / 255.0, parts[1] / 255.0, parts[2] / 255.0, parts[3].clamp(0.0, 1.0)]);
    }

    if let Some(args) = value.strip_prefix("rgb(").and_then(|v| v.strip_suffix(')')) {
        let parts: Vec<f32> = args.split(',').map(|p| p.trim().parse::<f32>().ok()).collect::<Option<_>>()?;
        if parts.len() != 3 {
            return None;
        }
        return Some([parts[0] / 255.0, parts[1] / 255.0, parts[2] / 255.0, 1.0]);
    }

    named_color(&value)
}

fn parse_hex(hex: &str) -> Option<[f32; 4]> {
    let channel = |s: &str| u8::from_str_radix(s, 16).ok().map(|v| v as f32 / 255.0);
    match hex.len() {
        3 => {
            let mut rgb = [0.0; 3];
            for (i, c) in hex.chars().enumerate() {
                rgb[i] = channel(&format!("{}{}", c, c))?;
            }
            Some([rgb[0], rgb[1], rgb[2], 1.0])
        }
        6 | 8 => {
            let r = channel(hex.get(0..2)?)?;
            let g = channel(hex.get(2..4)?)?;
            let b = channel(hex.get(4..6)?)?;
            let a = if hex.len() == 8 { channel(hex.get(6..8)?)? } else { 1.0 };
            Some([r, g, b, a])
        }
        _ => None,
    }
}

fn named_color(name: &str) -> Option<[f32; 4]> {
    let rgb: [u8; 3] = match name {
        "black" => [0, 0, 0],
        "white" => [255, 255, 255],
        "gray" | "grey" => [128, 128, 128],
        "silver" => [192, 192, 192],
        "red" => [255, 0, 0],
        "green" => [0, 128, 0],
        "blue" => [0, 0, 255],
        "yellow" => [255, 255, 0],
        "orange" => [255, 165, 0],
        "brown" => [165, 42, 42],
        "tan" => [210, 180, 140],
        "darkgreen" => [0, 100, 0],
        "lightblue" => [173, 216, 230],
        "steelblue" => [70, 130, 180],
        _ => return None,
    };
    Some([rgb[0] as f32 / 255.0, rgb[1] as f32 / 255.0, rgb[2] as f32 / 255.0, 1.0])
}

/// Pack a normalized color as `0xRRGGBBAA`
pub fn pack_color(color: [f32; 4]) -> u32 {
    let channel = |v: f32| (v.clamp(0.0, 1.0) * 255.0).round() as u32;
    (channel(color[0]) << 24) | (channel(color[1]) << 16) | (channel(color[2]) << 8) | channel(color[3])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_hex_colors() {
        assert_eq!(parse_color("#ff0000"), Some([1.0, 0.0, 0.0, 1.0]));
        assert_eq!(parse_color("#fff"), Some([1.0, 1.0, 1.0, 1.0]));
        assert_eq!(parse_color("#00000000"), Some([0.0, 0.0, 0.0, 0.0]));
        assert_eq!(parse_color("#12345"), None);
        assert_eq!(parse_color("#gg0000"), None);
    }

    #[test]
    fn test_parse_functional_and_named_colors() {
        assert_eq!(parse_color("rgb(255, 0, 255)"), Some([1.0, 0.0, 1.0, 1.0]));
        assert_eq!(parse_color("rgba(0, 0, 0, 0.5)"), Some([0.0, 0.0, 0.0, 0.5]));
        assert_eq!(parse_color("White"), Some([1.0, 1.0, 1.0, 1.0]));
        assert_eq!(parse_color("chartreuse-ish"), None);
    }

    #[test]
    fn test_pack_color() {
        assert_eq!(pack_color([1.0, 0.0, 0.0, 1.0]), 0xFF0000FF);
        assert_eq!(pack_color([0.0, 0.0, 1.0, 0.0]), 0x0000FF00);
    }

    #[test]
    fn test_attribute_overrides_keep_position() {
        let mut attrs = AttributeSet::new();
        attrs.set("fill-color", "#000");
        attrs.set("width", "2");
        attrs.set("fill-color", "#fff");
        assert_eq!(attrs.to_tokens(), vec!["fill-color=#fff", "width=2"]);
    }

    #[test]
    fn test_typed_accessors() {
        let mut attrs = AttributeSet::new();
        attrs.set("width", "3.5m");
        attrs.set("relief", "yes");
        attrs.set("fill-color", "nope");
        assert_eq!(attrs.get_f64("width").unwrap(), Some(3.5));
        assert_eq!(attrs.get_bool("relief").unwrap(), Some(true));
        assert_eq!(attrs.get_f64("radius").unwrap(), None);
        assert!(attrs.get_color("fill-color").is_err());
    }
}
