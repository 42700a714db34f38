// Deterministic color generator - assigns colors to series lacking explicit ones
use crate::error::{ChartError, ChartResult};
use std::collections::HashMap;
use std::hash::Hash;

pub const DEFAULT_BASE_COLORS: [&str; 8] = [
    "#4BD187", "#3ABDFF", "#FF9B45", "#9B6BFF", "#FF5A5F", "#F4D03F", "#1ABC9C", "#E26BD2",
];

/// Generates colors in a deterministic way. For a given key the same color is
/// returned for the whole lifetime of the generator instance (but not across
/// instances - assignment order matters).
#[derive(Debug, Clone)]
pub struct ColorGenerator<K = String> {
    base_colors: Vec<Rgb>,
    base_color_literals: Vec<String>,
    generated_colors_for_keys: HashMap<K, String>,
}

impl<K: Hash + Eq> ColorGenerator<K> {
    pub fn new<S: AsRef<str>>(base_colors: &[S]) -> ChartResult<Self> {
        if base_colors.is_empty() {
            return Err(ChartError::InvalidColorPalette(
                "at least one base color is required".to_string(),
            ));
        }
        let parsed = base_colors
            .iter()
            .map(|color| {
                Rgb::from_hex(color.as_ref()).ok_or_else(|| {
                    ChartError::InvalidColorPalette(format!("not a hex color: {}", color.as_ref()))
                })
            })
            .collect::<ChartResult<Vec<_>>>()?;

        Ok(Self {
            base_colors: parsed,
            base_color_literals: base_colors.iter().map(|c| c.as_ref().to_string()).collect(),
            generated_colors_for_keys: HashMap::new(),
        })
    }

    /// First `size` elements of the infinite, constant color sequence.
    pub fn generate_colors_array(&self, size: usize) -> Vec<String> {
        (0..size).map(|index| self.generate_color_for_index(index)).collect()
    }

    pub fn generate_color_for_key(&mut self, key: K) -> String {
        let next_index = self.generated_colors_for_keys.len();
        if let Some(color) = self.generated_colors_for_keys.get(&key) {
            return color.clone();
        }
        let color = self.generate_color_for_index(next_index);
        self.generated_colors_for_keys.insert(key, color.clone());
        color
    }

    fn generate_color_for_index(&self, index: usize) -> String {
        let base_count = self.base_colors.len();
        let main_color_idx = index % base_count;

        // Number of completed round-robins over the base colors.
        let shade_idx = index / base_count;

        // Shades are organized in levels. Level n holds 2^n shades with
        // brightnesses spread evenly between 0 and 1, none repeating a
        // brightness from a lower level:
        // level 0: 0.5 / level 1: 0.75, 0.25 / level 2: 0.875, 0.625, 0.375, 0.125
        let shade_level = (shade_idx + 1).ilog2();
        let shade_idx_in_level = (shade_idx + 1 - (1usize << shade_level)) as f64;

        let darkest_brightness_in_level = 1.0 / 2f64.powi(shade_level as i32 + 1);
        let brightness_diff_in_level = 1.0 / 2f64.powi(shade_level as i32);
        let shade_brightness =
            1.0 - (darkest_brightness_in_level + shade_idx_in_level * brightness_diff_in_level);

        // 0 means "no change". Extremely light/dark shades are cut off.
        let rescaled_brightness = (shade_brightness - 0.5) * 0.8;

        if rescaled_brightness == 0.0 {
            return self.base_color_literals[main_color_idx].clone();
        }

        let main_color = self.base_colors[main_color_idx];
        let shaded = if rescaled_brightness < 0.0 {
            main_color.darken(-rescaled_brightness)
        } else {
            main_color.lighten(rescaled_brightness)
        };
        shaded.to_hex()
    }
}

impl Default for ColorGenerator<String> {
    fn default() -> Self {
        Self {
            base_colors: DEFAULT_BASE_COLORS
                .iter()
                .filter_map(|color| Rgb::from_hex(color))
                .collect(),
            base_color_literals: DEFAULT_BASE_COLORS.iter().map(|c| c.to_string()).collect(),
            generated_colors_for_keys: HashMap::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Rgb {
    r: f64,
    g: f64,
    b: f64,
}

impl Rgb {
    fn from_hex(hex: &str) -> Option<Self> {
        let digits = hex.strip_prefix('#')?;
        if !digits.chars().all(|c| c.is_ascii_hexdigit()) {
            return None;
        }
        let channel = |s: &str| u8::from_str_radix(s, 16).ok().map(|v| v as f64 / 255.0);
        let expanded: String = match digits.len() {
            3 | 4 => digits.chars().take(3).flat_map(|c| [c, c]).collect(),
            6 | 8 => digits[..6].to_string(),
            _ => return None,
        };
        Some(Self {
            r: channel(&expanded[0..2])?,
            g: channel(&expanded[2..4])?,
            b: channel(&expanded[4..6])?,
        })
    }

    fn to_hex(self) -> String {
        let channel = |v: f64| (v.clamp(0.0, 1.0) * 255.0).round() as u8;
        format!(
            "#{:02X}{:02X}{:02X}",
            channel(self.r),
            channel(self.g),
            channel(self.b)
        )
    }

    fn to_hsl(self) -> (f64, f64, f64) {
        let max = self.r.max(self.g).max(self.b);
        let min = self.r.min(self.g).min(self.b);
        let lightness = (max + min) / 2.0;
        let delta = max - min;
        if delta == 0.0 {
            return (0.0, 0.0, lightness);
        }
        let saturation = if lightness <= 0.5 {
            delta / (max + min)
        } else {
            delta / (2.0 - max - min)
        };
        let hue = if max == self.r {
            (self.g - self.b) / delta
        } else if max == self.g {
            2.0 + (self.b - self.r) / delta
        } else {
            4.0 + (self.r - self.g) / delta
        };
        ((hue * 60.0).rem_euclid(360.0), saturation, lightness)
    }

    fn from_hsl(hue: f64, saturation: f64, lightness: f64) -> Self {
        let lightness = lightness.clamp(0.0, 1.0);
        if saturation == 0.0 {
            return Self {
                r: lightness,
                g: lightness,
                b: lightness,
            };
        }
        let q = if lightness < 0.5 {
            lightness * (1.0 + saturation)
        } else {
            lightness + saturation - lightness * saturation
        };
        let p = 2.0 * lightness - q;
        let h = hue / 360.0;
        let channel = |t: f64| {
            let t = t.rem_euclid(1.0);
            if t < 1.0 / 6.0 {
                p + (q - p) * 6.0 * t
            } else if t < 0.5 {
                q
            } else if t < 2.0 / 3.0 {
                p + (q - p) * (2.0 / 3.0 - t) * 6.0
            } else {
                p
            }
        };
        Self {
            r: channel(h + 1.0 / 3.0),
            g: channel(h),
            b: channel(h - 1.0 / 3.0),
        }
    }

    fn lighten(self, ratio: f64) -> Self {
        let (h, s, l) = self.to_hsl();
        Self::from_hsl(h, s, l + l * ratio)
    }

    fn darken(self, ratio: f64) -> Self {
        let (h, s, l) = self.to_hsl();
        Self::from_hsl(h, s, l - l * ratio)
    }
}
