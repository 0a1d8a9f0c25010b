use serde::{Deserialize, Serialize};

/// Colour palette shared by every engine
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Palette {
    pub name: String,
    pub primary: String,
    pub secondary: String,
    pub text: String,
    pub background: String,
    pub accent: String,
}

/// Names of the built-in palettes
pub const THEME_NAMES: [&str; 4] = ["default", "dark", "vibrant", "minimal"];

impl Palette {
    /// Resolve a palette by name, falling back to `default`
    pub fn named(name: &str) -> Self {
        let (name, colors) = match name.to_lowercase().as_str() {
            "dark" => ("dark", ["#60a5fa", "#a78bfa", "#f8fafc", "#0f172a", "#f472b6"]),
            "vibrant" => ("vibrant", ["#f97316", "#8b5cf6", "#1f2937", "#fff7ed", "#10b981"]),
            "minimal" => ("minimal", ["#111827", "#6b7280", "#111827", "#ffffff", "#ef4444"]),
            _ => ("default", ["#2563eb", "#0ea5e9", "#1e293b", "#f8fafc", "#f59e0b"]),
        };
        let [primary, secondary, text, background, accent] = colors;

        Self {
            name: name.to_string(),
            primary: primary.to_string(),
            secondary: secondary.to_string(),
            text: text.to_string(),
            background: background.to_string(),
            accent: accent.to_string(),
        }
    }

    /// Cycle through the palette's chart colours
    pub fn series_color(&self, index: usize) -> &str {
        match index % 3 {
            0 => &self.primary,
            1 => &self.secondary,
            _ => &self.accent,
        }
    }
}

impl Default for Palette {
    fn default() -> Self {
        Self::named("default")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_palettes_are_distinct() {
        let palettes: Vec<Palette> = THEME_NAMES.iter().map(|n| Palette::named(n)).collect();
        for (i, a) in palettes.iter().enumerate() {
            assert_eq!(a.name, THEME_NAMES[i]);
            for b in palettes.iter().skip(i + 1) {
                assert_ne!(a.background, b.background);
            }
        }
    }

    #[test]
    fn test_unknown_theme_falls_back() {
        assert_eq!(Palette::named("neon-pink"), Palette::default());
        assert_eq!(Palette::named("DARK").name, "dark");
    }
}
