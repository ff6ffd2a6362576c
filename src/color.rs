use log::warn;
use palette::{Hsl, IntoColor, LinSrgb, Mix, Srgb};
use plotters::style::RGBColor;

// ---------------------------------------------------------------------------
// Named palettes
// ---------------------------------------------------------------------------

/// Plotly's default qualitative sequence.
const PLOTLY: [(u8, u8, u8); 10] = [
    (0x63, 0x6E, 0xFA),
    (0xEF, 0x55, 0x3B),
    (0x00, 0xCC, 0x96),
    (0xAB, 0x63, 0xFA),
    (0xFF, 0xA1, 0x5A),
    (0x19, 0xD3, 0xF3),
    (0xFF, 0x66, 0x92),
    (0xB6, 0xE8, 0x80),
    (0xFF, 0x97, 0xFF),
    (0xFE, 0xCB, 0x52),
];

const VIRIDIS: [(u8, u8, u8); 5] = [
    (0x44, 0x01, 0x54),
    (0x3B, 0x52, 0x8B),
    (0x21, 0x91, 0x8C),
    (0x5E, 0xC9, 0x62),
    (0xFD, 0xE7, 0x25),
];

const PLASMA: [(u8, u8, u8); 5] = [
    (0x0D, 0x08, 0x87),
    (0x7E, 0x03, 0xA8),
    (0xCC, 0x47, 0x78),
    (0xF8, 0x95, 0x40),
    (0xF0, 0xF9, 0x21),
];

const BLUES: [(u8, u8, u8); 4] = [
    (0xC6, 0xDB, 0xEF),
    (0x6B, 0xAE, 0xD6),
    (0x21, 0x71, 0xB5),
    (0x08, 0x30, 0x6B),
];

/// Colour scheme for series, slices and bars.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Palette {
    /// Fixed qualitative sequence, repeated when exhausted.
    #[default]
    Plotly,
    /// Evenly spaced hues.
    Hue,
    Pastel,
    Dark,
    /// Continuous scales sampled at `n` evenly spaced points.
    Viridis,
    Plasma,
    Blues,
}

impl Palette {
    pub const ALL: [Palette; 7] = [
        Palette::Plotly,
        Palette::Hue,
        Palette::Pastel,
        Palette::Dark,
        Palette::Viridis,
        Palette::Plasma,
        Palette::Blues,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Palette::Plotly => "plotly",
            Palette::Hue => "hue",
            Palette::Pastel => "pastel",
            Palette::Dark => "dark",
            Palette::Viridis => "viridis",
            Palette::Plasma => "plasma",
            Palette::Blues => "blues",
        }
    }

    /// Case-insensitive lookup by name.
    pub fn from_name(name: &str) -> Option<Self> {
        let name = name.trim();
        Palette::ALL
            .into_iter()
            .find(|p| p.name().eq_ignore_ascii_case(name))
    }

    /// Resolve a requested palette, falling back when the name is unknown.
    pub fn resolve(requested: Option<&str>, fallback: Palette) -> Palette {
        match requested {
            None => fallback,
            Some(name) => Palette::from_name(name).unwrap_or_else(|| {
                warn!("unknown palette '{name}', using '{}'", fallback.name());
                fallback
            }),
        }
    }

    /// `n` colours from this palette.
    pub fn colors(self, n: usize) -> Vec<RGBColor> {
        if n == 0 {
            return Vec::new();
        }
        match self {
            Palette::Plotly => PLOTLY
                .iter()
                .cycle()
                .take(n)
                .map(|&(r, g, b)| RGBColor(r, g, b))
                .collect(),
            Palette::Hue => generate_hues(n, 0.75, 0.55),
            Palette::Pastel => generate_hues(n, 0.60, 0.78),
            Palette::Dark => generate_hues(n, 0.65, 0.35),
            Palette::Viridis => sample_scale(&VIRIDIS, n),
            Palette::Plasma => sample_scale(&PLASMA, n),
            Palette::Blues => sample_scale(&BLUES, n),
        }
    }
}

// ---------------------------------------------------------------------------
// Generators
// ---------------------------------------------------------------------------

/// `n` visually distinct colours using evenly spaced hues.
fn generate_hues(n: usize, saturation: f32, lightness: f32) -> Vec<RGBColor> {
    (0..n)
        .map(|i| {
            let hue = (i as f32 / n as f32) * 360.0;
            let hsl = Hsl::new(hue, saturation, lightness);
            let rgb: Srgb = hsl.into_color();
            RGBColor(
                (rgb.red * 255.0) as u8,
                (rgb.green * 255.0) as u8,
                (rgb.blue * 255.0) as u8,
            )
        })
        .collect()
}

/// Sample a piecewise-linear scale (interpolated in linear RGB).
fn sample_scale(stops: &[(u8, u8, u8)], n: usize) -> Vec<RGBColor> {
    let linear: Vec<LinSrgb> = stops
        .iter()
        .map(|&(r, g, b)| Srgb::new(r, g, b).into_format::<f32>().into_linear())
        .collect();
    let segments = (linear.len() - 1) as f32;

    (0..n)
        .map(|i| {
            let t = if n == 1 {
                0.5
            } else {
                i as f32 / (n - 1) as f32
            };
            let pos = t * segments;
            let lower = (pos.floor() as usize).min(linear.len() - 2);
            let mixed = linear[lower].mix(linear[lower + 1], pos - lower as f32);
            let rgb: Srgb<u8> = Srgb::from_linear(mixed);
            RGBColor(rgb.red, rgb.green, rgb.blue)
        })
        .collect()
}
