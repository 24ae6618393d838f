//! Terminal color capabilities
//!
//! - `ColorMode`: ordered capability level of the destination terminal
//! - `quantize`: map a packed `0x00RRGGBB` pixel to what the terminal can show
//! - `color_escape`: SGR sequence for a quantized color
//! - `detect_color_mode`: best guess from the environment variables

use std::collections::HashMap;

use crossterm::style::Color;

/// Color depth supported by the terminal
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ColorMode {
    NoColor = 0,
    Grey4 = 1,
    Color16 = 2,
    Color256 = 3,
    TrueColor = 4,
}

impl ColorMode {
    /// Numeric level as used on the command line (1-4)
    pub fn from_level(level: u8) -> Option<Self> {
        match level {
            0 => Some(Self::NoColor),
            1 => Some(Self::Grey4),
            2 => Some(Self::Color16),
            3 => Some(Self::Color256),
            4 => Some(Self::TrueColor),
            _ => None,
        }
    }

    /// Parse a configuration name. `"auto"` yields `None`.
    pub fn from_name(name: &str) -> Option<Option<Self>> {
        match name.to_lowercase().as_str() {
            "auto" | "" => Some(None),
            "none" | "no-color" => Some(Some(Self::NoColor)),
            "grey" | "gray" | "greyscale" | "2bit" => Some(Some(Self::Grey4)),
            "16" | "4bit" => Some(Some(Self::Color16)),
            "256" | "8bit" => Some(Some(Self::Color256)),
            "truecolor" | "24bit" | "rgb" => Some(Some(Self::TrueColor)),
            other => other.parse::<u8>().ok().and_then(Self::from_level).map(Some),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::NoColor => "no color",
            Self::Grey4 => "greyscale",
            Self::Color16 => "16 colors",
            Self::Color256 => "256 colors",
            Self::TrueColor => "24-bit colors",
        }
    }
}

#[inline]
fn split_rgb(raw: u32) -> (u8, u8, u8) {
    ((raw >> 16) as u8, (raw >> 8) as u8, raw as u8)
}

#[inline]
fn distance(a: (u8, u8, u8), b: (u8, u8, u8)) -> u32 {
    let dr = a.0 as i32 - b.0 as i32;
    let dg = a.1 as i32 - b.1 as i32;
    let db = a.2 as i32 - b.2 as i32;
    (dr * dr + dg * dg + db * db) as u32
}

/// xterm default values of the 16 basic colors
const BASIC_PALETTE: [(u8, u8, u8); 16] = [
    (0, 0, 0),
    (205, 0, 0),
    (0, 205, 0),
    (205, 205, 0),
    (0, 0, 238),
    (205, 0, 205),
    (0, 205, 205),
    (229, 229, 229),
    (127, 127, 127),
    (255, 0, 0),
    (0, 255, 0),
    (255, 255, 0),
    (92, 92, 255),
    (255, 0, 255),
    (0, 255, 255),
    (255, 255, 255),
];

const BASIC_COLORS: [Color; 16] = [
    Color::Black,
    Color::DarkRed,
    Color::DarkGreen,
    Color::DarkYellow,
    Color::DarkBlue,
    Color::DarkMagenta,
    Color::DarkCyan,
    Color::Grey,
    Color::DarkGrey,
    Color::Red,
    Color::Green,
    Color::Yellow,
    Color::Blue,
    Color::Magenta,
    Color::Cyan,
    Color::White,
];

/// Channel levels of the 6x6x6 cube in the 256-color palette
const CUBE_LEVELS: [u8; 6] = [0, 95, 135, 175, 215, 255];

fn cube_index(v: u8) -> usize {
    if v < 48 {
        0
    } else if v < 115 {
        1
    } else {
        ((v - 35) / 40) as usize
    }
}

fn nearest_256(rgb: (u8, u8, u8)) -> u8 {
    let (ri, gi, bi) = (cube_index(rgb.0), cube_index(rgb.1), cube_index(rgb.2));
    let cube = (CUBE_LEVELS[ri], CUBE_LEVELS[gi], CUBE_LEVELS[bi]);
    let cube_code = 16 + 36 * ri + 6 * gi + bi;

    let average = (rgb.0 as u32 + rgb.1 as u32 + rgb.2 as u32) / 3;
    let grey_index = if average > 238 {
        23
    } else {
        average.saturating_sub(3) / 10
    };
    let level = (8 + 10 * grey_index) as u8;
    let grey_code = 232 + grey_index as usize;

    if distance(rgb, (level, level, level)) < distance(rgb, cube) {
        grey_code as u8
    } else {
        cube_code as u8
    }
}

fn nearest_16(rgb: (u8, u8, u8)) -> usize {
    let mut best = 0;
    let mut best_distance = u32::MAX;
    for (index, entry) in BASIC_PALETTE.iter().enumerate() {
        let d = distance(rgb, *entry);
        if d < best_distance {
            best = index;
            best_distance = d;
        }
    }
    best
}

fn grey_level(rgb: (u8, u8, u8)) -> Color {
    let luma = (299 * rgb.0 as u32 + 587 * rgb.1 as u32 + 114 * rgb.2 as u32) / 1000;
    match luma {
        0..=63 => Color::Black,
        64..=127 => Color::DarkGrey,
        128..=191 => Color::Grey,
        _ => Color::White,
    }
}

/// Map a packed pixel to the closest color the terminal can display.
///
/// Pure and deterministic in `(raw, mode)`.
pub fn quantize(raw: u32, mode: ColorMode) -> Color {
    let rgb = split_rgb(raw);
    match mode {
        ColorMode::NoColor => Color::Reset,
        ColorMode::Grey4 => grey_level(rgb),
        ColorMode::Color16 => BASIC_COLORS[nearest_16(rgb)],
        ColorMode::Color256 => Color::AnsiValue(nearest_256(rgb)),
        ColorMode::TrueColor => Color::Rgb {
            r: rgb.0,
            g: rgb.1,
            b: rgb.2,
        },
    }
}

/// SGR sequence selecting `color` as foreground or background.
///
/// The 16 basic colors get the classic codes (30-37, 90-97 and 40-47,
/// 100-107), readable by terminals without a 256-color palette. The
/// `NO_COLOR` variable is not consulted.
pub fn color_escape(color: Color, background: bool) -> String {
    let base = if background { 40 } else { 30 };
    match color {
        Color::Rgb { r, g, b } => format!("\x1b[{};2;{};{};{}m", base + 8, r, g, b),
        Color::AnsiValue(n) => format!("\x1b[{};5;{}m", base + 8, n),
        named => match BASIC_COLORS.iter().position(|c| *c == named) {
            Some(n) if n < 8 => format!("\x1b[{}m", base + n),
            Some(n) => format!("\x1b[{}m", base + 60 + n - 8),
            None => format!("\x1b[{}m", base + 9),
        },
    }
}

/// `$TERM` fragments of terminals known to handle the 16 basic colors
const BASIC_TERMINALS: [&str; 9] = [
    "screen", "xterm", "vt100", "vt220", "rxvt", "color", "ansi", "cygwin", "linux",
];

/// Guess the color mode from environment variables
pub fn detect_color_mode(env: &HashMap<String, String>) -> ColorMode {
    let get = |key: &str| env.get(key).map(|v| v.to_lowercase()).unwrap_or_default();
    let term = get("TERM");
    let colorterm = get("COLORTERM");
    let term_program = get("TERM_PROGRAM");
    let term_program_version = get("TERM_PROGRAM_VERSION");
    let con_emu_ansi = get("ConEmuANSI");

    if colorterm.contains("truecolor") || colorterm.contains("24bit") {
        return ColorMode::TrueColor;
    }
    if con_emu_ansi == "on" {
        return ColorMode::TrueColor;
    }
    if term_program == "apple_terminal" {
        return ColorMode::Color256;
    }
    if term_program == "iterm.app" {
        let major = term_program_version
            .split('.')
            .next()
            .and_then(|v| v.parse::<u32>().ok());
        return match major {
            Some(v) if v >= 3 => ColorMode::TrueColor,
            _ => ColorMode::Color256,
        };
    }
    if term.contains("256") || colorterm.contains("256") {
        return ColorMode::Color256;
    }
    if BASIC_TERMINALS.iter().any(|t| term.contains(t)) {
        return ColorMode::Color16;
    }
    if !colorterm.is_empty() {
        return ColorMode::Color16;
    }
    ColorMode::NoColor
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_mode_ordering() {
        assert!(ColorMode::NoColor < ColorMode::Grey4);
        assert!(ColorMode::Grey4 < ColorMode::Color16);
        assert!(ColorMode::Color256 < ColorMode::TrueColor);
        assert_eq!(ColorMode::from_level(4), Some(ColorMode::TrueColor));
        assert_eq!(ColorMode::from_level(9), None);
        assert_eq!(ColorMode::from_name("auto"), Some(None));
        assert_eq!(ColorMode::from_name("256"), Some(Some(ColorMode::Color256)));
        assert_eq!(ColorMode::from_name("2"), Some(Some(ColorMode::Color16)));
        assert_eq!(ColorMode::from_name("sepia"), None);
    }

    #[test]
    fn test_truecolor_passthrough() {
        assert_eq!(
            quantize(0x123456, ColorMode::TrueColor),
            Color::Rgb { r: 0x12, g: 0x34, b: 0x56 }
        );
    }

    #[test]
    fn test_256_palette() {
        assert_eq!(quantize(0x000000, ColorMode::Color256), Color::AnsiValue(16));
        assert_eq!(quantize(0xff0000, ColorMode::Color256), Color::AnsiValue(196));
        assert_eq!(quantize(0xffffff, ColorMode::Color256), Color::AnsiValue(231));
        // Mid grey lands on the grey ramp rather than the cube
        assert_eq!(quantize(0x808080, ColorMode::Color256), Color::AnsiValue(244));
    }

    #[test]
    fn test_16_palette() {
        assert_eq!(quantize(0x000000, ColorMode::Color16), Color::Black);
        assert_eq!(quantize(0xff0000, ColorMode::Color16), Color::Red);
        assert_eq!(quantize(0xc80000, ColorMode::Color16), Color::DarkRed);
        assert_eq!(quantize(0xffffff, ColorMode::Color16), Color::White);
    }

    #[test]
    fn test_grey_levels() {
        assert_eq!(quantize(0x000000, ColorMode::Grey4), Color::Black);
        assert_eq!(quantize(0x606060, ColorMode::Grey4), Color::DarkGrey);
        assert_eq!(quantize(0xa0a0a0, ColorMode::Grey4), Color::Grey);
        assert_eq!(quantize(0xffffff, ColorMode::Grey4), Color::White);
    }

    #[test]
    fn test_color_escapes() {
        assert_eq!(color_escape(Color::Black, false), "\x1b[30m");
        assert_eq!(color_escape(Color::Grey, true), "\x1b[47m");
        assert_eq!(color_escape(Color::DarkGrey, false), "\x1b[90m");
        assert_eq!(color_escape(Color::White, true), "\x1b[107m");
        assert_eq!(color_escape(Color::AnsiValue(196), false), "\x1b[38;5;196m");
        assert_eq!(
            color_escape(Color::Rgb { r: 1, g: 2, b: 3 }, true),
            "\x1b[48;2;1;2;3m"
        );
        assert_eq!(color_escape(Color::Reset, false), "\x1b[39m");
    }

    #[test]
    fn test_quantize_is_deterministic() {
        let modes = [
            ColorMode::Grey4,
            ColorMode::Color16,
            ColorMode::Color256,
            ColorMode::TrueColor,
        ];
        for raw in (0..=0xffffffu32).step_by(0x010307) {
            for mode in modes {
                assert_eq!(quantize(raw, mode), quantize(raw, mode));
            }
        }
    }

    #[test]
    fn test_detect_color_mode() {
        assert_eq!(
            detect_color_mode(&env(&[("COLORTERM", "truecolor")])),
            ColorMode::TrueColor
        );
        assert_eq!(
            detect_color_mode(&env(&[("ConEmuANSI", "ON")])),
            ColorMode::TrueColor
        );
        assert_eq!(
            detect_color_mode(&env(&[("TERM_PROGRAM", "Apple_Terminal")])),
            ColorMode::Color256
        );
        assert_eq!(
            detect_color_mode(&env(&[
                ("TERM_PROGRAM", "iTerm.app"),
                ("TERM_PROGRAM_VERSION", "3.4.19")
            ])),
            ColorMode::TrueColor
        );
        assert_eq!(
            detect_color_mode(&env(&[
                ("TERM_PROGRAM", "iTerm.app"),
                ("TERM_PROGRAM_VERSION", "beta")
            ])),
            ColorMode::Color256
        );
        assert_eq!(
            detect_color_mode(&env(&[("TERM", "xterm-256color")])),
            ColorMode::Color256
        );
        assert_eq!(
            detect_color_mode(&env(&[("TERM", "linux")])),
            ColorMode::Color16
        );
        assert_eq!(
            detect_color_mode(&env(&[("COLORTERM", "yes")])),
            ColorMode::Color16
        );
        assert_eq!(detect_color_mode(&env(&[("TERM", "dumb")])), ColorMode::NoColor);
        assert_eq!(detect_color_mode(&HashMap::new()), ColorMode::NoColor);
    }
}
