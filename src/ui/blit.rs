//! Half-block frame encoder
//!
//! Turns a pixel grid into the escape sequences needed to update the
//! terminal. Each character cell shows two vertically stacked pixels: the
//! upper half block `▀` takes the top pixel as foreground and the bottom
//! pixel as background. When the colors already set on the terminal match
//! the pair in the other order, the lower half block `▄` is used instead so
//! no color escape has to be sent.
//!
//! Only cells that differ from the previously rendered grid are written.
//! Cursor moves, color escapes and palette lookups are memoized per encoder
//! since the same values recur every frame.

use std::collections::HashMap;

use crossterm::cursor::{MoveDown, MoveLeft, MoveRight, MoveTo, MoveUp};
use crossterm::style::Color;
use crossterm::Command;

use super::color::{color_escape, quantize, ColorMode};
use crate::core::console::{Geometry, PixelGrid};

const UPPER_HALF: &[u8] = "▀".as_bytes();
const LOWER_HALF: &[u8] = "▄".as_bytes();
const FULL_BLOCK: &[u8] = "█".as_bytes();
const SPACE: &[u8] = b" ";

/// Screen area the picture is drawn into (0-based cell coordinates)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Viewport {
    /// Anchor row of the top-left cell
    pub row: u16,
    /// Anchor column of the top-left cell
    pub col: u16,
    /// Rows available below the anchor
    pub rows: u16,
    /// Columns available right of the anchor
    pub cols: u16,
}

impl Viewport {
    /// Center the picture on a terminal of `rows` x `cols`, keeping a one
    /// row and two column margin.
    ///
    /// The last terminal column is never used: writing there leaves the
    /// cursor in the pending-wrap state.
    pub fn centered(rows: u16, cols: u16, geometry: &Geometry) -> Self {
        let cell_rows = (geometry.height / 2) as i32;
        let cell_cols = geometry.width as i32;
        let row = 1 + ((rows as i32 - cell_rows) / 2).max(0);
        let col = 2 + ((cols as i32 - cell_cols) / 2).max(0);
        let row = row.min(u16::MAX as i32) as u16;
        let col = col.min(u16::MAX as i32) as u16;
        Self {
            row,
            col,
            rows: rows.saturating_sub(row),
            cols: cols.saturating_sub(col).saturating_sub(1),
        }
    }
}

/// Cursor movement, in the cheapest form available
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Move {
    To(u16, u16),
    Right(u16),
    Left(u16),
    Down(u16),
    Up(u16),
}

impl Move {
    /// Movement from a known (or unknown) cursor position to `to`.
    ///
    /// Same-row and same-column moves are relative, which is always shorter
    /// than spelling out both coordinates.
    fn between(from: Option<(u16, u16)>, to: (u16, u16)) -> Option<Self> {
        match from {
            Some(from) if from == to => None,
            Some((fx, fy)) if fy == to.1 => Some(if to.0 > fx {
                Move::Right(to.0 - fx)
            } else {
                Move::Left(fx - to.0)
            }),
            Some((fx, fy)) if fx == to.0 => Some(if to.1 > fy {
                Move::Down(to.1 - fy)
            } else {
                Move::Up(fy - to.1)
            }),
            _ => Some(Move::To(to.0, to.1)),
        }
    }

    fn to_bytes(self) -> Vec<u8> {
        let mut s = String::new();
        let _ = match self {
            Move::To(x, y) => MoveTo(x, y).write_ansi(&mut s),
            Move::Right(n) => MoveRight(n).write_ansi(&mut s),
            Move::Left(n) => MoveLeft(n).write_ansi(&mut s),
            Move::Down(n) => MoveDown(n).write_ansi(&mut s),
            Move::Up(n) => MoveUp(n).write_ansi(&mut s),
        };
        s.into_bytes()
    }
}

/// Palette entry for one raw pixel value
struct CachedColor {
    color: Color,
    fg: Vec<u8>,
    bg: Vec<u8>,
}

impl CachedColor {
    fn new(raw: u32, mode: ColorMode) -> Self {
        let color = quantize(raw, mode);
        Self {
            color,
            fg: color_escape(color, false).into_bytes(),
            bg: color_escape(color, true).into_bytes(),
        }
    }
}

/// Diffing half-block encoder with instance-owned caches
pub struct FrameEncoder {
    /// Output buffer, reused across frames
    buffer: Vec<u8>,
    /// Mode the color cache was built for
    mode: ColorMode,
    colors: HashMap<u32, CachedColor>,
    moves: HashMap<Move, Vec<u8>>,
}

impl Default for FrameEncoder {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameEncoder {
    pub fn new() -> Self {
        Self {
            buffer: Vec::with_capacity(64 * 1024),
            mode: ColorMode::TrueColor,
            colors: HashMap::new(),
            moves: HashMap::new(),
        }
    }

    /// Encode the cells of `current` that differ from `previous`.
    ///
    /// With `previous == None` (first frame, or after a resize) every
    /// visible cell is written. Cells outside the viewport are clipped.
    /// The returned slice is valid until the next call.
    pub fn encode(
        &mut self,
        current: &PixelGrid,
        previous: Option<&PixelGrid>,
        viewport: Viewport,
        mode: ColorMode,
    ) -> &[u8] {
        if mode != self.mode {
            self.colors.clear();
            self.mode = mode;
        }
        self.buffer.clear();

        let Self {
            buffer,
            colors,
            moves,
            ..
        } = self;

        let cell_rows = (viewport.rows as usize).min(current.height() / 2);
        let cell_cols = (viewport.cols as usize).min(current.width());

        let mut cursor: Option<(u16, u16)> = None;
        // Colors currently set on the terminal, unknown at frame start
        let mut fg: Option<Color> = None;
        let mut bg: Option<Color> = None;

        for cy in 0..cell_rows {
            let top_row = current.row(2 * cy);
            let bottom_row = current.row(2 * cy + 1);
            let previous_rows = previous.map(|p| (p.row(2 * cy), p.row(2 * cy + 1)));

            for cx in 0..cell_cols {
                let top = top_row[cx];
                let bottom = bottom_row[cx];
                if let Some((prev_top, prev_bottom)) = previous_rows {
                    if prev_top[cx] == top && prev_bottom[cx] == bottom {
                        continue;
                    }
                }

                // Flush the deferred cursor move
                let target = (viewport.col + cx as u16, viewport.row + cy as u16);
                if let Some(mv) = Move::between(cursor, target) {
                    let bytes = moves.entry(mv).or_insert_with(|| mv.to_bytes());
                    buffer.extend_from_slice(bytes);
                }

                let top_color = colors
                    .entry(top)
                    .or_insert_with(|| CachedColor::new(top, mode))
                    .color;
                let bottom_color = colors
                    .entry(bottom)
                    .or_insert_with(|| CachedColor::new(bottom, mode))
                    .color;

                let is = |pen: Option<Color>, color: Color| pen == Some(color);

                let (want_fg, want_bg, glyph) = if top_color == bottom_color {
                    if is(bg, top_color) {
                        (None, None, SPACE)
                    } else if is(fg, top_color) {
                        (None, None, FULL_BLOCK)
                    } else {
                        (None, Some(top), SPACE)
                    }
                } else {
                    let upper_cost = !is(fg, top_color) as u8 + !is(bg, bottom_color) as u8;
                    let lower_cost = !is(fg, bottom_color) as u8 + !is(bg, top_color) as u8;
                    if lower_cost < upper_cost {
                        (Some(bottom), Some(top), LOWER_HALF)
                    } else {
                        (Some(top), Some(bottom), UPPER_HALF)
                    }
                };

                if let Some(raw) = want_fg {
                    let entry = &colors[&raw];
                    if !is(fg, entry.color) {
                        buffer.extend_from_slice(&entry.fg);
                        fg = Some(entry.color);
                    }
                }
                if let Some(raw) = want_bg {
                    let entry = &colors[&raw];
                    if !is(bg, entry.color) {
                        buffer.extend_from_slice(&entry.bg);
                        bg = Some(entry.color);
                    }
                }
                buffer.extend_from_slice(glyph);
                cursor = Some((target.0 + 1, target.1));
            }
        }

        &self.buffer
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const A: u32 = 0x112233;
    const B: u32 = 0x445566;

    fn viewport(rows: u16, cols: u16) -> Viewport {
        Viewport {
            row: 0,
            col: 0,
            rows,
            cols,
        }
    }

    fn glyph_count(data: &[u8]) -> usize {
        let text = String::from_utf8_lossy(data);
        text.chars()
            .filter(|c| matches!(c, ' ' | '▀' | '▄' | '█'))
            .count()
    }

    #[test]
    fn test_single_changed_cell() {
        let mut encoder = FrameEncoder::new();
        let mut first = PixelGrid::new(4, 8);
        first.fill(A);
        let full = encoder.encode(&first, None, viewport(4, 4), ColorMode::TrueColor);
        assert_eq!(glyph_count(full), 16);

        let mut second = first.clone();
        second.set(2, 3, B);
        let data = encoder
            .encode(&second, Some(&first), viewport(4, 4), ColorMode::TrueColor)
            .to_vec();

        let expected = [
            "\x1b[2;3H",
            "\x1b[38;2;17;34;51m",
            "\x1b[48;2;68;85;102m",
            "▀",
        ]
        .concat();
        assert_eq!(String::from_utf8(data).unwrap(), expected);
    }

    #[test]
    fn test_identical_frame_is_empty() {
        let mut encoder = FrameEncoder::new();
        let mut grid = PixelGrid::new(6, 6);
        for y in 0..6 {
            for x in 0..6 {
                grid.set(x, y, if (x + y) % 2 == 0 { A } else { B });
            }
        }
        let previous = grid.clone();
        let data = encoder.encode(&grid, Some(&previous), viewport(10, 10), ColorMode::Color256);
        assert!(data.is_empty());
    }

    fn one_cell(top: u32, bottom: u32, mode: ColorMode) -> String {
        let mut grid = PixelGrid::new(1, 2);
        grid.set(0, 0, top);
        grid.set(0, 1, bottom);
        let mut encoder = FrameEncoder::new();
        let data = encoder.encode(&grid, None, viewport(1, 1), mode);
        String::from_utf8(data.to_vec()).unwrap()
    }

    #[test]
    fn test_basic_modes_use_basic_sgr_codes() {
        assert_eq!(
            one_cell(0xff0000, 0x0000ee, ColorMode::Color16),
            "\x1b[1;1H\x1b[91m\x1b[44m▀"
        );
        assert_eq!(
            one_cell(0xff0000, 0x0000ee, ColorMode::Grey4),
            "\x1b[1;1H\x1b[90m\x1b[40m▀"
        );
        assert_eq!(
            one_cell(0xffffff, 0xa0a0a0, ColorMode::Grey4),
            "\x1b[1;1H\x1b[97m\x1b[47m▀"
        );
        assert_eq!(
            one_cell(0xff0000, 0x0000ee, ColorMode::Color256),
            "\x1b[1;1H\x1b[38;5;196m\x1b[48;5;21m▀"
        );
    }

    #[test]
    fn test_colors_ignore_no_color_variable() {
        std::env::set_var("NO_COLOR", "1");
        let text = one_cell(0x112233, 0x445566, ColorMode::TrueColor);
        std::env::remove_var("NO_COLOR");
        assert_eq!(
            text,
            "\x1b[1;1H\x1b[38;2;17;34;51m\x1b[48;2;68;85;102m▀"
        );
    }

    #[test]
    fn test_invalidated_previous_repaints_everything() {
        let mut encoder = FrameEncoder::new();
        let mut grid = PixelGrid::new(5, 6);
        grid.fill(B);
        let data = encoder.encode(&grid, None, viewport(3, 5), ColorMode::Color16);
        assert_eq!(glyph_count(data), 15);
    }

    #[test]
    fn test_flip_avoids_color_escape() {
        let mut encoder = FrameEncoder::new();
        let mut grid = PixelGrid::new(2, 2);
        // Cell 0: A over B, cell 1: B over A
        grid.set(0, 0, A);
        grid.set(0, 1, B);
        grid.set(1, 0, B);
        grid.set(1, 1, A);
        let data = encoder.encode(&grid, None, viewport(1, 2), ColorMode::TrueColor);
        let text = String::from_utf8(data.to_vec()).unwrap();
        assert!(text.ends_with("▀▄"));
        assert_eq!(text.matches("\x1b[38;").count(), 1);
        assert_eq!(text.matches("\x1b[48;").count(), 1);
    }

    #[test]
    fn test_clipping_to_viewport() {
        let mut encoder = FrameEncoder::new();
        let mut grid = PixelGrid::new(4, 8);
        grid.fill(A);
        let data = encoder.encode(&grid, None, viewport(1, 2), ColorMode::TrueColor);
        assert_eq!(glyph_count(data), 2);
    }

    #[test]
    fn test_relative_moves_within_row() {
        let mut encoder = FrameEncoder::new();
        let mut first = PixelGrid::new(8, 2);
        first.fill(A);
        let mut second = first.clone();
        second.set(1, 0, B);
        second.set(6, 0, B);
        let data = encoder.encode(&second, Some(&first), viewport(1, 8), ColorMode::TrueColor);
        let text = String::from_utf8(data.to_vec()).unwrap();
        // Absolute move to the first cell, then skip four cells to the right
        assert!(text.starts_with("\x1b[1;2H"));
        assert!(text.contains("\x1b[4C"));
    }

    #[test]
    fn test_anchor_offsets_output() {
        let mut encoder = FrameEncoder::new();
        let mut grid = PixelGrid::new(1, 2);
        grid.fill(A);
        let vp = Viewport {
            row: 3,
            col: 5,
            rows: 1,
            cols: 1,
        };
        let data = encoder.encode(&grid, None, vp, ColorMode::TrueColor);
        assert!(data.starts_with(b"\x1b[4;6H"));
    }

    #[test]
    fn test_same_input_same_bytes() {
        let mut grid = PixelGrid::new(16, 16);
        for (i, px) in grid.pixels_mut().iter_mut().enumerate() {
            *px = (i as u32).wrapping_mul(0x9e3779b1) & 0xffffff;
        }
        for mode in [
            ColorMode::Grey4,
            ColorMode::Color16,
            ColorMode::Color256,
            ColorMode::TrueColor,
        ] {
            let first = FrameEncoder::new()
                .encode(&grid, None, viewport(8, 16), mode)
                .to_vec();
            let mut warm = FrameEncoder::new();
            warm.encode(&grid, None, viewport(8, 16), mode);
            let second = warm.encode(&grid, None, viewport(8, 16), mode).to_vec();
            assert_eq!(first, second);
        }
    }

    #[test]
    fn test_centered_viewport() {
        let gb = Geometry {
            width: 160,
            height: 144,
            fps: 59.7275,
            ticks_in_frame: 35112,
        };
        let vp = Viewport::centered(80, 200, &gb);
        assert_eq!(vp.row, 1 + (80 - 72) / 2);
        assert_eq!(vp.col, 2 + (200 - 160) / 2);
        assert_eq!(vp.rows, 80 - vp.row);
        assert_eq!(vp.cols, 200 - vp.col - 1);

        // Terminal smaller than the picture: anchor at the margin, clip
        let small = Viewport::centered(24, 80, &gb);
        assert_eq!((small.row, small.col), (1, 2));
        assert_eq!((small.rows, small.cols), (23, 77));
    }
}
