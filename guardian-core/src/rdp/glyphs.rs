//! Minimal 5×7 bitmap font for frame captions.
//!
//! Covers `A-Z`, digits, space and `: . ! -`. Lowercase letters are
//! drawn as uppercase; anything else renders as a blank cell.

use crate::rdp::types::Frame;

pub(crate) const GLYPH_WIDTH: u32 = 5;
pub(crate) const GLYPH_HEIGHT: u32 = 7;
/// One column of spacing between glyphs.
const ADVANCE: u32 = GLYPH_WIDTH + 1;

type Glyph = [u8; GLYPH_HEIGHT as usize];

const BLANK: Glyph = [0; 7];

fn glyph(c: char) -> Glyph {
    match c.to_ascii_uppercase() {
        'A' => [0b01110, 0b10001, 0b10001, 0b11111, 0b10001, 0b10001, 0b10001],
        'B' => [0b11110, 0b10001, 0b10001, 0b11110, 0b10001, 0b10001, 0b11110],
        'C' => [0b01110, 0b10001, 0b10000, 0b10000, 0b10000, 0b10001, 0b01110],
        'D' => [0b11110, 0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b11110],
        'E' => [0b11111, 0b10000, 0b10000, 0b11110, 0b10000, 0b10000, 0b11111],
        'F' => [0b11111, 0b10000, 0b10000, 0b11110, 0b10000, 0b10000, 0b10000],
        'G' => [0b01110, 0b10001, 0b10000, 0b10111, 0b10001, 0b10001, 0b01111],
        'H' => [0b10001, 0b10001, 0b10001, 0b11111, 0b10001, 0b10001, 0b10001],
        'I' => [0b01110, 0b00100, 0b00100, 0b00100, 0b00100, 0b00100, 0b01110],
        'J' => [0b00111, 0b00010, 0b00010, 0b00010, 0b00010, 0b10010, 0b01100],
        'K' => [0b10001, 0b10010, 0b10100, 0b11000, 0b10100, 0b10010, 0b10001],
        'L' => [0b10000, 0b10000, 0b10000, 0b10000, 0b10000, 0b10000, 0b11111],
        'M' => [0b10001, 0b11011, 0b10101, 0b10101, 0b10001, 0b10001, 0b10001],
        'N' => [0b10001, 0b10001, 0b11001, 0b10101, 0b10011, 0b10001, 0b10001],
        'O' => [0b01110, 0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b01110],
        'P' => [0b11110, 0b10001, 0b10001, 0b11110, 0b10000, 0b10000, 0b10000],
        'Q' => [0b01110, 0b10001, 0b10001, 0b10001, 0b10101, 0b10010, 0b01101],
        'R' => [0b11110, 0b10001, 0b10001, 0b11110, 0b10100, 0b10010, 0b10001],
        'S' => [0b01111, 0b10000, 0b10000, 0b01110, 0b00001, 0b00001, 0b11110],
        'T' => [0b11111, 0b00100, 0b00100, 0b00100, 0b00100, 0b00100, 0b00100],
        'U' => [0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b01110],
        'V' => [0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b01010, 0b00100],
        'W' => [0b10001, 0b10001, 0b10001, 0b10101, 0b10101, 0b10101, 0b01010],
        'X' => [0b10001, 0b10001, 0b01010, 0b00100, 0b01010, 0b10001, 0b10001],
        'Y' => [0b10001, 0b10001, 0b01010, 0b00100, 0b00100, 0b00100, 0b00100],
        'Z' => [0b11111, 0b00001, 0b00010, 0b00100, 0b01000, 0b10000, 0b11111],
        '0' => [0b01110, 0b10001, 0b10011, 0b10101, 0b11001, 0b10001, 0b01110],
        '1' => [0b00100, 0b01100, 0b00100, 0b00100, 0b00100, 0b00100, 0b01110],
        '2' => [0b01110, 0b10001, 0b00001, 0b00010, 0b00100, 0b01000, 0b11111],
        '3' => [0b11110, 0b00001, 0b00001, 0b01110, 0b00001, 0b00001, 0b11110],
        '4' => [0b00010, 0b00110, 0b01010, 0b10010, 0b11111, 0b00010, 0b00010],
        '5' => [0b11111, 0b10000, 0b11110, 0b00001, 0b00001, 0b10001, 0b01110],
        '6' => [0b00110, 0b01000, 0b10000, 0b11110, 0b10001, 0b10001, 0b01110],
        '7' => [0b11111, 0b00001, 0b00010, 0b00100, 0b01000, 0b01000, 0b01000],
        '8' => [0b01110, 0b10001, 0b10001, 0b01110, 0b10001, 0b10001, 0b01110],
        '9' => [0b01110, 0b10001, 0b10001, 0b01111, 0b00001, 0b00010, 0b01100],
        ':' => [0b00000, 0b01100, 0b01100, 0b00000, 0b01100, 0b01100, 0b00000],
        '.' => [0b00000, 0b00000, 0b00000, 0b00000, 0b00000, 0b01100, 0b01100],
        '!' => [0b00100, 0b00100, 0b00100, 0b00100, 0b00100, 0b00000, 0b00100],
        '-' => [0b00000, 0b00000, 0b00000, 0b11111, 0b00000, 0b00000, 0b00000],
        _ => BLANK,
    }
}

/// Draw `text` with its top-left corner at `(x, y)`, each font pixel
/// drawn as a `scale`×`scale` block. Clipped to the frame.
///
/// Returns the width the text occupies.
pub(crate) fn draw_text(
    frame: &mut Frame,
    x: u32,
    y: u32,
    scale: u32,
    text: &str,
    rgb: [u8; 3],
) -> u32 {
    let scale = scale.max(1);
    let mut cursor = x;
    for c in text.chars() {
        for (row, bits) in glyph(c).iter().enumerate() {
            for col in 0..GLYPH_WIDTH {
                if bits & (1 << (GLYPH_WIDTH - 1 - col)) != 0 {
                    frame.fill_rect(
                        cursor.saturating_add(col * scale),
                        y.saturating_add(row as u32 * scale),
                        scale,
                        scale,
                        rgb,
                    );
                }
            }
        }
        cursor = cursor.saturating_add(ADVANCE * scale);
    }
    cursor - x
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rdp::types::PixelFormat;

    const RED: [u8; 3] = [255, 0, 0];

    #[test]
    fn draws_glyph_bits_scaled() {
        let mut frame = Frame::filled(40, 20, PixelFormat::Rgb8, [0, 0, 0]);
        let width = draw_text(&mut frame, 2, 3, 2, "I", RED);
        assert_eq!(width, 12);

        // Top row of 'I' is 01110: column 0 blank, columns 1-3 set.
        assert_eq!(frame.rgb_at(2, 3), [0, 0, 0]);
        assert_eq!(frame.rgb_at(4, 3), RED);
        assert_eq!(frame.rgb_at(5, 4), RED);
        // Stem of 'I' at column 2, row 3.
        assert_eq!(frame.rgb_at(2 + 4, 3 + 6), RED);
        assert_eq!(frame.rgb_at(2, 3 + 6), [0, 0, 0]);
    }

    #[test]
    fn lowercase_matches_uppercase() {
        let mut a = Frame::filled(60, 10, PixelFormat::Rgb8, [0, 0, 0]);
        let mut b = a.clone();
        draw_text(&mut a, 0, 0, 1, "guardian", RED);
        draw_text(&mut b, 0, 0, 1, "GUARDIAN", RED);
        assert_eq!(a, b);
    }

    #[test]
    fn unknown_chars_are_blank() {
        let mut frame = Frame::filled(20, 10, PixelFormat::Rgb8, [0, 0, 0]);
        let before = frame.clone();
        assert_eq!(draw_text(&mut frame, 0, 0, 1, "#~ ", RED), 18);
        assert_eq!(frame, before);
    }

    #[test]
    fn clips_at_frame_edge() {
        let mut frame = Frame::filled(8, 4, PixelFormat::Bgra8, [0, 0, 0]);
        draw_text(&mut frame, 5, 2, 3, "WWW", RED);
        assert_eq!(frame.dimensions(), (8, 4));
    }
}
