use std::path::{Path, PathBuf};

use image::{Rgb, RgbImage};

use crate::core::{Error, Result};
use crate::render::font::TextPainter;

pub const CAPTION_FONT_SIZE: f32 = 24.0;
pub const HEADER_FONT_SIZE: f32 = 20.0;
pub const TEXT_PADDING: u32 = 20;
pub const BORDER_WIDTH: u32 = 3;

/// Horizontal inset of the header texts from the band edges.
const HEADER_INSET: u32 = 15;

const BACKGROUND: Rgb<u8> = Rgb([255, 255, 255]);
const TEXT_COLOR: Rgb<u8> = Rgb([0, 0, 0]);
const BORDER_COLOR: Rgb<u8> = Rgb([0, 0, 0]);

/// Height of the index/timestamp band above the frame.
pub fn header_height() -> u32 {
    (CAPTION_FONT_SIZE * 1.3).round() as u32
}

/// Composite one frame: decode it, add the header band, optional caption
/// band, and border, and write the result to `output`.
pub fn composite(
    painter: &mut TextPainter,
    source: &Path,
    output: &Path,
    caption: &str,
    frame_index: u32,
    timestamp_label: &str,
) -> Result<RgbImage> {
    let frame = image::open(source)
        .map_err(|e| Error::Composition {
            path: source.to_path_buf(),
            source: e,
        })?
        .to_rgb8();

    let composed = compose_image(painter, &frame, caption, frame_index, timestamp_label);

    if let Some(parent) = output.parent() {
        std::fs::create_dir_all(parent)?;
    }
    composed.save(output).map_err(|e| {
        Error::Assembly(format!(
            "could not write composited frame {}: {e}",
            output.display()
        ))
    })?;

    Ok(composed)
}

/// Pure composition: header band + frame + optional caption band + border.
pub fn compose_image(
    painter: &mut TextPainter,
    frame: &RgbImage,
    caption: &str,
    frame_index: u32,
    timestamp_label: &str,
) -> RgbImage {
    let (width, height) = frame.dimensions();
    let header = header_height();

    let lines = if caption.trim().is_empty() {
        Vec::new()
    } else {
        wrap_caption(painter, caption, width.saturating_sub(2 * TEXT_PADDING))
    };
    let caption_band = caption_band_height(painter, lines.len());

    let total_width = width + 2 * BORDER_WIDTH;
    let total_height = header + height + caption_band + 2 * BORDER_WIDTH;

    let mut canvas = RgbImage::from_pixel(total_width, total_height, BORDER_COLOR);

    // Header band: frame index left, timestamp right, both centered
    // vertically in the band.
    fill_rect(&mut canvas, BORDER_WIDTH, BORDER_WIDTH, width, header, BACKGROUND);
    let header_text_height = painter.glyph_height(HEADER_FONT_SIZE);
    let header_text_y = BORDER_WIDTH as i32 + (header.saturating_sub(header_text_height) / 2) as i32;
    let index_text = format!("#{frame_index}");
    painter.draw_text(
        &mut canvas,
        (BORDER_WIDTH + HEADER_INSET) as i32,
        header_text_y,
        &index_text,
        HEADER_FONT_SIZE,
        TEXT_COLOR,
    );
    if !timestamp_label.is_empty() {
        let label_width = painter.measure_width(timestamp_label, HEADER_FONT_SIZE);
        let label_x = (BORDER_WIDTH + width).saturating_sub(HEADER_INSET + label_width);
        painter.draw_text(
            &mut canvas,
            label_x as i32,
            header_text_y,
            timestamp_label,
            HEADER_FONT_SIZE,
            TEXT_COLOR,
        );
    }

    image::imageops::overlay(
        &mut canvas,
        frame,
        BORDER_WIDTH as i64,
        (BORDER_WIDTH + header) as i64,
    );

    if !lines.is_empty() {
        let band_top = BORDER_WIDTH + header + height;
        fill_rect(&mut canvas, BORDER_WIDTH, band_top, width, caption_band, BACKGROUND);

        let line_height = painter.line_height(CAPTION_FONT_SIZE);
        for (i, line) in lines.iter().enumerate() {
            if line.is_empty() {
                continue;
            }
            let line_width = painter.measure_width(line, CAPTION_FONT_SIZE);
            let x = (total_width.saturating_sub(line_width) / 2) as i32;
            let y = (band_top + TEXT_PADDING + i as u32 * line_height) as i32;
            painter.draw_text(&mut canvas, x, y, line, CAPTION_FONT_SIZE, TEXT_COLOR);
        }
    }

    canvas
}

/// Caption band height for the wrapped line count; zero when no caption.
pub fn caption_band_height(painter: &TextPainter, line_count: usize) -> u32 {
    if line_count == 0 {
        return 0;
    }
    line_count as u32 * painter.line_height(CAPTION_FONT_SIZE) + 2 * TEXT_PADDING
        + TEXT_PADDING / 2
}

/// Split a caption into rendered lines.
///
/// Explicit newlines split first and blank lines survive as empty output
/// lines; each piece is then greedily word-wrapped against `max_width`.
/// A single word wider than the band is emitted as its own (overflowing)
/// line rather than looping or failing.
pub fn wrap_caption(painter: &TextPainter, caption: &str, max_width: u32) -> Vec<String> {
    let mut lines = Vec::new();

    for raw_line in caption.split('\n') {
        if raw_line.trim().is_empty() {
            lines.push(String::new());
            continue;
        }

        let mut current = String::new();
        for word in raw_line.split_whitespace() {
            let candidate = if current.is_empty() {
                word.to_string()
            } else {
                format!("{current} {word}")
            };

            if current.is_empty()
                || painter.measure_width(&candidate, CAPTION_FONT_SIZE) <= max_width
            {
                current = candidate;
            } else {
                lines.push(std::mem::take(&mut current));
                current = word.to_string();
            }
        }
        if !current.is_empty() {
            lines.push(current);
        }
    }

    lines
}

fn fill_rect(img: &mut RgbImage, x: u32, y: u32, width: u32, height: u32, color: Rgb<u8>) {
    let (img_w, img_h) = img.dimensions();
    for py in y..(y + height).min(img_h) {
        for px in x..(x + width).min(img_w) {
            img.put_pixel(px, py, color);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn painter() -> TextPainter {
        TextPainter::builtin()
    }

    fn frame(width: u32, height: u32) -> RgbImage {
        RgbImage::from_pixel(width, height, Rgb([120, 130, 140]))
    }

    #[test]
    fn test_empty_caption_has_no_band() {
        let mut p = painter();
        let composed = compose_image(&mut p, &frame(320, 240), "", 1, "00:01.00");
        assert_eq!(composed.width(), 320 + 2 * BORDER_WIDTH);
        assert_eq!(
            composed.height(),
            header_height() + 240 + 2 * BORDER_WIDTH
        );
    }

    #[test]
    fn test_whitespace_caption_treated_as_empty() {
        let mut p = painter();
        let composed = compose_image(&mut p, &frame(320, 240), "   \n  ", 1, "");
        assert_eq!(composed.height(), header_height() + 240 + 2 * BORDER_WIDTH);
    }

    #[test]
    fn test_caption_band_height_formula() {
        let mut p = painter();
        let caption = "a short caption";
        let lines = wrap_caption(&p, caption, 320 - 2 * TEXT_PADDING);
        let expected_band = lines.len() as u32 * p.line_height(CAPTION_FONT_SIZE)
            + 2 * TEXT_PADDING
            + TEXT_PADDING / 2;

        let composed = compose_image(&mut p, &frame(320, 240), caption, 1, "00:05.00");
        assert_eq!(
            composed.height(),
            header_height() + 240 + expected_band + 2 * BORDER_WIDTH
        );
    }

    #[test]
    fn test_border_and_header_painted() {
        let mut p = painter();
        let composed = compose_image(&mut p, &frame(100, 60), "", 3, "");
        // Border corner is border-colored; a point inside the header band
        // away from any text is background.
        assert_eq!(composed.get_pixel(0, 0).0, [0, 0, 0]);
        let mid_header = composed.get_pixel(composed.width() / 2, BORDER_WIDTH + 2);
        assert_eq!(mid_header.0, [255, 255, 255]);
    }

    #[test]
    fn test_wrap_unbreakable_word_single_line() {
        let p = painter();
        let word = "x".repeat(500);
        let lines = wrap_caption(&p, &word, 300 - 2 * TEXT_PADDING);
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0], word);
    }

    #[test]
    fn test_wrap_respects_explicit_newlines_and_blank_lines() {
        let p = painter();
        let lines = wrap_caption(&p, "first\n\nsecond", 10_000);
        assert_eq!(lines, vec!["first".to_string(), String::new(), "second".to_string()]);
    }

    #[test]
    fn test_wrap_breaks_on_measured_width() {
        let p = painter();
        // Builtin font: 8px per character at 8px size scale 3 at 24px.
        // "aaaa bbbb cccc" at a width fitting ~one word per line.
        let lines = wrap_caption(&p, "aaaa bbbb cccc", 5 * 24);
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], "aaaa");

        let wide = wrap_caption(&p, "aaaa bbbb cccc", 10_000);
        assert_eq!(wide.len(), 1);
    }

    #[test]
    fn test_composite_rejects_undecodable_source() {
        let mut p = painter();
        let dir = tempfile::tempdir().unwrap();
        let bogus = dir.path().join("frame_0000.png");
        std::fs::write(&bogus, b"this is not a png").unwrap();

        let result = composite(&mut p, &bogus, &dir.path().join("out.png"), "", 1, "");
        assert!(matches!(result, Err(Error::Composition { .. })));
    }

    #[test]
    fn test_composite_writes_output_file() {
        let mut p = painter();
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("frame_0000.png");
        frame(64, 48).save(&source).unwrap();

        let output = dir.path().join("composited").join("sheet_frame_0001.png");
        let composed = composite(&mut p, &source, &output, "hello", 1, "00:00.00").unwrap();
        assert!(output.exists());
        let reloaded = image::open(&output).unwrap().to_rgb8();
        assert_eq!(reloaded.dimensions(), composed.dimensions());
    }
}
