use std::num::NonZeroUsize;
use std::path::Path;

use fontdue::layout::{
    CoordinateSystem, GlyphRasterConfig, HorizontalAlign, Layout, LayoutSettings, TextStyle,
    VerticalAlign, WrapStyle,
};
use fontdue::{Font, FontSettings};
use image::{Rgb, RgbImage};
use lru::LruCache;

/// Candidate font files able to render mixed-script captions, checked in
/// order. CJK-capable faces come first so Korean/Japanese/Chinese captions
/// render when such a font is installed.
const FONT_CANDIDATES: &[&str] = &[
    // macOS
    "/System/Library/Fonts/Supplemental/Arial Unicode.ttf",
    "/System/Library/Fonts/AppleSDGothicNeo.ttc",
    "/System/Library/Fonts/Hiragino Sans GB.ttc",
    "/System/Library/Fonts/Supplemental/Arial.ttf",
    // Linux
    "/usr/share/fonts/opentype/noto/NotoSansCJK-Regular.ttc",
    "/usr/share/fonts/truetype/noto/NotoSansCJK-Regular.ttc",
    "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/TTF/DejaVuSans.ttf",
    // Windows
    "C:\\Windows\\Fonts\\malgun.ttf",
    "C:\\Windows\\Fonts\\msyh.ttc",
    "C:\\Windows\\Fonts\\arial.ttf",
];

const GLYPH_CACHE_CAPACITY: usize = 512;

/// Text rasterizer for caption/header bands.
///
/// Loads the first usable system font; when none loads, degrades to a
/// built-in 8x8 ASCII bitmap font. The fallback never fails but renders
/// non-ASCII characters as `?`.
pub struct TextPainter {
    source: FontSource,
    glyph_cache: LruCache<GlyphRasterConfig, GlyphBitmap>,
}

enum FontSource {
    Truetype(Font),
    Builtin,
}

struct GlyphBitmap {
    width: usize,
    height: usize,
    bitmap: Vec<u8>,
}

impl TextPainter {
    pub fn load() -> Self {
        for candidate in FONT_CANDIDATES {
            let path = Path::new(candidate);
            if !path.exists() {
                continue;
            }
            match std::fs::read(path) {
                Ok(bytes) => match Font::from_bytes(bytes, FontSettings::default()) {
                    Ok(font) => {
                        log::debug!("Loaded caption font from {}", candidate);
                        return Self::with_source(FontSource::Truetype(font));
                    }
                    Err(e) => log::debug!("Skipping font {}: {}", candidate, e),
                },
                Err(e) => log::debug!("Cannot read font {}: {}", candidate, e),
            }
        }

        log::warn!(
            "No usable system font found; using the built-in 8x8 fallback \
             (non-ASCII captions will render as '?')"
        );
        Self::with_source(FontSource::Builtin)
    }

    /// Painter that always uses the built-in bitmap font.
    pub fn builtin() -> Self {
        Self::with_source(FontSource::Builtin)
    }

    fn with_source(source: FontSource) -> Self {
        let capacity = NonZeroUsize::new(GLYPH_CACHE_CAPACITY).unwrap();
        TextPainter {
            source,
            glyph_cache: LruCache::new(capacity),
        }
    }

    /// Rendered width of `text` at `px` pixels.
    pub fn measure_width(&self, text: &str, px: f32) -> u32 {
        match &self.source {
            FontSource::Truetype(font) => text
                .chars()
                .map(|ch| font.metrics(ch, px).advance_width)
                .sum::<f32>()
                .ceil() as u32,
            FontSource::Builtin => {
                text.chars().count() as u32 * 8 * builtin_scale(px)
            }
        }
    }

    /// Height of a rendered text line (ascent to descent) at `px` pixels.
    pub fn glyph_height(&self, px: f32) -> u32 {
        match &self.source {
            FontSource::Truetype(font) => match font.horizontal_line_metrics(px) {
                Some(metrics) => (metrics.ascent - metrics.descent).ceil() as u32,
                None => px.ceil() as u32,
            },
            FontSource::Builtin => 8 * builtin_scale(px),
        }
    }

    /// Caption line advance: 1.4x the measured glyph height.
    pub fn line_height(&self, px: f32) -> u32 {
        (self.glyph_height(px) as f32 * 1.4).round() as u32
    }

    /// Draw a single line of text with its top-left corner at (x, y).
    pub fn draw_text(&mut self, img: &mut RgbImage, x: i32, y: i32, text: &str, px: f32, color: Rgb<u8>) {
        match &self.source {
            FontSource::Truetype(font) => {
                let mut layout = Layout::new(CoordinateSystem::PositiveYDown);
                layout.reset(&LayoutSettings {
                    x: x as f32,
                    y: y as f32,
                    max_width: None,
                    max_height: None,
                    horizontal_align: HorizontalAlign::Left,
                    vertical_align: VerticalAlign::Top,
                    line_height: 1.0,
                    wrap_style: WrapStyle::Letter,
                    wrap_hard_breaks: false,
                });
                layout.append(&[font], &TextStyle::new(text, px, 0));

                for glyph in layout.glyphs() {
                    if glyph.width == 0 || glyph.height == 0 {
                        continue;
                    }
                    let glyph_bitmap = self.glyph_cache.get_or_insert(glyph.key, || {
                        let (_, bitmap) = font.rasterize_config(glyph.key);
                        GlyphBitmap {
                            width: glyph.width,
                            height: glyph.height,
                            bitmap,
                        }
                    });
                    blend_glyph(
                        img,
                        glyph.x.round() as i32,
                        glyph.y.round() as i32,
                        glyph_bitmap,
                        color,
                    );
                }
            }
            FontSource::Builtin => {
                let scale = builtin_scale(px);
                let mut pen_x = x;
                for ch in text.chars() {
                    draw_builtin_glyph(img, pen_x, y, ch, scale, color);
                    pen_x += (8 * scale) as i32;
                }
            }
        }
    }
}

fn builtin_scale(px: f32) -> u32 {
    ((px / 8.0).round() as u32).max(1)
}

/// Alpha-blend a coverage bitmap into the image.
fn blend_glyph(img: &mut RgbImage, x: i32, y: i32, glyph: &GlyphBitmap, color: Rgb<u8>) {
    let (img_w, img_h) = img.dimensions();
    for gy in 0..glyph.height {
        for gx in 0..glyph.width {
            let px = x + gx as i32;
            let py = y + gy as i32;
            if px < 0 || py < 0 || px >= img_w as i32 || py >= img_h as i32 {
                continue;
            }
            let coverage = glyph.bitmap[gy * glyph.width + gx] as u16;
            if coverage == 0 {
                continue;
            }
            let pixel = img.get_pixel_mut(px as u32, py as u32);
            for channel in 0..3 {
                let dst = pixel.0[channel] as u16;
                let src = color.0[channel] as u16;
                pixel.0[channel] = ((dst * (255 - coverage) + src * coverage) / 255) as u8;
            }
        }
    }
}

fn draw_builtin_glyph(img: &mut RgbImage, x: i32, y: i32, ch: char, scale: u32, color: Rgb<u8>) {
    let rows = builtin_glyph(ch);
    let (img_w, img_h) = img.dimensions();
    for (row, bits) in rows.iter().enumerate() {
        for col in 0..8u32 {
            if bits & (1 << col) == 0 {
                continue;
            }
            for sy in 0..scale {
                for sx in 0..scale {
                    let px = x + (col * scale + sx) as i32;
                    let py = y + (row as u32 * scale + sy) as i32;
                    if px < 0 || py < 0 || px >= img_w as i32 || py >= img_h as i32 {
                        continue;
                    }
                    img.put_pixel(px as u32, py as u32, color);
                }
            }
        }
    }
}

fn builtin_glyph(ch: char) -> &'static [u8; 8] {
    let index = if ch.is_ascii() && !ch.is_ascii_control() {
        ch as usize - 0x20
    } else {
        b'?' as usize - 0x20
    };
    &BUILTIN_FONT[index]
}

/// Public-domain 8x8 bitmap font, printable ASCII 0x20-0x7E.
/// Each glyph is eight rows top to bottom; bit 0 is the leftmost pixel.
static BUILTIN_FONT: [[u8; 8]; 95] = [
    [0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00], // space
    [0x18, 0x3C, 0x3C, 0x18, 0x18, 0x00, 0x18, 0x00], // !
    [0x36, 0x36, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00], // "
    [0x36, 0x36, 0x7F, 0x36, 0x7F, 0x36, 0x36, 0x00], // #
    [0x0C, 0x3E, 0x03, 0x1E, 0x30, 0x1F, 0x0C, 0x00], // $
    [0x00, 0x63, 0x33, 0x18, 0x0C, 0x66, 0x63, 0x00], // %
    [0x1C, 0x36, 0x1C, 0x6E, 0x3B, 0x33, 0x6E, 0x00], // &
    [0x06, 0x06, 0x03, 0x00, 0x00, 0x00, 0x00, 0x00], // '
    [0x18, 0x0C, 0x06, 0x06, 0x06, 0x0C, 0x18, 0x00], // (
    [0x06, 0x0C, 0x18, 0x18, 0x18, 0x0C, 0x06, 0x00], // )
    [0x00, 0x66, 0x3C, 0xFF, 0x3C, 0x66, 0x00, 0x00], // *
    [0x00, 0x0C, 0x0C, 0x3F, 0x0C, 0x0C, 0x00, 0x00], // +
    [0x00, 0x00, 0x00, 0x00, 0x00, 0x0C, 0x0C, 0x06], // ,
    [0x00, 0x00, 0x00, 0x3F, 0x00, 0x00, 0x00, 0x00], // -
    [0x00, 0x00, 0x00, 0x00, 0x00, 0x0C, 0x0C, 0x00], // .
    [0x60, 0x30, 0x18, 0x0C, 0x06, 0x03, 0x01, 0x00], // /
    [0x3E, 0x63, 0x73, 0x7B, 0x6F, 0x67, 0x3E, 0x00], // 0
    [0x0C, 0x0E, 0x0C, 0x0C, 0x0C, 0x0C, 0x3F, 0x00], // 1
    [0x1E, 0x33, 0x30, 0x1C, 0x06, 0x33, 0x3F, 0x00], // 2
    [0x1E, 0x33, 0x30, 0x1C, 0x30, 0x33, 0x1E, 0x00], // 3
    [0x38, 0x3C, 0x36, 0x33, 0x7F, 0x30, 0x78, 0x00], // 4
    [0x3F, 0x03, 0x1F, 0x30, 0x30, 0x33, 0x1E, 0x00], // 5
    [0x1C, 0x06, 0x03, 0x1F, 0x33, 0x33, 0x1E, 0x00], // 6
    [0x3F, 0x33, 0x30, 0x18, 0x0C, 0x0C, 0x0C, 0x00], // 7
    [0x1E, 0x33, 0x33, 0x1E, 0x33, 0x33, 0x1E, 0x00], // 8
    [0x1E, 0x33, 0x33, 0x3E, 0x30, 0x18, 0x0E, 0x00], // 9
    [0x00, 0x0C, 0x0C, 0x00, 0x00, 0x0C, 0x0C, 0x00], // :
    [0x00, 0x0C, 0x0C, 0x00, 0x00, 0x0C, 0x0C, 0x06], // ;
    [0x18, 0x0C, 0x06, 0x03, 0x06, 0x0C, 0x18, 0x00], // <
    [0x00, 0x00, 0x3F, 0x00, 0x00, 0x3F, 0x00, 0x00], // =
    [0x06, 0x0C, 0x18, 0x30, 0x18, 0x0C, 0x06, 0x00], // >
    [0x1E, 0x33, 0x30, 0x18, 0x0C, 0x00, 0x0C, 0x00], // ?
    [0x3E, 0x63, 0x7B, 0x7B, 0x7B, 0x03, 0x1E, 0x00], // @
    [0x0C, 0x1E, 0x33, 0x33, 0x3F, 0x33, 0x33, 0x00], // A
    [0x3F, 0x66, 0x66, 0x3E, 0x66, 0x66, 0x3F, 0x00], // B
    [0x3C, 0x66, 0x03, 0x03, 0x03, 0x66, 0x3C, 0x00], // C
    [0x1F, 0x36, 0x66, 0x66, 0x66, 0x36, 0x1F, 0x00], // D
    [0x7F, 0x46, 0x16, 0x1E, 0x16, 0x46, 0x7F, 0x00], // E
    [0x7F, 0x46, 0x16, 0x1E, 0x16, 0x06, 0x0F, 0x00], // F
    [0x3C, 0x66, 0x03, 0x03, 0x73, 0x66, 0x7C, 0x00], // G
    [0x33, 0x33, 0x33, 0x3F, 0x33, 0x33, 0x33, 0x00], // H
    [0x1E, 0x0C, 0x0C, 0x0C, 0x0C, 0x0C, 0x1E, 0x00], // I
    [0x78, 0x30, 0x30, 0x30, 0x33, 0x33, 0x1E, 0x00], // J
    [0x67, 0x66, 0x36, 0x1E, 0x36, 0x66, 0x67, 0x00], // K
    [0x0F, 0x06, 0x06, 0x06, 0x46, 0x66, 0x7F, 0x00], // L
    [0x63, 0x77, 0x7F, 0x7F, 0x6B, 0x63, 0x63, 0x00], // M
    [0x63, 0x67, 0x6F, 0x7B, 0x73, 0x63, 0x63, 0x00], // N
    [0x1C, 0x36, 0x63, 0x63, 0x63, 0x36, 0x1C, 0x00], // O
    [0x3F, 0x66, 0x66, 0x3E, 0x06, 0x06, 0x0F, 0x00], // P
    [0x1E, 0x33, 0x33, 0x33, 0x3B, 0x1E, 0x38, 0x00], // Q
    [0x3F, 0x66, 0x66, 0x3E, 0x36, 0x66, 0x67, 0x00], // R
    [0x1E, 0x33, 0x07, 0x0E, 0x38, 0x33, 0x1E, 0x00], // S
    [0x3F, 0x2D, 0x0C, 0x0C, 0x0C, 0x0C, 0x1E, 0x00], // T
    [0x33, 0x33, 0x33, 0x33, 0x33, 0x33, 0x3F, 0x00], // U
    [0x33, 0x33, 0x33, 0x33, 0x33, 0x1E, 0x0C, 0x00], // V
    [0x63, 0x63, 0x63, 0x6B, 0x7F, 0x77, 0x63, 0x00], // W
    [0x63, 0x63, 0x36, 0x1C, 0x1C, 0x36, 0x63, 0x00], // X
    [0x33, 0x33, 0x33, 0x1E, 0x0C, 0x0C, 0x1E, 0x00], // Y
    [0x7F, 0x63, 0x31, 0x18, 0x4C, 0x66, 0x7F, 0x00], // Z
    [0x1E, 0x06, 0x06, 0x06, 0x06, 0x06, 0x1E, 0x00], // [
    [0x03, 0x06, 0x0C, 0x18, 0x30, 0x60, 0x40, 0x00], // backslash
    [0x1E, 0x18, 0x18, 0x18, 0x18, 0x18, 0x1E, 0x00], // ]
    [0x08, 0x1C, 0x36, 0x63, 0x00, 0x00, 0x00, 0x00], // ^
    [0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0xFF], // _
    [0x0C, 0x0C, 0x18, 0x00, 0x00, 0x00, 0x00, 0x00], // `
    [0x00, 0x00, 0x1E, 0x30, 0x3E, 0x33, 0x6E, 0x00], // a
    [0x07, 0x06, 0x06, 0x3E, 0x66, 0x66, 0x3B, 0x00], // b
    [0x00, 0x00, 0x1E, 0x33, 0x03, 0x33, 0x1E, 0x00], // c
    [0x38, 0x30, 0x30, 0x3E, 0x33, 0x33, 0x6E, 0x00], // d
    [0x00, 0x00, 0x1E, 0x33, 0x3F, 0x03, 0x1E, 0x00], // e
    [0x1C, 0x36, 0x06, 0x0F, 0x06, 0x06, 0x0F, 0x00], // f
    [0x00, 0x00, 0x6E, 0x33, 0x33, 0x3E, 0x30, 0x1F], // g
    [0x07, 0x06, 0x36, 0x6E, 0x66, 0x66, 0x67, 0x00], // h
    [0x0C, 0x00, 0x0E, 0x0C, 0x0C, 0x0C, 0x1E, 0x00], // i
    [0x30, 0x00, 0x30, 0x30, 0x30, 0x33, 0x33, 0x1E], // j
    [0x07, 0x06, 0x66, 0x36, 0x1E, 0x36, 0x67, 0x00], // k
    [0x0E, 0x0C, 0x0C, 0x0C, 0x0C, 0x0C, 0x1E, 0x00], // l
    [0x00, 0x00, 0x33, 0x7F, 0x7F, 0x6B, 0x63, 0x00], // m
    [0x00, 0x00, 0x1F, 0x33, 0x33, 0x33, 0x33, 0x00], // n
    [0x00, 0x00, 0x1E, 0x33, 0x33, 0x33, 0x1E, 0x00], // o
    [0x00, 0x00, 0x3B, 0x66, 0x66, 0x3E, 0x06, 0x0F], // p
    [0x00, 0x00, 0x6E, 0x33, 0x33, 0x3E, 0x30, 0x78], // q
    [0x00, 0x00, 0x3B, 0x6E, 0x66, 0x06, 0x0F, 0x00], // r
    [0x00, 0x00, 0x3E, 0x03, 0x1E, 0x30, 0x1F, 0x00], // s
    [0x08, 0x0C, 0x3E, 0x0C, 0x0C, 0x2C, 0x18, 0x00], // t
    [0x00, 0x00, 0x33, 0x33, 0x33, 0x33, 0x6E, 0x00], // u
    [0x00, 0x00, 0x33, 0x33, 0x33, 0x1E, 0x0C, 0x00], // v
    [0x00, 0x00, 0x63, 0x6B, 0x7F, 0x7F, 0x36, 0x00], // w
    [0x00, 0x00, 0x63, 0x36, 0x1C, 0x36, 0x63, 0x00], // x
    [0x00, 0x00, 0x33, 0x33, 0x33, 0x3E, 0x30, 0x1F], // y
    [0x00, 0x00, 0x3F, 0x19, 0x0C, 0x26, 0x3F, 0x00], // z
    [0x38, 0x0C, 0x0C, 0x07, 0x0C, 0x0C, 0x38, 0x00], // {
    [0x18, 0x18, 0x18, 0x00, 0x18, 0x18, 0x18, 0x00], // |
    [0x07, 0x0C, 0x0C, 0x38, 0x0C, 0x0C, 0x07, 0x00], // }
    [0x6E, 0x3B, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00], // ~
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_measure_scales_with_size() {
        let painter = TextPainter::builtin();
        let narrow = painter.measure_width("abc", 8.0);
        let wide = painter.measure_width("abc", 24.0);
        assert_eq!(narrow, 3 * 8);
        assert_eq!(wide, 3 * 8 * 3);
        assert!(painter.glyph_height(24.0) > painter.glyph_height(8.0));
    }

    #[test]
    fn test_line_height_exceeds_glyph_height() {
        let painter = TextPainter::builtin();
        assert!(painter.line_height(24.0) > painter.glyph_height(24.0));
    }

    #[test]
    fn test_draw_marks_pixels_and_clips_at_edges() {
        let mut painter = TextPainter::builtin();
        let mut img = RgbImage::from_pixel(64, 32, Rgb([255, 255, 255]));
        painter.draw_text(&mut img, 2, 2, "#1", 16.0, Rgb([0, 0, 0]));
        assert!(img.pixels().any(|p| p.0 == [0, 0, 0]));

        // Partially off-canvas draws must not panic.
        painter.draw_text(&mut img, -10, -10, "clip", 16.0, Rgb([0, 0, 0]));
        painter.draw_text(&mut img, 60, 30, "clip", 16.0, Rgb([0, 0, 0]));
    }

    #[test]
    fn test_load_never_fails() {
        // Whatever fonts the host has (or lacks), load() must produce a
        // usable painter.
        let mut painter = TextPainter::load();
        let mut img = RgbImage::from_pixel(128, 32, Rgb([255, 255, 255]));
        painter.draw_text(&mut img, 0, 0, "00:01.00", 20.0, Rgb([0, 0, 0]));
        assert!(painter.measure_width("frame", 20.0) > 0);
    }
}
