use image::{imageops, Rgb, RgbImage};

use crate::core::{Error, QualityPreset, Result, SheetOptions};

const PAGE_BACKGROUND: Rgb<u8> = Rgb([255, 255, 255]);

/// Geometry inputs for one sheet: fixed column count, page dimensions from
/// the quality preset, margins and inter-cell spacing in pixels.
#[derive(Debug, Clone, Copy)]
pub struct GridSpec {
    pub columns: u32,
    pub page_width: u32,
    pub page_height: u32,
    pub page_margin: u32,
    pub cell_spacing: u32,
}

impl GridSpec {
    pub fn new(options: &SheetOptions, preset: &QualityPreset) -> Self {
        GridSpec {
            columns: options.columns,
            page_width: preset.page_width,
            page_height: preset.page_height,
            page_margin: options.page_margin,
            cell_spacing: options.cell_spacing,
        }
    }
}

/// Derived cell geometry shared by every page of a sheet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GridGeometry {
    pub cell_width: u32,
    pub cell_height: u32,
    pub rows_per_page: u32,
    pub images_per_page: usize,
}

/// Lay the composited images out into rendered pages.
///
/// Images are first normalized to a common canvas, then split into
/// contiguous chunks of `columns x rows_per_page`; a frame never moves to a
/// different page than chunk arithmetic dictates and never splits across a
/// row or page boundary. Page height is truncated to the occupied rows.
pub fn layout_pages(
    images: Vec<RgbImage>,
    spec: &GridSpec,
    on_page: &mut dyn FnMut(usize, usize),
) -> Result<Vec<RgbImage>> {
    if images.is_empty() {
        return Err(Error::EmptySelection);
    }

    let normalized = normalize_images(images);
    let geometry = compute_geometry(&normalized, spec)?;
    log::debug!(
        "Sheet geometry: cell {}x{}, {} rows/page, {} images/page",
        geometry.cell_width,
        geometry.cell_height,
        geometry.rows_per_page,
        geometry.images_per_page
    );

    let chunks: Vec<&[RgbImage]> = normalized.chunks(geometry.images_per_page).collect();
    let total = chunks.len();

    let mut pages = Vec::with_capacity(total);
    for (index, chunk) in chunks.into_iter().enumerate() {
        pages.push(render_page(chunk, &geometry, spec));
        on_page(index + 1, total);
    }

    Ok(pages)
}

/// Re-canvas every image onto a shared `max_width x max_height` background,
/// horizontally centered and top-aligned. Caption bands vary per frame, so
/// the vertical slack accumulates at the bottom; afterwards every cell has
/// uniform geometry.
pub fn normalize_images(images: Vec<RgbImage>) -> Vec<RgbImage> {
    let max_width = images.iter().map(|img| img.width()).max().unwrap_or(0);
    let max_height = images.iter().map(|img| img.height()).max().unwrap_or(0);

    images
        .into_iter()
        .map(|img| {
            if img.width() == max_width && img.height() == max_height {
                return img;
            }
            let mut canvas = RgbImage::from_pixel(max_width, max_height, PAGE_BACKGROUND);
            let x = (max_width - img.width()) / 2;
            imageops::overlay(&mut canvas, &img, x as i64, 0);
            canvas
        })
        .collect()
}

/// Compute the shared cell size and page capacity for normalized images.
pub fn compute_geometry(images: &[RgbImage], spec: &GridSpec) -> Result<GridGeometry> {
    if images.is_empty() {
        return Err(Error::EmptySelection);
    }

    let columns = spec.columns as i64;
    let available_width = spec.page_width as i64
        - 2 * spec.page_margin as i64
        - (columns - 1) * spec.cell_spacing as i64;
    let cell_width = available_width / columns;
    if cell_width <= 0 {
        return Err(Error::InvalidArgument(format!(
            "page width {} cannot fit {} columns with margin {} and spacing {}",
            spec.page_width, spec.columns, spec.page_margin, spec.cell_spacing
        )));
    }
    let cell_width = cell_width as u32;

    // Post-normalization every image shares the same dimensions, so the
    // mean aspect equals maxH/maxW.
    let avg_aspect = images
        .iter()
        .map(|img| img.height() as f64 / img.width() as f64)
        .sum::<f64>()
        / images.len() as f64;
    let cell_height = ((cell_width as f64 * avg_aspect).round() as u32).max(1);

    let available_height = spec.page_height.saturating_sub(2 * spec.page_margin);
    let rows_per_page =
        ((available_height + spec.cell_spacing) / (cell_height + spec.cell_spacing)).max(1);

    Ok(GridGeometry {
        cell_width,
        cell_height,
        rows_per_page,
        images_per_page: (spec.columns * rows_per_page) as usize,
    })
}

/// Render one chunk as a page whose height covers exactly its occupied rows.
fn render_page(chunk: &[RgbImage], geometry: &GridGeometry, spec: &GridSpec) -> RgbImage {
    let actual_rows = chunk.len().div_ceil(spec.columns as usize) as u32;
    let page_height = 2 * spec.page_margin
        + actual_rows * geometry.cell_height
        + (actual_rows - 1) * spec.cell_spacing;

    let mut page = RgbImage::from_pixel(spec.page_width, page_height, PAGE_BACKGROUND);

    for (index, img) in chunk.iter().enumerate() {
        let row = index as u32 / spec.columns;
        let col = index as u32 % spec.columns;

        let (fit_width, fit_height) = fit_within(
            img.width(),
            img.height(),
            geometry.cell_width,
            geometry.cell_height,
        );
        let scaled;
        let cell_image = if fit_width == img.width() && fit_height == img.height() {
            img
        } else {
            scaled = imageops::resize(img, fit_width, fit_height, imageops::FilterType::Triangle);
            &scaled
        };

        let cell_x = spec.page_margin + col * (geometry.cell_width + spec.cell_spacing);
        let cell_y = spec.page_margin + row * (geometry.cell_height + spec.cell_spacing);
        let x = cell_x + (geometry.cell_width - fit_width) / 2;
        let y = cell_y + (geometry.cell_height - fit_height) / 2;
        imageops::overlay(&mut page, cell_image, x as i64, y as i64);
    }

    page
}

/// Scale dimensions to fit inside a cell preserving aspect ratio, without
/// ever upscaling beyond the source size.
pub fn fit_within(width: u32, height: u32, cell_width: u32, cell_height: u32) -> (u32, u32) {
    let scale = (cell_width as f64 / width as f64)
        .min(cell_height as f64 / height as f64)
        .min(1.0);
    let fit_width = ((width as f64 * scale).round() as u32).clamp(1, cell_width);
    let fit_height = ((height as f64 * scale).round() as u32).clamp(1, cell_height);
    (fit_width, fit_height)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn images(count: usize, width: u32, height: u32) -> Vec<RgbImage> {
        (0..count)
            .map(|_| RgbImage::from_pixel(width, height, Rgb([90, 90, 90])))
            .collect()
    }

    fn spec(columns: u32, page_width: u32, page_height: u32) -> GridSpec {
        GridSpec {
            columns,
            page_width,
            page_height,
            page_margin: 20,
            cell_spacing: 10,
        }
    }

    fn no_progress() -> impl FnMut(usize, usize) {
        |_, _| {}
    }

    #[test]
    fn test_empty_input_rejected() {
        let result = layout_pages(Vec::new(), &spec(3, 600, 800), &mut no_progress());
        assert!(matches!(result, Err(Error::EmptySelection)));
    }

    #[test]
    fn test_single_image_single_page_single_row() {
        let s = spec(3, 600, 800);
        let pages = layout_pages(images(1, 100, 80), &s, &mut no_progress()).unwrap();
        assert_eq!(pages.len(), 1);

        let geometry = compute_geometry(&images(1, 100, 80), &s).unwrap();
        let expected_height = 2 * s.page_margin + geometry.cell_height;
        assert_eq!(pages[0].height(), expected_height);
        assert_eq!(pages[0].width(), s.page_width);
    }

    #[test]
    fn test_seven_images_five_columns_two_truncated_rows() {
        let s = spec(5, 600, 800);
        // availableWidth = 600 - 40 - 4*10 = 520, cellWidth = 104
        // aspect 0.8 -> cellHeight = 83
        let geometry = compute_geometry(&images(7, 100, 80), &s).unwrap();
        assert_eq!(geometry.cell_width, 104);
        assert_eq!(geometry.cell_height, 83);

        let pages = layout_pages(images(7, 100, 80), &s, &mut no_progress()).unwrap();
        assert_eq!(pages.len(), 1);
        // Row 1 holds 5 images, row 2 holds 2; height covers 2 rows, not
        // a hypothetical full page.
        let expected_height = 2 * s.page_margin + 2 * geometry.cell_height + s.cell_spacing;
        assert_eq!(pages[0].height(), expected_height);
        assert!(pages[0].height() < s.page_height);
    }

    #[test]
    fn test_no_image_lost_or_duplicated_across_pages() {
        let s = spec(4, 500, 400);
        let geometry = compute_geometry(&images(1, 50, 50), &s).unwrap();
        let per_page = geometry.images_per_page;
        assert!(per_page > 0);

        let count = 2 * per_page + 3;
        let pages = layout_pages(images(count, 50, 50), &s, &mut no_progress()).unwrap();
        assert_eq!(pages.len(), 3);

        // Chunk arithmetic: full, full, remainder.
        let expected_last_rows = 3usize.div_ceil(s.columns as usize) as u32;
        let full_height = 2 * s.page_margin
            + geometry.rows_per_page * geometry.cell_height
            + (geometry.rows_per_page - 1) * s.cell_spacing;
        let last_height = 2 * s.page_margin
            + expected_last_rows * geometry.cell_height
            + (expected_last_rows - 1) * s.cell_spacing;
        assert_eq!(pages[0].height(), full_height);
        assert_eq!(pages[1].height(), full_height);
        assert_eq!(pages[2].height(), last_height);
        assert!(pages[2].height() < pages[0].height());
    }

    #[test]
    fn test_full_page_height_fits_but_saturates_page() {
        let s = spec(3, 600, 800);
        let geometry = compute_geometry(&images(1, 100, 100), &s).unwrap();
        let full_rows_height = 2 * s.page_margin
            + geometry.rows_per_page * geometry.cell_height
            + (geometry.rows_per_page - 1) * s.cell_spacing;

        // A full page fits within the target height, and one more row
        // would overflow it.
        assert!(full_rows_height <= s.page_height);
        assert!(
            full_rows_height + geometry.cell_height + s.cell_spacing > s.page_height
        );
    }

    #[test]
    fn test_page_capacity_never_exceeded() {
        let s = spec(5, 600, 800);
        let imgs = images(23, 100, 80);
        let geometry = compute_geometry(&imgs, &s).unwrap();
        let mut seen = 0usize;
        let mut rendered_pages = 0usize;
        layout_pages(imgs, &s, &mut |done, total| {
            rendered_pages = done.max(rendered_pages);
            assert!(done <= total);
        })
        .unwrap()
        .iter()
        .for_each(|_| seen += 1);

        assert_eq!(seen, 23usize.div_ceil(geometry.images_per_page));
        assert_eq!(rendered_pages, seen);
    }

    #[test]
    fn test_normalization_equalizes_dimensions() {
        let mut mixed = images(1, 100, 80);
        mixed.extend(images(1, 60, 120));
        let normalized = normalize_images(mixed);

        assert!(normalized
            .iter()
            .all(|img| img.width() == 100 && img.height() == 120));
    }

    #[test]
    fn test_fit_within_never_upscales() {
        // Smaller than the cell: untouched.
        assert_eq!(fit_within(50, 40, 200, 200), (50, 40));
        // Larger: scaled down preserving aspect.
        let (w, h) = fit_within(400, 200, 100, 100);
        assert_eq!((w, h), (100, 50));
        // Degenerate cell still yields at least one pixel.
        let (w, h) = fit_within(1000, 1000, 3, 3);
        assert!(w >= 1 && h >= 1);
    }

    #[test]
    fn test_too_many_columns_for_page_rejected() {
        let result = compute_geometry(&images(2, 100, 80), &spec(100, 300, 400));
        assert!(matches!(result, Err(Error::InvalidArgument(_))));
    }

    #[test]
    fn test_rows_per_page_formula() {
        let s = spec(5, 600, 800);
        let geometry = compute_geometry(&images(3, 100, 80), &s).unwrap();
        // availableHeight = 760; (760 + 10) / (83 + 10) = 8
        assert_eq!(geometry.rows_per_page, 8);
        assert_eq!(geometry.images_per_page, 40);
    }
}
