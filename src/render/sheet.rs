use std::path::PathBuf;

use crate::core::{
    Error, ExtractedFrame, ImageFormat, QualityPreset, Result, SheetOptions,
};
use crate::render::font::TextPainter;
use crate::render::grid::GridSpec;
use crate::render::{caption, document, grid};

/// Everything the save pipeline needs besides the frames themselves.
#[derive(Debug, Clone)]
pub struct SheetRequest {
    pub output_directory: PathBuf,
    pub base_name: String,
    pub format: ImageFormat,
    pub preset: QualityPreset,
    pub options: SheetOptions,
}

/// Fixed scratch root shared by every run. Concurrent sessions on one
/// machine can collide here; accepted limitation.
pub fn scratch_root() -> PathBuf {
    std::env::temp_dir().join("snapsheet")
}

/// Scratch directory for per-frame composited intermediates.
pub fn composited_directory() -> PathBuf {
    scratch_root().join("composited")
}

/// Scratch directory the CLI extracts frames into for the full pipeline.
pub fn frames_directory() -> PathBuf {
    scratch_root().join("frames")
}

/// Compose the selected frames into an assembled document.
///
/// Selected frames keep their chronological order and are renumbered 1..K;
/// each is composited to the scratch directory, the composited set is laid
/// out into pages, the pages are assembled, then the per-frame intermediates
/// are removed. `progress` receives advisory integer percentages: 0-50
/// across composites, 50-90 across page renders, 100 after assembly.
pub fn compose_sheet(
    frames: &[ExtractedFrame],
    request: &SheetRequest,
    progress: &mut dyn FnMut(u8),
) -> Result<Vec<PathBuf>> {
    let selected: Vec<&ExtractedFrame> = frames.iter().filter(|f| f.selected).collect();
    if selected.is_empty() {
        return Err(Error::EmptySelection);
    }

    let mut painter = TextPainter::load();
    let scratch = composited_directory();
    std::fs::create_dir_all(&scratch)?;

    let total = selected.len();
    let mut composited = Vec::with_capacity(total);
    let mut intermediates = Vec::with_capacity(total);
    for (index, frame) in selected.iter().enumerate() {
        let sequence_number = (index + 1) as u32;
        let intermediate = scratch.join(format!("sheet_frame_{sequence_number:04}.png"));
        let image = caption::composite(
            &mut painter,
            &frame.image_path,
            &intermediate,
            &frame.caption,
            sequence_number,
            &frame.timestamp_label(),
        )?;
        intermediates.push(intermediate);
        composited.push(image);
        progress(((index + 1) * 50 / total) as u8);
    }

    let spec = GridSpec::new(&request.options, &request.preset);
    let pages = grid::layout_pages(composited, &spec, &mut |done, page_total| {
        progress((50 + done * 40 / page_total) as u8);
    })?;

    let outputs = document::assemble(
        &pages,
        &request.output_directory,
        &request.base_name,
        request.format,
        &request.preset,
    )?;

    for path in &intermediates {
        if let Err(e) = std::fs::remove_file(path) {
            log::debug!("Could not remove intermediate {}: {}", path.display(), e);
        }
    }
    progress(100);

    Ok(outputs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    fn extracted_frames(dir: &std::path::Path, count: u32) -> Vec<ExtractedFrame> {
        (0..count)
            .map(|i| {
                let path = dir.join(format!("frame_{i:04}.png"));
                RgbImage::from_pixel(96, 72, Rgb([60, 60, 60]))
                    .save(&path)
                    .unwrap();
                ExtractedFrame::new(i as f64, i, path).unwrap()
            })
            .collect()
    }

    fn request(dir: &std::path::Path, format: ImageFormat) -> SheetRequest {
        SheetRequest {
            output_directory: dir.to_path_buf(),
            base_name: "frames".to_string(),
            format,
            preset: *QualityPreset::tier(3).unwrap(),
            options: SheetOptions::default(),
        }
    }

    #[test]
    fn test_no_selection_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let frames = extracted_frames(dir.path(), 3);
        let result = compose_sheet(
            &frames,
            &request(dir.path(), ImageFormat::Png),
            &mut |_| {},
        );
        assert!(matches!(result, Err(Error::EmptySelection)));
    }

    #[test]
    fn test_selected_frames_produce_document() {
        let dir = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        let mut frames = extracted_frames(dir.path(), 5);
        for frame in frames.iter_mut().skip(1).step_by(2) {
            frame.selected = true;
        }
        frames[1].caption = "first selected frame".to_string();

        let mut last_progress = 0u8;
        let outputs = compose_sheet(
            &frames,
            &request(out.path(), ImageFormat::Png),
            &mut |p| {
                assert!(p >= last_progress);
                last_progress = p;
            },
        )
        .unwrap();

        assert_eq!(last_progress, 100);
        assert_eq!(outputs.len(), 1);
        assert!(outputs[0].exists());
        let page = image::open(&outputs[0]).unwrap().to_rgb8();
        assert_eq!(page.width(), QualityPreset::tier(3).unwrap().page_width);
    }

    #[test]
    fn test_pdf_output_written() {
        let dir = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        let mut frames = extracted_frames(dir.path(), 2);
        frames[0].selected = true;
        frames[1].selected = true;

        let outputs = compose_sheet(
            &frames,
            &request(out.path(), ImageFormat::Pdf),
            &mut |_| {},
        )
        .unwrap();

        assert_eq!(outputs.len(), 1);
        let bytes = std::fs::read(&outputs[0]).unwrap();
        assert!(bytes.starts_with(b"%PDF"));
    }

    #[test]
    fn test_missing_frame_file_is_composition_error() {
        let dir = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        let mut frames = extracted_frames(dir.path(), 1);
        frames[0].selected = true;
        std::fs::remove_file(&frames[0].image_path).unwrap();

        let result = compose_sheet(
            &frames,
            &request(out.path(), ImageFormat::Png),
            &mut |_| {},
        );
        assert!(matches!(result, Err(Error::Composition { .. })));
    }
}
