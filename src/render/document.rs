use std::io::{BufWriter, Cursor};
use std::path::{Path, PathBuf};

use image::codecs::jpeg::JpegEncoder;
use image::RgbImage;
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, Stream};

use crate::core::{Error, ImageFormat, QualityPreset, Result};

/// Upper bound on the `"name (n)"` probe before giving up.
const MAX_NAME_ATTEMPTS: u32 = 999;

/// Write the rendered pages as a document under `output_dir`.
///
/// PDF targets produce one `<base>.pdf`; image targets produce `<base>.<ext>`
/// for a single page or `<base>_pageNN.<ext>` for several. Existing files are
/// never overwritten: the base name is suffixed `" (1)"`, `" (2)"`, ... until
/// a free name is found.
pub fn assemble(
    pages: &[RgbImage],
    output_dir: &Path,
    base_name: &str,
    format: ImageFormat,
    preset: &QualityPreset,
) -> Result<Vec<PathBuf>> {
    if pages.is_empty() {
        return Err(Error::EmptySelection);
    }
    std::fs::create_dir_all(output_dir)?;

    let paths = match format {
        ImageFormat::Pdf => vec![write_pdf(pages, output_dir, base_name, preset)?],
        _ => write_image_pages(pages, output_dir, base_name, format, preset)?,
    };

    log::info!(
        "Assembled {} page(s) into {} file(s) under {}",
        pages.len(),
        paths.len(),
        output_dir.display()
    );
    Ok(paths)
}

fn write_pdf(
    pages: &[RgbImage],
    output_dir: &Path,
    base_name: &str,
    preset: &QualityPreset,
) -> Result<PathBuf> {
    let base = free_base_name(output_dir, base_name, |base| format!("{base}.pdf"))?;
    let path = output_dir.join(format!("{base}.pdf"));

    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let mut kids: Vec<Object> = Vec::with_capacity(pages.len());

    for page in pages {
        let (width, height) = page.dimensions();
        // Physical page size in points follows the preset DPI.
        let width_pt = width as f32 * 72.0 / preset.dpi as f32;
        let height_pt = height as f32 * 72.0 / preset.dpi as f32;

        let jpeg = encode_jpeg(page, preset.jpeg_quality)?;
        let image_id = doc.add_object(Stream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Image",
                "Width" => width as i64,
                "Height" => height as i64,
                "ColorSpace" => "DeviceRGB",
                "BitsPerComponent" => 8,
                "Filter" => "DCTDecode",
            },
            jpeg,
        ));

        let content = Content {
            operations: vec![
                Operation::new("q", vec![]),
                Operation::new(
                    "cm",
                    vec![
                        Object::Real(width_pt),
                        0.into(),
                        0.into(),
                        Object::Real(height_pt),
                        0.into(),
                        0.into(),
                    ],
                ),
                Operation::new("Do", vec!["Im0".into()]),
                Operation::new("Q", vec![]),
            ],
        };
        let encoded = content
            .encode()
            .map_err(|e| Error::Assembly(format!("could not encode page content: {e}")))?;
        let content_id = doc.add_object(Stream::new(dictionary! {}, encoded));

        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "MediaBox" => vec![
                0.into(),
                0.into(),
                Object::Real(width_pt),
                Object::Real(height_pt),
            ],
            "Contents" => content_id,
            "Resources" => dictionary! {
                "XObject" => dictionary! { "Im0" => image_id },
            },
        });
        kids.push(page_id.into());
    }

    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => pages.len() as i64,
        }),
    );
    let catalog_id = doc.add_object(dictionary! { "Type" => "Catalog", "Pages" => pages_id });
    doc.trailer.set("Root", catalog_id);

    doc.save(&path)
        .map_err(|e| Error::Assembly(format!("could not write {}: {e}", path.display())))?;
    Ok(path)
}

fn write_image_pages(
    pages: &[RgbImage],
    output_dir: &Path,
    base_name: &str,
    format: ImageFormat,
    preset: &QualityPreset,
) -> Result<Vec<PathBuf>> {
    let extension = format.extension();
    let single = pages.len() == 1;

    // Only the first page's name is probed for collisions; the suffixed
    // siblings share its base.
    let base = if single {
        free_base_name(output_dir, base_name, |base| format!("{base}.{extension}"))?
    } else {
        free_base_name(output_dir, base_name, |base| {
            format!("{base}_page01.{extension}")
        })?
    };

    let mut paths = Vec::with_capacity(pages.len());
    for (index, page) in pages.iter().enumerate() {
        let file_name = if single {
            format!("{base}.{extension}")
        } else {
            format!("{base}_page{:02}.{extension}", index + 1)
        };
        let path = output_dir.join(file_name);
        write_page(page, &path, format, preset)?;
        paths.push(path);
    }

    Ok(paths)
}

fn write_page(
    page: &RgbImage,
    path: &Path,
    format: ImageFormat,
    preset: &QualityPreset,
) -> Result<()> {
    let write_error =
        |e: String| Error::Assembly(format!("could not write {}: {e}", path.display()));

    match format {
        ImageFormat::Png => page.save(path).map_err(|e| write_error(e.to_string())),
        ImageFormat::Jpg | ImageFormat::Jpeg => {
            let file = std::fs::File::create(path).map_err(|e| write_error(e.to_string()))?;
            let mut writer = BufWriter::new(file);
            JpegEncoder::new_with_quality(&mut writer, preset.jpeg_quality)
                .encode_image(page)
                .map_err(|e| write_error(e.to_string()))
        }
        ImageFormat::Pdf => unreachable!("PDF pages are assembled by write_pdf"),
    }
}

fn encode_jpeg(page: &RgbImage, quality: u8) -> Result<Vec<u8>> {
    let mut bytes = Vec::new();
    JpegEncoder::new_with_quality(&mut Cursor::new(&mut bytes), quality)
        .encode_image(page)
        .map_err(|e| Error::Assembly(format!("JPEG encoding failed: {e}")))?;
    Ok(bytes)
}

/// Find a base name whose first output file does not exist yet.
fn free_base_name(
    output_dir: &Path,
    base: &str,
    first_file: impl Fn(&str) -> String,
) -> Result<String> {
    if !output_dir.join(first_file(base)).exists() {
        return Ok(base.to_string());
    }

    for n in 1..=MAX_NAME_ATTEMPTS {
        let candidate = format!("{base} ({n})");
        if !output_dir.join(first_file(&candidate)).exists() {
            return Ok(candidate);
        }
    }

    Err(Error::Assembly(format!(
        "no free output name for '{base}' in {} after {MAX_NAME_ATTEMPTS} attempts",
        output_dir.display()
    )))
}
