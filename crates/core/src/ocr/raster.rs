use super::Rasterizer;
use crate::error::TriageError;
use crate::extractor::office::{read_entry, slide_entries};
use image::DynamicImage;
use quick_xml::events::Event;
use quick_xml::Reader;
use std::fs;
use std::ops::ControlFlow;
use std::path::Path;

/// An image file is its own single page.
pub struct ImageFileRasterizer;

impl Rasterizer for ImageFileRasterizer {
    fn for_each_page(
        &self,
        path: &Path,
        visit: &mut dyn FnMut(usize, Result<DynamicImage, TriageError>) -> ControlFlow<()>,
    ) -> Result<(), TriageError> {
        let img = image::open(path)
            .map_err(|e| TriageError::Recognition(format!("{}: {e}", path.display())))?;
        let _ = visit(0, Ok(img));
        Ok(())
    }
}

/// Every picture embedded in a slide deck, slide by slide.
pub struct SlidePictureRasterizer;

impl Rasterizer for SlidePictureRasterizer {
    fn for_each_page(
        &self,
        path: &Path,
        visit: &mut dyn FnMut(usize, Result<DynamicImage, TriageError>) -> ControlFlow<()>,
    ) -> Result<(), TriageError> {
        let file = fs::File::open(path)
            .map_err(|e| TriageError::Recognition(format!("{}: {e}", path.display())))?;
        let mut archive = zip::ZipArchive::new(file)
            .map_err(|e| TriageError::Recognition(format!("{}: {e}", path.display())))?;

        let mut index = 0;
        for (number, _) in slide_entries(&mut archive) {
            let rels_name = format!("ppt/slides/_rels/slide{number}.xml.rels");
            let Ok(rels) = read_entry(&mut archive, &rels_name) else {
                continue;
            };
            for target in image_targets(&rels) {
                let page = read_entry(&mut archive, &target)
                    .and_then(|bytes| image::load_from_memory(&bytes).map_err(|e| e.to_string()))
                    .map_err(|e| TriageError::Recognition(format!("{target}: {e}")));
                if visit(index, page).is_break() {
                    return Ok(());
                }
                index += 1;
            }
        }
        Ok(())
    }
}

/// Zip paths of the image relationships in a slide's `.rels` part.
fn image_targets(rels: &[u8]) -> Vec<String> {
    let mut reader = Reader::from_reader(rels);
    let mut buf = Vec::new();
    let mut targets = Vec::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Empty(e)) | Ok(Event::Start(e)) if e.name().as_ref() == b"Relationship" => {
                let mut is_image = false;
                let mut target = None;
                for attr in e.attributes().flatten() {
                    let Ok(value) = attr.unescape_value() else {
                        continue;
                    };
                    match attr.key.as_ref() {
                        b"Type" => is_image = value.ends_with("/image"),
                        b"Target" => target = Some(value.into_owned()),
                        _ => {}
                    }
                }
                if let (true, Some(t)) = (is_image, target) {
                    targets.push(resolve_slide_target(&t));
                }
            }
            Ok(Event::Eof) | Err(_) => break,
            _ => {}
        }
        buf.clear();
    }
    targets
}

/// Targets are relative to `ppt/slides/`.
fn resolve_slide_target(target: &str) -> String {
    if let Some(abs) = target.strip_prefix('/') {
        return abs.to_string();
    }
    let mut parts: Vec<&str> = vec!["ppt", "slides"];
    for seg in target.split('/') {
        match seg {
            ".." => {
                parts.pop();
            }
            "." | "" => {}
            s => parts.push(s),
        }
    }
    parts.join("/")
}

#[cfg(feature = "ocr")]
pub use self::pdfium::PdfRasterizer;

#[cfg(feature = "ocr")]
mod pdfium {
    use super::Rasterizer;
    use crate::error::TriageError;
    use image::DynamicImage;
    use pdfium_render::prelude::{PdfRenderConfig, Pdfium};
    use std::ops::ControlFlow;
    use std::path::Path;

    /// PDF pages rendered through pdfium at a fixed DPI, one page at a time.
    pub struct PdfRasterizer {
        dpi: u32,
        library_dir: Option<String>,
    }

    impl PdfRasterizer {
        pub fn new(dpi: u32, library_dir: Option<String>) -> Self {
            Self { dpi, library_dir }
        }

        fn bind(&self) -> Result<Pdfium, TriageError> {
            let bindings = match &self.library_dir {
                Some(dir) => Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path(dir)),
                None => Pdfium::bind_to_system_library(),
            }
            .map_err(|e| TriageError::Recognition(format!("pdfium unavailable: {e}")))?;
            Ok(Pdfium::new(bindings))
        }
    }

    impl Rasterizer for PdfRasterizer {
        fn for_each_page(
            &self,
            path: &Path,
            visit: &mut dyn FnMut(usize, Result<DynamicImage, TriageError>) -> ControlFlow<()>,
        ) -> Result<(), TriageError> {
            let pdfium = self.bind()?;
            let document = pdfium
                .load_pdf_from_file(path, None)
                .map_err(|e| TriageError::Recognition(format!("{}: {e}", path.display())))?;
            let config = PdfRenderConfig::new().scale_page_by_factor(self.dpi as f32 / 72.0);
            for (index, page) in document.pages().iter().enumerate() {
                let image = page
                    .render_with_config(&config)
                    .map(|bitmap| bitmap.as_image())
                    .map_err(|e| TriageError::Recognition(format!("render failed: {e}")));
                if visit(index, image).is_break() {
                    break;
                }
            }
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extractor::office::tests::write_pptx;
    use std::io::Cursor;

    fn png_bytes() -> Vec<u8> {
        let img = DynamicImage::new_luma8(8, 8);
        let mut buf = Cursor::new(Vec::new());
        img.write_to(&mut buf, image::ImageFormat::Png).unwrap();
        buf.into_inner()
    }

    #[test]
    fn resolves_relative_targets() {
        assert_eq!(resolve_slide_target("../media/image1.png"), "ppt/media/image1.png");
        assert_eq!(resolve_slide_target("/ppt/media/x.jpg"), "ppt/media/x.jpg");
    }

    #[test]
    fn slide_pictures_are_visited_in_slide_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("deck.pptx");
        let png = png_bytes();
        write_pptx(
            &path,
            &["", "", ""],
            &[(3, "late.png", &png), (1, "early.png", &png)],
        );
        let mut seen = Vec::new();
        SlidePictureRasterizer
            .for_each_page(&path, &mut |i, page| {
                seen.push((i, page.is_ok()));
                ControlFlow::Continue(())
            })
            .unwrap();
        assert_eq!(seen, vec![(0, true), (1, true)]);
    }

    #[test]
    fn undecodable_picture_is_a_page_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("deck.pptx");
        write_pptx(&path, &["title"], &[(1, "chart.emf", b"not an image")]);
        let mut errors = 0;
        SlidePictureRasterizer
            .for_each_page(&path, &mut |_, page| {
                errors += usize::from(page.is_err());
                ControlFlow::Continue(())
            })
            .unwrap();
        assert_eq!(errors, 1);
    }

    #[test]
    fn image_file_is_one_page() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scan.png");
        std::fs::write(&path, png_bytes()).unwrap();
        let mut pages = 0;
        ImageFileRasterizer
            .for_each_page(&path, &mut |_, page| {
                assert!(page.is_ok());
                pages += 1;
                ControlFlow::Continue(())
            })
            .unwrap();
        assert_eq!(pages, 1);
    }
}
