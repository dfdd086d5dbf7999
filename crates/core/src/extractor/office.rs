//! Office Open XML documents and spreadsheets.

use super::{ExtractCx, Extractor};
use crate::error::TriageError;
use quick_xml::events::Event;
use quick_xml::Reader;
use std::fs;
use std::io::{Read, Seek};
use std::path::Path;
use zip::ZipArchive;

pub struct PresentationExtractor;

impl Extractor for PresentationExtractor {
    fn name(&self) -> &'static str {
        "presentation"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["pptx"]
    }

    fn extract(&self, path: &Path, cx: &ExtractCx<'_>) -> Result<String, TriageError> {
        let file = fs::File::open(path).map_err(|e| TriageError::extraction(path, e))?;
        let mut archive = ZipArchive::new(file).map_err(|e| TriageError::extraction(path, e))?;
        let mut out = String::new();
        for (_, name) in slide_entries(&mut archive) {
            let xml = read_entry(&mut archive, &name).map_err(|e| TriageError::extraction(path, e))?;
            let slide = xml_text(&xml, b"a:t", b"a:p")
                .map_err(|e| TriageError::extraction(path, format!("{name}: {e}")))?;
            if !slide.trim().is_empty() {
                out.push_str(slide.trim_end());
                out.push('\n');
            }
            if out.chars().count() >= cx.budget {
                break;
            }
        }
        Ok(out)
    }
}

/// `ppt/slides/slideN.xml` entries in slide-number order.
pub(crate) fn slide_entries<R: Read + Seek>(archive: &mut ZipArchive<R>) -> Vec<(usize, String)> {
    let mut slides: Vec<(usize, String)> = archive
        .file_names()
        .filter_map(|name| {
            let n = name
                .strip_prefix("ppt/slides/slide")?
                .strip_suffix(".xml")?
                .parse()
                .ok()?;
            Some((n, name.to_string()))
        })
        .collect();
    slides.sort();
    slides
}

pub(crate) fn read_entry<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
    name: &str,
) -> Result<Vec<u8>, String> {
    let mut entry = archive.by_name(name).map_err(|e| e.to_string())?;
    let mut buf = Vec::new();
    entry.read_to_end(&mut buf).map_err(|e| e.to_string())?;
    Ok(buf)
}

/// Text of every `text_tag` element, one line per `block_tag`.
pub(crate) fn xml_text(xml: &[u8], text_tag: &[u8], block_tag: &[u8]) -> Result<String, String> {
    let mut reader = Reader::from_reader(xml);
    let mut buf = Vec::new();
    let mut out = String::new();
    let mut in_text = false;
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) if e.name().as_ref() == text_tag => in_text = true,
            Ok(Event::End(e)) if e.name().as_ref() == text_tag => in_text = false,
            Ok(Event::End(e)) if e.name().as_ref() == block_tag => {
                if !out.is_empty() && !out.ends_with('\n') {
                    out.push('\n');
                }
            }
            Ok(Event::Text(t)) if in_text => {
                let text = t.unescape().map_err(|e| e.to_string())?;
                out.push_str(&text);
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(format!(
                    "xml error at position {}: {e}",
                    reader.buffer_position()
                ))
            }
            _ => {}
        }
        buf.clear();
    }
    Ok(out)
}

#[cfg(feature = "office")]
pub use self::formats::{SpreadsheetExtractor, WordExtractor};

#[cfg(feature = "office")]
mod formats {
    use super::*;
    use calamine::{open_workbook_auto, Reader as _};
    use docx_rs::{DocumentChild, ParagraphChild, RunChild};

    pub struct WordExtractor;

    impl Extractor for WordExtractor {
        fn name(&self) -> &'static str {
            "word"
        }

        fn extensions(&self) -> &'static [&'static str] {
            &["docx"]
        }

        fn extract(&self, path: &Path, _cx: &ExtractCx<'_>) -> Result<String, TriageError> {
            let bytes = fs::read(path).map_err(|e| TriageError::extraction(path, e))?;
            match docx_rs::read_docx(&bytes) {
                Ok(docx) => {
                    let mut out = String::new();
                    for child in &docx.document.children {
                        if let DocumentChild::Paragraph(p) = child {
                            for pc in &p.children {
                                if let ParagraphChild::Run(run) = pc {
                                    for rc in &run.children {
                                        if let RunChild::Text(t) = rc {
                                            out.push_str(&t.text);
                                        }
                                    }
                                }
                            }
                            out.push('\n');
                        }
                    }
                    Ok(out)
                }
                // Tables and some generator quirks trip the typed reader; the
                // raw body still carries the text runs.
                Err(err) => {
                    tracing::debug!("docx reader failed for {}: {err:?}", path.display());
                    let file =
                        fs::File::open(path).map_err(|e| TriageError::extraction(path, e))?;
                    let mut archive =
                        ZipArchive::new(file).map_err(|e| TriageError::extraction(path, e))?;
                    let xml = read_entry(&mut archive, "word/document.xml")
                        .map_err(|e| TriageError::extraction(path, e))?;
                    xml_text(&xml, b"w:t", b"w:p").map_err(|e| TriageError::extraction(path, e))
                }
            }
        }
    }

    /// Every sheet, one line per row, cells separated by spaces.
    pub struct SpreadsheetExtractor;

    impl Extractor for SpreadsheetExtractor {
        fn name(&self) -> &'static str {
            "spreadsheet"
        }

        fn extensions(&self) -> &'static [&'static str] {
            &["xlsx", "xlsm", "xlsb", "xls", "ods"]
        }

        fn extract(&self, path: &Path, cx: &ExtractCx<'_>) -> Result<String, TriageError> {
            let mut workbook =
                open_workbook_auto(path).map_err(|e| TriageError::extraction(path, e))?;
            let mut out = String::new();
            for name in workbook.sheet_names().to_owned() {
                cx.check_deadline(path)?;
                let range = match workbook.worksheet_range(&name) {
                    Some(Ok(range)) => range,
                    Some(Err(e)) => {
                        tracing::debug!("skipping sheet {name} of {}: {e}", path.display());
                        continue;
                    }
                    None => continue,
                };
                for row in range.rows() {
                    let line = row
                        .iter()
                        .map(|cell| cell.to_string())
                        .filter(|cell| !cell.trim().is_empty())
                        .collect::<Vec<_>>()
                        .join(" ");
                    if !line.is_empty() {
                        out.push_str(&line);
                        out.push('\n');
                    }
                }
                if out.chars().count() >= cx.budget {
                    break;
                }
            }
            Ok(out)
        }
    }
}
