//! Minimal OOXML word-processing package writer.
//!
//! Foreign documents are embedded whole as alternative-format chunks
//! (`w:altChunk`), which compatible readers splice in place on open.

pub mod image;

pub use self::image::{fit_to_width, load_image, EmbeddedImage, EMU_PER_PIXEL, EMU_PER_TWIP};

use crate::config::Page;
use crate::error::MergeError;
use quick_xml::escape::escape;
use std::fmt::Write as _;
use std::io::{Cursor, Read, Seek, Write};
use std::path::Path;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

pub const DOCUMENT_PART: &str = "word/document.xml";

const NS_W: &str = "http://schemas.openxmlformats.org/wordprocessingml/2006/main";
const NS_R: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships";
const NS_WP: &str = "http://schemas.openxmlformats.org/drawingml/2006/wordprocessingDrawing";
const NS_A: &str = "http://schemas.openxmlformats.org/drawingml/2006/main";
const NS_PIC: &str = "http://schemas.openxmlformats.org/drawingml/2006/picture";

const REL_OFFICE_DOCUMENT: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument";
const REL_ALT_CHUNK: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/aFChunk";
const REL_IMAGE: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships/image";

const CT_MAIN: &str = "application/vnd.openxmlformats-officedocument.wordprocessingml.document.main+xml";
const CT_RELS: &str = "application/vnd.openxmlformats-package.relationships+xml";

struct Relationship {
    id: String,
    kind: &'static str,
    target: String,
}

struct Part {
    name: String,
    bytes: Vec<u8>,
}

/// Accumulates body content and binary parts, then writes one package.
pub struct DocxBuilder {
    page: Page,
    body: String,
    parts: Vec<Part>,
    rels: Vec<Relationship>,
    chunks: usize,
    images: usize,
    segments: usize,
    page_breaks: usize,
}

impl DocxBuilder {
    pub fn new(page: Page) -> Self {
        Self {
            page,
            body: String::new(),
            parts: Vec::new(),
            rels: Vec::new(),
            chunks: 0,
            images: 0,
            segments: 0,
            page_breaks: 0,
        }
    }

    /// Content items appended so far (sub-documents and images).
    pub fn segments(&self) -> usize {
        self.segments
    }

    pub fn page_breaks(&self) -> usize {
        self.page_breaks
    }

    fn add_rel(&mut self, kind: &'static str, target: String) -> String {
        let id = format!("rId{}", self.rels.len() + 1);
        self.rels.push(Relationship {
            id: id.clone(),
            kind,
            target,
        });
        id
    }

    /// Embeds a complete word-processing package as an in-place chunk.
    pub fn append_sub_document(&mut self, package: Vec<u8>) {
        self.chunks += 1;
        let target = format!("altChunk{}.docx", self.chunks);
        self.parts.push(Part {
            name: format!("word/{target}"),
            bytes: package,
        });
        let id = self.add_rel(REL_ALT_CHUNK, target);
        let _ = write!(self.body, r#"<w:altChunk r:id="{id}"/>"#);
        self.segments += 1;
    }

    /// Inserts the image as a centered inline run.
    pub fn append_image(&mut self, img: &EmbeddedImage, description: &str) {
        self.images += 1;
        let n = self.images;
        let target = format!("media/image{n}.{}", img.extension);
        self.parts.push(Part {
            name: format!("word/{target}"),
            bytes: img.bytes.clone(),
        });
        let id = self.add_rel(REL_IMAGE, target);
        let descr = escape(description);
        let (cx, cy) = (img.cx_emu, img.cy_emu);
        let _ = write!(
            self.body,
            concat!(
                r#"<w:p><w:pPr><w:jc w:val="center"/></w:pPr><w:r><w:drawing>"#,
                r#"<wp:inline distT="0" distB="0" distL="0" distR="0">"#,
                r#"<wp:extent cx="{cx}" cy="{cy}"/>"#,
                r#"<wp:docPr id="{n}" name="Picture {n}" descr="{descr}"/>"#,
                r#"<wp:cNvGraphicFramePr><a:graphicFrameLocks noChangeAspect="1"/></wp:cNvGraphicFramePr>"#,
                r#"<a:graphic><a:graphicData uri="{pic}"><pic:pic>"#,
                r#"<pic:nvPicPr><pic:cNvPr id="{n}" name="image{n}.{ext}"/><pic:cNvPicPr/></pic:nvPicPr>"#,
                r#"<pic:blipFill><a:blip r:embed="{id}"/><a:stretch><a:fillRect/></a:stretch></pic:blipFill>"#,
                r#"<pic:spPr><a:xfrm><a:off x="0" y="0"/><a:ext cx="{cx}" cy="{cy}"/></a:xfrm>"#,
                r#"<a:prstGeom prst="rect"><a:avLst/></a:prstGeom></pic:spPr>"#,
                r#"</pic:pic></a:graphicData></a:graphic></wp:inline></w:drawing></w:r></w:p>"#,
            ),
            cx = cx,
            cy = cy,
            n = n,
            descr = descr,
            pic = NS_PIC,
            ext = img.extension,
            id = id,
        );
        self.segments += 1;
    }

    pub fn append_page_break(&mut self) {
        self.body
            .push_str(r#"<w:p><w:r><w:br w:type="page"/></w:r></w:p>"#);
        self.page_breaks += 1;
    }

    pub fn document_xml(&self) -> String {
        let p = &self.page;
        format!(
            concat!(
                r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#,
                r#"<w:document xmlns:w="{w}" xmlns:r="{r}" xmlns:wp="{wp}" xmlns:a="{a}" xmlns:pic="{pic}">"#,
                r#"<w:body>{body}<w:sectPr>"#,
                r#"<w:pgSz w:w="{pw}" w:h="{ph}"/>"#,
                r#"<w:pgMar w:top="{mt}" w:right="{mr}" w:bottom="{mb}" w:left="{ml}" w:header="720" w:footer="720" w:gutter="0"/>"#,
                r#"</w:sectPr></w:body></w:document>"#,
            ),
            w = NS_W,
            r = NS_R,
            wp = NS_WP,
            a = NS_A,
            pic = NS_PIC,
            body = self.body,
            pw = p.width_twips,
            ph = p.height_twips,
            mt = p.margin_top_twips,
            mr = p.margin_right_twips,
            mb = p.margin_bottom_twips,
            ml = p.margin_left_twips,
        )
    }

    fn content_types_xml(&self) -> String {
        let mut xml = String::from(concat!(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#,
            r#"<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types">"#,
            r#"<Default Extension="xml" ContentType="application/xml"/>"#,
            r#"<Default Extension="png" ContentType="image/png"/>"#,
            r#"<Default Extension="jpeg" ContentType="image/jpeg"/>"#,
        ));
        let _ = write!(
            xml,
            r#"<Default Extension="rels" ContentType="{CT_RELS}"/><Override PartName="/{DOCUMENT_PART}" ContentType="{CT_MAIN}"/>"#
        );
        for part in self.parts.iter().filter(|p| p.name.ends_with(".docx")) {
            let _ = write!(
                xml,
                r#"<Override PartName="/{}" ContentType="{CT_MAIN}"/>"#,
                part.name
            );
        }
        xml.push_str("</Types>");
        xml
    }

    fn package_rels_xml() -> String {
        format!(
            concat!(
                r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#,
                r#"<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">"#,
                r#"<Relationship Id="rId1" Type="{REL_OFFICE_DOCUMENT}" Target="{DOCUMENT_PART}"/>"#,
                r#"</Relationships>"#,
            ),
            REL_OFFICE_DOCUMENT = REL_OFFICE_DOCUMENT,
            DOCUMENT_PART = DOCUMENT_PART,
        )
    }

    fn document_rels_xml(&self) -> String {
        let mut xml = String::from(concat!(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#,
            r#"<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">"#,
        ));
        for rel in &self.rels {
            let _ = write!(
                xml,
                r#"<Relationship Id="{}" Type="{}" Target="{}"/>"#,
                rel.id,
                rel.kind,
                escape(rel.target.as_str())
            );
        }
        xml.push_str("</Relationships>");
        xml
    }

    /// Writes the whole package to `sink`.
    pub fn write_to<W: Write + Seek>(&self, sink: W) -> std::io::Result<W> {
        let opts = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
        let mut zip = ZipWriter::new(sink);
        let put = |zip: &mut ZipWriter<W>, name: &str, bytes: &[u8]| -> std::io::Result<()> {
            zip.start_file(name, opts).map_err(std::io::Error::other)?;
            zip.write_all(bytes)
        };
        put(&mut zip, "[Content_Types].xml", self.content_types_xml().as_bytes())?;
        put(&mut zip, "_rels/.rels", Self::package_rels_xml().as_bytes())?;
        put(&mut zip, DOCUMENT_PART, self.document_xml().as_bytes())?;
        put(
            &mut zip,
            "word/_rels/document.xml.rels",
            self.document_rels_xml().as_bytes(),
        )?;
        for part in &self.parts {
            put(&mut zip, &part.name, &part.bytes)?;
        }
        zip.finish().map_err(std::io::Error::other)
    }
}

/// Reads `path` and checks it is a word-processing package before it is
/// embedded.
pub fn read_package(path: &Path) -> Result<Vec<u8>, MergeError> {
    let bytes = std::fs::read(path)
        .map_err(|e| MergeError::assembly(format!("read {}", path.display()), e))?;
    let package_err = |reason: String| MergeError::Package {
        path: path.to_path_buf(),
        reason,
    };
    let mut archive =
        ZipArchive::new(Cursor::new(bytes.as_slice())).map_err(|e| package_err(e.to_string()))?;
    if archive.by_name(DOCUMENT_PART).is_err() {
        return Err(package_err(format!("missing {DOCUMENT_PART}")));
    }
    Ok(bytes)
}

/// Reads one part of a package as text.
pub fn read_part(package: &Path, part: &str) -> std::io::Result<String> {
    let file = std::fs::File::open(package)?;
    let mut archive = ZipArchive::new(file).map_err(std::io::Error::other)?;
    let mut entry = archive.by_name(part).map_err(std::io::Error::other)?;
    let mut out = String::new();
    entry.read_to_string(&mut out)?;
    Ok(out)
}
