use crate::config::Page;
use crate::error::MergeError;
use image::ImageFormat;
use std::io::Cursor;
use std::path::Path;

/// Word lays out pixels at 96 DPI.
pub const EMU_PER_PIXEL: u64 = 9525;
pub const EMU_PER_TWIP: u64 = 635;

#[derive(Debug, Clone)]
pub struct EmbeddedImage {
    pub bytes: Vec<u8>,
    /// `png` or `jpeg`; anything else is re-encoded as PNG.
    pub extension: &'static str,
    pub width_px: u32,
    pub height_px: u32,
    pub cx_emu: u64,
    pub cy_emu: u64,
}

/// Decodes the image and sizes it to fit the printable width of `page`.
pub fn load_image(path: &Path, page: &Page) -> Result<EmbeddedImage, MergeError> {
    let raw = std::fs::read(path)
        .map_err(|e| MergeError::assembly(format!("read image {}", path.display()), e))?;
    let img_err = |source| MergeError::Image {
        path: path.to_path_buf(),
        source,
    };
    let format = image::guess_format(&raw).map_err(img_err)?;
    let decoded = image::load_from_memory_with_format(&raw, format).map_err(img_err)?;

    let (bytes, extension) = match format {
        ImageFormat::Png => (raw, "png"),
        ImageFormat::Jpeg => (raw, "jpeg"),
        _ => {
            let mut out = Vec::new();
            decoded
                .write_to(&mut Cursor::new(&mut out), ImageFormat::Png)
                .map_err(img_err)?;
            (out, "png")
        }
    };

    let (width_px, height_px) = (decoded.width(), decoded.height());
    let max_cx = u64::from(page.printable_width_twips()) * EMU_PER_TWIP;
    let (cx_emu, cy_emu) = fit_to_width(width_px, height_px, max_cx);
    Ok(EmbeddedImage {
        bytes,
        extension,
        width_px,
        height_px,
        cx_emu,
        cy_emu,
    })
}

/// Natural size in EMU, scaled down (never up) to `max_cx` keeping the
/// aspect ratio. A zero `max_cx` disables scaling.
pub fn fit_to_width(width_px: u32, height_px: u32, max_cx: u64) -> (u64, u64) {
    let cx = u64::from(width_px.max(1)) * EMU_PER_PIXEL;
    let cy = u64::from(height_px.max(1)) * EMU_PER_PIXEL;
    if max_cx == 0 || cx <= max_cx {
        return (cx, cy);
    }
    let scaled_cy = (u128::from(cy) * u128::from(max_cx) / u128::from(cx)) as u64;
    (max_cx, scaled_cy.max(1))
}
