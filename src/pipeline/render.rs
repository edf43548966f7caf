//! PDF rasterisation: render selected pages to `DynamicImage` via pdfium.
//!
//! ## Why spawn_blocking?
//!
//! `pdfium-render` wraps the pdfium C++ library, which is CPU-bound and not
//! async-aware. `tokio::task::spawn_blocking` keeps rendering off the Tokio
//! worker threads.
//!
//! ## Binding
//!
//! pdfium is loaded at runtime: `PDFIUM_LIB_PATH` (a file or a directory)
//! first, then a copy next to the working directory, then the system
//! library. Failure is a [`Pic2CsvError::PdfiumBindingFailed`], never a
//! panic, so image inputs keep working on machines without pdfium.

use crate::error::Pic2CsvError;
use image::DynamicImage;
use pdfium_render::prelude::*;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Bind to a pdfium shared library.
pub fn bind_pdfium() -> Result<Pdfium, Pic2CsvError> {
    let bindings = match std::env::var_os("PDFIUM_LIB_PATH") {
        Some(p) if !p.is_empty() => {
            let p = PathBuf::from(p);
            let lib = if p.is_dir() {
                Pdfium::pdfium_platform_library_name_at_path(&p)
            } else {
                p
            };
            debug!("Binding pdfium from PDFIUM_LIB_PATH: {}", lib.display());
            Pdfium::bind_to_library(lib)
        }
        _ => Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("./"))
            .or_else(|_| Pdfium::bind_to_system_library()),
    }
    .map_err(|e| Pic2CsvError::PdfiumBindingFailed(format!("{e:?}")))?;

    Ok(Pdfium::new(bindings))
}

/// Number of pages in a PDF, without rendering anything.
pub async fn page_count(pdf_path: &Path, password: Option<&str>) -> Result<usize, Pic2CsvError> {
    let path = pdf_path.to_path_buf();
    let password = password.map(str::to_string);

    tokio::task::spawn_blocking(move || {
        let pdfium = bind_pdfium()?;
        let document = open_document(&pdfium, &path, password.as_deref())?;
        let count = document.pages().len() as usize;
        Ok(count)
    })
    .await
    .map_err(|e| Pic2CsvError::Internal(format!("Page-count task panicked: {}", e)))?
}

/// Rasterise selected pages of a PDF into images.
///
/// # Returns
/// `(page_index_0based, DynamicImage)` tuples in selection order.
pub async fn render_pages(
    pdf_path: &Path,
    max_pixels: u32,
    password: Option<&str>,
    page_indices: &[usize],
) -> Result<Vec<(usize, DynamicImage)>, Pic2CsvError> {
    let path = pdf_path.to_path_buf();
    let password = password.map(str::to_string);
    let indices = page_indices.to_vec();

    tokio::task::spawn_blocking(move || {
        render_pages_blocking(&path, max_pixels, password.as_deref(), &indices)
    })
    .await
    .map_err(|e| Pic2CsvError::Internal(format!("Render task panicked: {}", e)))?
}

fn open_document<'a>(
    pdfium: &'a Pdfium,
    pdf_path: &Path,
    password: Option<&'a str>,
) -> Result<PdfDocument<'a>, Pic2CsvError> {
    pdfium.load_pdf_from_file(pdf_path, password).map_err(|e| {
        let err_str = format!("{:?}", e);
        if err_str.to_lowercase().contains("password") {
            if password.is_some() {
                Pic2CsvError::WrongPassword {
                    path: pdf_path.to_path_buf(),
                }
            } else {
                Pic2CsvError::PasswordRequired {
                    path: pdf_path.to_path_buf(),
                }
            }
        } else {
            Pic2CsvError::CorruptPdf {
                path: pdf_path.to_path_buf(),
                detail: err_str,
            }
        }
    })
}

fn render_pages_blocking(
    pdf_path: &Path,
    max_pixels: u32,
    password: Option<&str>,
    page_indices: &[usize],
) -> Result<Vec<(usize, DynamicImage)>, Pic2CsvError> {
    let pdfium = bind_pdfium()?;
    let document = open_document(&pdfium, pdf_path, password)?;

    let pages = document.pages();
    let total_pages = pages.len() as usize;
    info!("PDF loaded: {} pages", total_pages);

    let render_config = PdfRenderConfig::new()
        .set_target_width(max_pixels as i32)
        .set_maximum_height(max_pixels as i32);

    let mut results = Vec::with_capacity(page_indices.len());

    for &idx in page_indices {
        if idx >= total_pages {
            warn!(
                "Skipping page {} (out of range, total={})",
                idx + 1,
                total_pages
            );
            continue;
        }

        let rasterisation_failed = |e: PdfiumError| Pic2CsvError::RasterisationFailed {
            page: idx + 1,
            detail: format!("{:?}", e),
        };
        let page = pages.get(idx as u16).map_err(rasterisation_failed)?;
        let bitmap = page
            .render_with_config(&render_config)
            .map_err(rasterisation_failed)?;

        let image = bitmap.as_image();
        debug!(
            "Rendered page {} → {}x{} px",
            idx + 1,
            image.width(),
            image.height()
        );
        results.push((idx, image));
    }

    Ok(results)
}
