//! Pipeline stages of the extraction service.
//!
//! Each submodule implements exactly one transformation step, so each can be
//! tested without a network or a pdfium library.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ render ──▶ encode ──▶ llm ──▶ parse
//! (path/URL) (pdfium)  (base64)  (VLM)   (JSON → TablePayload)
//! ```
//!
//! 1. [`input`]  — resolve a path or URL to a local file; enforce the size
//!    limit and sniff the file type from magic bytes
//! 2. [`render`] — rasterise selected PDF pages; runs in `spawn_blocking`
//!    because pdfium is not async-safe (images skip this stage)
//! 3. [`encode`] — base64-wrap each image for the multimodal request,
//!    downscaling anything over `max_rendered_pixels`
//! 4. [`llm`]    — the VLM call with retry/backoff; the only stage with
//!    network I/O besides URL download
//! 5. [`parse`]  — fence stripping, JSON repair and normalisation into
//!    [`crate::output::TablePayload`]s

pub mod encode;
pub mod input;
pub mod llm;
pub mod parse;
pub mod render;
