//! Persisted boot image (section 6.3, ambient stack addition): the
//! precomputed symbol table, datatype specs, error-message templates, system
//! object skeleton, and mezzanine source blocks an embedder can load once at
//! process start instead of re-deriving them every time.
//!
//! Serialized with `postcard` (compact, no schema negotiation needed since
//! producer and consumer are always the same crate version) and compressed
//! with `flate2`'s gzip, mirroring how the teacher's own persisted state
//! round-trips through `serde`.

use std::io::{Read as _, Write as _};

use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatatypeSpec {
    pub name: String,
    pub heart: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorTemplate {
    pub category: String,
    pub id: u32,
    pub template: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemObjectField {
    pub name: String,
    /// A textual literal (later parsed into a cell by the loader); the boot
    /// image itself carries no `Cell`s since `Cell` is not required to be
    /// `Serialize` (a `Block` cell's contents live in the heap, not the image).
    pub literal: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BootImage {
    pub symbols: Vec<String>,
    pub datatypes: Vec<DatatypeSpec>,
    pub error_templates: Vec<ErrorTemplate>,
    pub system_object: Vec<SystemObjectField>,
    /// Mezzanine-level source blocks, loaded and run once the heap and
    /// interner are up, in the order given.
    pub mezzanine: Vec<String>,
}

impl BootImage {
    #[must_use]
    pub fn new() -> Self {
        Self {
            symbols: Vec::new(),
            datatypes: Vec::new(),
            error_templates: Vec::new(),
            system_object: Vec::new(),
            mezzanine: Vec::new(),
        }
    }
}

impl Default for BootImage {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug)]
pub enum BootImageError {
    Io(std::io::Error),
    Postcard(postcard::Error),
}

impl std::fmt::Display for BootImageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(e) => write!(f, "boot image I/O failure: {e}"),
            Self::Postcard(e) => write!(f, "boot image serialization failure: {e}"),
        }
    }
}

impl std::error::Error for BootImageError {}

impl From<std::io::Error> for BootImageError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

impl From<postcard::Error> for BootImageError {
    fn from(e: postcard::Error) -> Self {
        Self::Postcard(e)
    }
}

/// Compresses and writes a boot image.
pub fn save(image: &BootImage, writer: impl Write) -> Result<(), BootImageError> {
    let bytes = postcard::to_allocvec(image)?;
    let mut encoder = GzEncoder::new(writer, Compression::default());
    encoder.write_all(&bytes)?;
    encoder.finish()?;
    Ok(())
}

/// Decompresses and parses a previously-saved boot image.
pub fn load(reader: impl Read) -> Result<BootImage, BootImageError> {
    let mut decoder = GzDecoder::new(reader);
    let mut bytes = Vec::new();
    decoder.read_to_end(&mut bytes)?;
    Ok(postcard::from_bytes(&bytes)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn save_then_load_round_trips() {
        let mut image = BootImage::new();
        image.symbols.push("self".to_owned());
        image.mezzanine.push("print [1 2 3]".to_owned());

        let mut buf = Vec::new();
        save(&image, &mut buf).unwrap();
        let loaded = load(buf.as_slice()).unwrap();
        assert_eq!(loaded.symbols, image.symbols);
        assert_eq!(loaded.mezzanine, image.mezzanine);
    }
}
