// src/error.rs
//! Error types for the map renderer

use std::fmt;

pub type Result<T> = std::result::Result<T, MapError>;

#[derive(Debug)]
pub enum MapError {
    Io(std::io::Error),
    Json(serde_json::Error),
    Image(image::ImageError),
    Codec(String),
    BadMagic([u8; 4]),
    UnsupportedVersion(u16),
    TileName(String),
    Config(String),
    Other(String),
}

impl MapError {
    /// True when the error means "the file ended early" rather than "the file is wrong".
    pub fn is_truncation(&self) -> bool {
        matches!(self, MapError::Io(e) if e.kind() == std::io::ErrorKind::UnexpectedEof)
    }
}

impl fmt::Display for MapError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MapError::Io(e) => write!(f, "IO error: {}", e),
            MapError::Json(e) => write!(f, "JSON error: {}", e),
            MapError::Image(e) => write!(f, "Image error: {}", e),
            MapError::Codec(msg) => write!(f, "Codec error: {}", msg),
            MapError::BadMagic(magic) => write!(f, "Not a tile file (magic {:02x?})", magic),
            MapError::UnsupportedVersion(v) => write!(f, "Unsupported tile format version {}", v),
            MapError::TileName(name) => write!(f, "Invalid tile file name: {}", name),
            MapError::Config(msg) => write!(f, "Config error: {}", msg),
            MapError::Other(msg) => write!(f, "Error: {}", msg),
        }
    }
}

impl std::error::Error for MapError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            MapError::Io(e) => Some(e),
            MapError::Json(e) => Some(e),
            MapError::Image(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for MapError {
    fn from(error: std::io::Error) -> Self {
        MapError::Io(error)
    }
}

impl From<serde_json::Error> for MapError {
    fn from(error: serde_json::Error) -> Self {
        MapError::Json(error)
    }
}

impl From<image::ImageError> for MapError {
    fn from(error: image::ImageError) -> Self {
        MapError::Image(error)
    }
}

impl From<anyhow::Error> for MapError {
    fn from(error: anyhow::Error) -> Self {
        MapError::Other(error.to_string())
    }
}
