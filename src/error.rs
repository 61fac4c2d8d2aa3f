use thiserror::Error;

/// Errors surfaced by the GIS file parsing pipeline.
///
/// Decoder-level failures propagate to the caller with a human-readable
/// message; per-entity DXF conversion failures are swallowed inside the
/// decoder and never reach this enum.
#[derive(Debug, Error)]
pub enum GisError {
    /// File extension is not in the supported set.
    #[error("unsupported file format: .{0}")]
    UnsupportedFormat(String),

    /// A decoder ran to completion but produced zero features. An empty
    /// layer is indistinguishable from a parse failure downstream, so it is
    /// always rejected.
    #[error("no features found in '{0}'")]
    EmptyLayer(String),

    /// The input bytes do not match the structure the format requires.
    #[error("malformed {format}: {message}")]
    Malformed { format: &'static str, message: String },

    /// A bare `.shp` was supplied without its companion files.
    #[error(
        "a .shp file cannot be parsed on its own; bundle it with its .dbf/.shx companions in a ZIP archive"
    )]
    ShapefileCompanions,

    /// A KMZ archive contained no `.kml` entry.
    #[error("no KML document found in KMZ archive")]
    NoKmlInKmz,

    /// A ZIP archive contained neither a shapefile bundle nor any file with
    /// a supported GIS extension.
    #[error("no GIS files found in ZIP archive")]
    NoGisInZip,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid ZIP archive: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid DXF: {0}")]
    Dxf(#[from] dxf::DxfError),

    #[error("invalid shapefile: {0}")]
    Shapefile(#[from] shapefile::Error),
}

impl GisError {
    pub(crate) fn malformed(format: &'static str, message: impl Into<String>) -> Self {
        GisError::Malformed {
            format,
            message: message.into(),
        }
    }
}
