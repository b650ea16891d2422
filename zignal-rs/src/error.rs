use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("csv: {0}")]
    Csv(#[from] csv::Error),
    #[error("tiff: {0}")]
    Tiff(#[from] tiff::TiffError),
    #[error("image: {0}")]
    Image(#[from] image::ImageError),
    #[error("invalid treatment pattern: {0}")]
    Regex(#[from] regex::Error),
    #[error("experiment file: {0}")]
    Config(#[from] toml::de::Error),
    #[error("input directory not found: {}", .0.display())]
    MissingDirectory(PathBuf),
    #[error("no sample records to compare")]
    EmptyDataset,
    #[error("control label {0:?} is not one of the declared treatments")]
    UnknownControl(String),
    #[error("unsupported pixel format: {0}")]
    UnsupportedPixelFormat(String),
    #[error("missing column {0:?} in {1}")]
    MissingColumn(String, String),
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("failed to render figure: {0}")]
    Plot(String),
}

impl<E: std::error::Error + Send + Sync + 'static> From<plotters::drawing::DrawingAreaErrorKind<E>>
    for Error
{
    fn from(value: plotters::drawing::DrawingAreaErrorKind<E>) -> Self {
        Error::Plot(format!("{value:?}"))
    }
}
