use snafu::Snafu;
use std::path::PathBuf;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum ContourError {
    #[snafu(display("contour data has {} values, expected a multiple of {}", actual, stride))]
    Cardinality { actual: usize, stride: usize },

    #[snafu(display("error reading contour CSV {}: {:?}", path.display(), source))]
    Csv {
        path: PathBuf,
        #[snafu(source(from(csv::Error, Box::new)))]
        source: Box<csv::Error>,
    },

    #[snafu(display("could not read contour data {}: {}", path.display(), source))]
    Io {
        path: PathBuf,
        #[snafu(source(from(std::io::Error, Box::new)))]
        source: Box<std::io::Error>,
    },

    #[snafu(display("missing column '{}' in contour CSV {}", name, path.display()))]
    MissingColumn { name: &'static str, path: PathBuf },

    #[snafu(display("invalid coordinate '{}' on line {} of {}", value, line, path.display()))]
    InvalidCoordinate {
        value: String,
        line: usize,
        path: PathBuf,
    },
}
