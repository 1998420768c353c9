use legendre::LegendreErrors;
use thiserror::Error;

mod coefficients;
mod pines;

pub use coefficients::GravityCoefficients;
pub use pines::SphericalHarmonics;

#[derive(Debug, Error)]
pub enum SphericalHarmonicsErrors {
    #[error("LegendreError: {0}")]
    LegendreErrors(#[from] LegendreErrors),
    #[error("CsvError: {0}")]
    Csv(#[from] csv::Error),
    #[error("requested degree {requested} exceeds the loaded degree {loaded}")]
    DegreeExceedsTable { requested: usize, loaded: usize },
    #[error("requested degree {requested} exceeds the evaluator degree {allocated}")]
    DegreeExceedsEvaluator { requested: usize, allocated: usize },
    #[error("coefficient table rows must satisfy order <= degree")]
    MalformedTable,
    #[error("could not parse coefficient record {0}")]
    MalformedRecord(usize),
    #[error("gravitational parameter must be greater than zero")]
    NonPositiveMu,
    #[error("reference radius must be greater than zero")]
    NonPositiveRadius,
    #[error("harmonics are undefined at the center of the body")]
    ZeroPosition,
}
