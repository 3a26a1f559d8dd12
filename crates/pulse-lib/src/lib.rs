pub mod config;
pub mod detectors;
pub mod envelope;
pub mod error;
pub mod filters;
pub mod io;
pub mod metrics;
pub mod normalize;
pub mod pipeline;
pub mod preprocess;
pub mod session;
pub mod signal;

pub use config::*;
pub use detectors::*;
pub use error::*;
pub use metrics::*;
pub use pipeline::*;
pub use signal::*;
