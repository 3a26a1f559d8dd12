pub mod hrv;
pub mod sqi;
pub mod stress;

pub use hrv::*;
pub use sqi::*;
pub use stress::*;
