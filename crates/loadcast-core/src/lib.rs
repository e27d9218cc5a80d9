pub mod align;
pub mod error;
pub mod features;
pub mod holidays;
pub mod partition;
pub mod pipeline;
pub mod time;
pub mod timeline;

pub use error::{PipelineError, Result};
