//! Image Generator Adapters
//!
//! - **DisabledImageGenerator** - Default when image generation is off
//! - **MockImageGenerator** - Scripted outcomes for tests

mod disabled;
mod mock;

pub use disabled::DisabledImageGenerator;
pub use mock::MockImageGenerator;
