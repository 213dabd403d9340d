//! Local completion adapters.

mod local_provider;
mod mock_provider;
mod sse;

pub use local_provider::{LocalCompletionProvider, LocalProviderConfig};
pub use mock_provider::{MockCompletionProvider, MockError, MockResponse};
pub use sse::{SseDecoder, SseEvent};
