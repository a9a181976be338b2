//! HTTP + SSE surface for the presentation layer

mod batch;
mod experiments;
mod health;
mod judgments;
mod progress;
mod session;
mod sse;

pub use batch::batch_routes;
pub use experiments::experiment_routes;
pub use health::health_routes;
pub use judgments::judgment_routes;
pub use progress::progress_routes;
pub use session::session_routes;
pub use sse::event_stream;
