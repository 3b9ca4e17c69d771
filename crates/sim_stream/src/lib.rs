//! sim_stream - Stream Transport for streamed patient replies
//!
//! One [`StreamHandle`] is opened per clinician question. It yields framed
//! [`StreamEvent`]s in arrival order and guarantees exactly one terminal
//! outcome: `done`, `session_end`, or a [`TransportError`] (including the
//! silence watchdog timeout).

pub mod error;
pub mod event;
pub mod handle;
pub mod sse;
pub mod transport;

pub use error::TransportError;
pub use event::{parse_frame, FrameError, StreamEvent};
pub use handle::{StreamHandle, StreamSender, DEFAULT_SILENCE_TIMEOUT};
pub use sse::SseTransport;
pub use transport::{StreamRequest, StreamTransport};
