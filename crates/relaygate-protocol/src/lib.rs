//! Wire types for the canonical chat-completion API and for the upstream
//! conversational / workflow / OAuth endpoints, plus the event-stream parser.
//!
//! Nothing in here performs IO.

pub mod coze;
pub mod openai;
pub mod sse;
