//! The pub/sub message bus connecting console, router, and adapters.
//!
//! # Architecture
//!
//! - **envelope**: Wire envelope types (`CMD` / `RSP` kinds, scalar-or-list
//!   payload fields)
//! - **codec**: Multipart framing codec for AsyncRead/AsyncWrite
//! - **transport**: The publish/subscribe socket pair with non-blocking
//!   receive and runtime rebinding

pub mod codec;
pub mod envelope;
pub mod transport;
