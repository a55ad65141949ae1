#![cfg_attr(not(any(test, feature = "std")), no_std)]
#![doc = include_str!("../README.md")]
#![warn(clippy::pedantic)]
#![allow(
    clippy::module_name_repetitions,
    clippy::missing_errors_doc
)]

/*!
# Example

```
use embedded_tls_dynbuf::*;

# struct Loopback { out_left: usize }
# impl TlsEngine for Loopback {
#     type Config = ();
#     type Error = ();
#     fn setup(&mut self, _: &()) -> Result<(), ()> { Ok(()) }
#     fn record_capacity(&self, _: Direction) -> usize { 1024 }
#     fn handshake(&mut self, _: &mut [u8], _: &mut [u8]) -> Result<(), ()> { Ok(()) }
#     fn write(&mut self, _: &mut [u8], data: &[u8]) -> Result<usize, ()> { Ok(data.len()) }
#     fn flush_output(&mut self, _: &mut [u8]) -> Result<(), ()> { Ok(()) }
#     fn read(&mut self, _: &mut [u8], _: &mut [u8]) -> Result<usize, ()> { Ok(0) }
#     fn send_alert(&mut self, _: &mut [u8], _: AlertLevel, _: AlertDescription) -> Result<(), ()> { Ok(()) }
#     fn close_notify(&mut self, _: &mut [u8]) -> Result<(), ()> { Ok(()) }
#     fn session_reset(&mut self, _: &mut [u8], _: &mut [u8]) -> Result<(), ()> { Ok(()) }
#     fn free(&mut self) {}
#     fn pending_output(&self) -> usize { self.out_left }
#     fn pending_input(&self) -> usize { 0 }
#     fn end_of_stream(&self) -> bool { false }
# }
let budget = Budget::new(8 * 1024);
let mut tls = DynamicTlsConnection::new(Loopback { out_left: 0 }, &budget, BufferConfig::new());
tls.setup(&()).unwrap();

tls.write(b"ping").unwrap();

// The record was flushed entirely, so no buffer is held between calls.
assert_eq!(tls.live_buffers(), 0);
tls.free();
assert_eq!(budget.stats().live_buffers, 0);
```
*/

// This mod MUST go first, so that the others see its macros.
pub(crate) mod fmt;

extern crate alloc;

pub mod alert;
mod allocator;
mod completion;
mod config;
mod connection;
mod controller;
mod engine;
pub mod max_fragment_length;

pub use alert::{AlertDescription, AlertLevel};
pub use allocator::{AllocError, Budget, BufferAllocator, BufferStats, Heap, RecordBuffer};
pub use config::*;
pub use connection::DynamicTlsConnection;
pub use controller::Direction;
pub use engine::TlsEngine;
pub use max_fragment_length::MaxFragmentLength;

/// Errors surfaced by a [`DynamicTlsConnection`].
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DynTlsError<E> {
    /// A record buffer could not be obtained. The engine was not invoked and
    /// the connection can be retried.
    AllocationFailure,
    /// Error reported by the wrapped engine, passed through unchanged.
    Engine(E),
    /// The engine reported state the buffer controller cannot reconcile. The
    /// connection must be torn down.
    InvariantViolation,
}

impl<E> From<AllocError> for DynTlsError<E> {
    fn from(_: AllocError) -> Self {
        Self::AllocationFailure
    }
}

impl<E> embedded_io::Error for DynTlsError<E>
where
    E: embedded_io::Error,
{
    fn kind(&self) -> embedded_io::ErrorKind {
        match self {
            Self::AllocationFailure => embedded_io::ErrorKind::OutOfMemory,
            Self::Engine(e) => e.kind(),
            Self::InvariantViolation => {
                error!("TLS buffer invariant violated");
                embedded_io::ErrorKind::Other
            }
        }
    }
}
