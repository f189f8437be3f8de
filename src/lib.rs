//! A multiplexed archive stream format.
//!
//! Many logical files of arbitrary size are interleaved, chunk by chunk,
//! into a single byte stream that travels over pipes, FIFOs, or
//! stdin/stdout. Producers on parallel threads share one output through
//! [`stream::StreamWriter`]; a consumer walks the stream back with
//! [`stream::StreamReader`] and recovers every file, sparse regions
//! included, verifying a CRC-32 per chunk.
//!
//! The on-wire layout is documented in [`stream`].

mod buf;

pub mod checksum;
pub mod stream;

#[cfg(unix)]
pub mod create;
#[cfg(unix)]
pub mod extract;
#[cfg(unix)]
pub mod fifo;
