pub mod countdown_latch;
pub mod error;

pub use countdown_latch::CountdownLatch;
pub use error::LatchError;

/// Error returned by the demo binary and other callers that mix latch
/// failures with runtime errors.
///
/// The latch itself reports the specialized [`LatchError`] enum, since its
/// failures are part of normal control flow for callers. `std::error::Error`
/// is implemented for it, so it converts into this boxed type with `?`.
pub type Error = Box<dyn std::error::Error + Send + Sync>;

/// A specialized `Result` type paired with [`Error`].
pub type Result<T> = std::result::Result<T, Error>;
