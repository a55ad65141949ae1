use crate::alert::{AlertDescription, AlertLevel};
use crate::controller::Direction;

/// The TLS engine whose record buffers are managed by a
/// [`DynamicTlsConnection`](crate::DynamicTlsConnection).
///
/// The engine keeps its protocol state (keys, sequence numbers, record
/// offsets) but owns no record memory: every call that produces or consumes
/// records is lent the TX and/or RX buffer it needs. Between calls the engine
/// must not retain references into those buffers. Bytes still queued in a
/// buffer are reported through [`Self::pending_output`] and
/// [`Self::pending_input`]; the same buffer, with its contents intact, is lent
/// again on the next call for as long as the matching counter is non-zero.
pub trait TlsEngine {
    type Config: ?Sized;
    type Error: core::fmt::Debug;

    /// Binds the engine to `config`. Any buffers the engine allocated for
    /// itself must be released here.
    fn setup(&mut self, config: &Self::Config) -> Result<(), Self::Error>;

    /// Size of the record buffer the engine expects for `direction`.
    ///
    /// Returning 0 leaves the choice to the connection, which then uses
    /// [`DEFAULT_RECORD_CAPACITY`](crate::DEFAULT_RECORD_CAPACITY).
    fn record_capacity(&self, direction: Direction) -> usize;

    /// Advances the handshake by as much as the transport allows.
    fn handshake(&mut self, tx: &mut [u8], rx: &mut [u8]) -> Result<(), Self::Error>;

    /// Encrypts application data into `tx` and writes it to the transport.
    ///
    /// Returns the number of plaintext bytes consumed from `data`.
    fn write(&mut self, tx: &mut [u8], data: &[u8]) -> Result<usize, Self::Error>;

    /// Writes any output still queued in `tx`.
    fn flush_output(&mut self, tx: &mut [u8]) -> Result<(), Self::Error>;

    /// Reads and decrypts records into `rx`, copying plaintext to `data`.
    fn read(&mut self, rx: &mut [u8], data: &mut [u8]) -> Result<usize, Self::Error>;

    fn send_alert(
        &mut self,
        tx: &mut [u8],
        level: AlertLevel,
        description: AlertDescription,
    ) -> Result<(), Self::Error>;

    fn close_notify(&mut self, tx: &mut [u8]) -> Result<(), Self::Error>;

    /// Resets the session so the engine can be reused for a new connection.
    /// Both buffers are lent because the engine may clear them.
    fn session_reset(&mut self, tx: &mut [u8], rx: &mut [u8]) -> Result<(), Self::Error>;

    /// Releases everything else the engine holds.
    fn free(&mut self);

    /// Bytes of the current TX buffer not yet written to the transport.
    fn pending_output(&self) -> usize;

    /// Decrypted bytes in the current RX buffer not yet read by the application.
    fn pending_input(&self) -> usize;

    /// Whether the transport signalled end-of-stream.
    fn end_of_stream(&self) -> bool;
}
