use crate::DynTlsError;
use crate::alert::{AlertDescription, AlertLevel};
use crate::allocator::BufferAllocator;
use crate::completion::{self, Completion};
use crate::config::BufferConfig;
use crate::controller::{BufferController, Direction, InvariantViolation};
use crate::engine::TlsEngine;

/// A TLS engine whose record buffers only exist while they hold data.
///
/// Every engine operation is bracketed: the buffer it needs is attached
/// before the call, and released right after it if the engine reports it idle.
/// An idle connection therefore holds no record memory at all.
///
/// Dropping the connection has the same effect as [`Self::free`].
pub struct DynamicTlsConnection<E, A>
where
    E: TlsEngine,
    A: BufferAllocator,
{
    engine: E,
    buffers: BufferController<A>,
    config: BufferConfig,
    poisoned: bool,
    freed: bool,
}

impl<E, A> DynamicTlsConnection<E, A>
where
    E: TlsEngine,
    A: BufferAllocator,
{
    /// Wrap `engine`, taking record memory from `allocator`.
    ///
    /// No buffer is allocated until an operation needs one.
    pub fn new(engine: E, allocator: A, config: BufferConfig) -> Self {
        let tx_capacity = config.capacity(Direction::Tx, engine.record_capacity(Direction::Tx));
        let rx_capacity = config.capacity(Direction::Rx, engine.record_capacity(Direction::Rx));
        Self {
            engine,
            buffers: BufferController::new(
                allocator,
                config.release_policy(),
                tx_capacity,
                rx_capacity,
            ),
            config,
            poisoned: false,
            freed: false,
        }
    }

    /// Configure the engine for a new session.
    ///
    /// Buffers held for a previous session are released and both directions
    /// are sized again from the engine's record capacity.
    pub fn setup(&mut self, config: &E::Config) -> Result<(), DynTlsError<E::Error>> {
        self.check()?;
        let ret = self.engine.setup(config);

        self.buffers.release_all();
        for direction in [Direction::Tx, Direction::Rx] {
            let capacity = self
                .config
                .capacity(direction, self.engine.record_capacity(direction));
            self.buffers.set_capacity(direction, capacity);
        }

        ret.map_err(DynTlsError::Engine)
    }

    /// Drive the handshake. Both buffers are attached for the call and kept
    /// only while the engine has records in flight.
    pub fn handshake(&mut self) -> Result<(), DynTlsError<E::Error>> {
        self.check()?;
        let (tx, rx) = self.buffers.ensure_both()?;
        let ret = self.engine.handshake(tx, rx);

        let tx_settled = self.settle(Direction::Tx);
        let rx_settled = self.settle(Direction::Rx);
        tx_settled.and(rx_settled)?;
        ret.map_err(DynTlsError::Engine)
    }

    /// Encrypt and send `data`. Returns the number of plaintext bytes consumed.
    ///
    /// If the engine could not write the whole record the TX buffer is kept,
    /// and the rest goes out on the next write or [`Self::flush`].
    pub fn write(&mut self, data: &[u8]) -> Result<usize, DynTlsError<E::Error>> {
        self.check()?;
        let tx = self.buffers.ensure_present(Direction::Tx)?;
        let ret = self.engine.write(tx, data);

        self.settle(Direction::Tx)?;
        ret.map_err(DynTlsError::Engine)
    }

    /// Write out whatever the engine still has queued. Without a TX buffer
    /// there is nothing queued and the engine is not called.
    pub fn flush(&mut self) -> Result<(), DynTlsError<E::Error>> {
        self.check()?;
        let Some(tx) = self.buffers.get_mut(Direction::Tx) else {
            return Ok(());
        };
        let ret = self.engine.flush_output(tx);

        self.settle(Direction::Tx)?;
        ret.map_err(DynTlsError::Engine)
    }

    /// Read and decrypt into `data`.
    ///
    /// Returns `Ok(0)` without touching the engine when the peer has closed
    /// the transport and nothing is left buffered.
    pub fn read(&mut self, data: &mut [u8]) -> Result<usize, DynTlsError<E::Error>> {
        self.check()?;
        if data.is_empty() {
            return Ok(0);
        }
        if self.engine.pending_input() == 0 && self.engine.end_of_stream() {
            trace!("connection indicated EOF");
            return Ok(0);
        }
        let rx = self.buffers.ensure_present(Direction::Rx)?;
        let ret = self.engine.read(rx, data);

        self.settle(Direction::Rx)?;
        ret.map_err(DynTlsError::Engine)
    }

    pub fn send_alert(
        &mut self,
        level: AlertLevel,
        description: AlertDescription,
    ) -> Result<(), DynTlsError<E::Error>> {
        self.check()?;
        let tx = self.buffers.ensure_present(Direction::Tx)?;
        let ret = self.engine.send_alert(tx, level, description);

        self.settle(Direction::Tx)?;
        ret.map_err(DynTlsError::Engine)
    }

    /// Notify the peer that no more data will be sent.
    pub fn close_notify(&mut self) -> Result<(), DynTlsError<E::Error>> {
        self.check()?;
        let tx = self.buffers.ensure_present(Direction::Tx)?;
        let ret = self.engine.close_notify(tx);

        self.settle(Direction::Tx)?;
        ret.map_err(DynTlsError::Engine)
    }

    /// Reset the session so the connection can be reused.
    ///
    /// Both buffers are attached for the reset and released afterwards,
    /// whatever the outcome. The engine must report both directions idle once
    /// the reset returns; otherwise the connection is poisoned.
    pub fn session_reset(&mut self) -> Result<(), DynTlsError<E::Error>> {
        self.check()?;
        let (tx, rx) = self.buffers.ensure_both()?;
        let ret = self.engine.session_reset(tx, rx);

        self.buffers.release_all();
        for direction in [Direction::Tx, Direction::Rx] {
            if let Completion::Inconsistent { pending } =
                completion::done(&self.engine, direction, None)
            {
                error!("{:?} still has {} bytes pending after reset", direction, pending);
                return Err(self.poison());
            }
        }

        ret.map_err(DynTlsError::Engine)
    }

    /// Tear the connection down, releasing both buffers and the engine.
    pub fn free(mut self) {
        self.teardown();
    }

    /// Decrypted bytes ready to be read without touching the transport.
    pub fn bytes_available(&self) -> usize {
        if self.buffers.is_present(Direction::Rx) {
            self.engine.pending_input()
        } else {
            0
        }
    }

    /// Number of record buffers currently held, between 0 and 2.
    pub fn live_buffers(&self) -> usize {
        self.buffers.live_buffers()
    }

    pub fn is_present(&self, direction: Direction) -> bool {
        self.buffers.is_present(direction)
    }

    /// Size of the next buffer allocated for `direction`.
    pub fn capacity(&self, direction: Direction) -> usize {
        self.buffers.capacity(direction)
    }

    /// Whether the connection hit an unrecoverable buffer inconsistency.
    /// A poisoned connection only accepts [`Self::free`].
    pub fn is_poisoned(&self) -> bool {
        self.poisoned
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn allocator(&self) -> &A {
        self.buffers.allocator()
    }

    pub fn config(&self) -> &BufferConfig {
        &self.config
    }

    fn check(&self) -> Result<(), DynTlsError<E::Error>> {
        if self.poisoned {
            Err(DynTlsError::InvariantViolation)
        } else {
            Ok(())
        }
    }

    /// Post-call step: release the buffer for `direction` if the engine is
    /// done with it.
    fn settle(&mut self, direction: Direction) -> Result<(), DynTlsError<E::Error>> {
        let completion =
            completion::done(&self.engine, direction, self.buffers.attached(direction));
        match self.buffers.release_if_idle(direction, completion) {
            Ok(()) => Ok(()),
            Err(InvariantViolation) => Err(self.poison()),
        }
    }

    fn poison(&mut self) -> DynTlsError<E::Error> {
        if !self.poisoned {
            error!("record buffer state is inconsistent, connection must be freed");
            self.poisoned = true;
        }
        DynTlsError::InvariantViolation
    }

    fn teardown(&mut self) {
        if !self.freed {
            self.buffers.release_all();
            self.engine.free();
            self.freed = true;
        }
    }
}

impl<E, A> Drop for DynamicTlsConnection<E, A>
where
    E: TlsEngine,
    A: BufferAllocator,
{
    fn drop(&mut self) {
        self.teardown();
    }
}

impl<E, A> embedded_io::ErrorType for DynamicTlsConnection<E, A>
where
    E: TlsEngine,
    E::Error: embedded_io::Error,
    A: BufferAllocator,
{
    type Error = DynTlsError<E::Error>;
}

impl<E, A> embedded_io::Read for DynamicTlsConnection<E, A>
where
    E: TlsEngine,
    E::Error: embedded_io::Error,
    A: BufferAllocator,
{
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        DynamicTlsConnection::read(self, buf)
    }
}

impl<E, A> embedded_io::Write for DynamicTlsConnection<E, A>
where
    E: TlsEngine,
    E::Error: embedded_io::Error,
    A: BufferAllocator,
{
    fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        DynamicTlsConnection::write(self, buf)
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        DynamicTlsConnection::flush(self)
    }
}
