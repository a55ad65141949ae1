//! A scriptable engine that moves plaintext through the lent record buffers
//! without any cryptography.
//!
//! Outgoing records are staged in the TX buffer and drained to `sent` at most
//! `transport_limit` bytes per call, so tests can leave output pending.
//! Incoming records are queued in `incoming` and copied into the RX buffer
//! when the previous one has been consumed.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use embedded_tls_dynbuf::{AlertDescription, AlertLevel, Direction, TlsEngine};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockError {
    WouldBlock,
    Eof,
    Fatal,
    RecordOverflow,
}

impl embedded_io::Error for MockError {
    fn kind(&self) -> embedded_io::ErrorKind {
        match self {
            Self::WouldBlock => embedded_io::ErrorKind::Interrupted,
            Self::Eof => embedded_io::ErrorKind::ConnectionReset,
            Self::Fatal => embedded_io::ErrorKind::Other,
            Self::RecordOverflow => embedded_io::ErrorKind::InvalidData,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Setup,
    Handshake { tx: usize, rx: usize },
    Write { tx: usize, len: usize },
    Flush { tx: usize },
    Read { rx: usize, len: usize },
    SendAlert { tx: usize, level: AlertLevel, description: AlertDescription },
    CloseNotify { tx: usize },
    SessionReset { tx: usize, rx: usize },
    Free,
}

#[derive(Debug, Clone, Copy)]
pub struct MockConfig {
    pub record_capacity: usize,
}

#[derive(Debug, Default)]
pub struct EngineState {
    pub calls: Vec<Call>,
    pub capacity: usize,
    /// Bytes of the staged TX record not yet written (`out_left`).
    pub out_left: usize,
    /// Length of the staged TX record.
    pub out_record: usize,
    /// Unread decrypted bytes in RX (`in_msglen`).
    pub in_msglen: usize,
    pub in_offset: usize,
    pub eof: bool,
    /// Transport accepts at most this many bytes per call.
    pub transport_limit: Option<usize>,
    pub incoming: VecDeque<Vec<u8>>,
    pub sent: Vec<u8>,
    /// Returned by the next operation instead of doing anything.
    pub fail_next: Option<MockError>,
    /// Counters left behind by a reset, to simulate an engine that still
    /// references its buffers.
    pub stuck_after_reset: Option<(usize, usize)>,
    /// Overrides `out_left` after the next write, however much was sent.
    pub bogus_out_left: Option<usize>,
    /// Bytes the handshake writes as its single flight.
    pub handshake_flight: usize,
}

pub type Handle = Rc<RefCell<EngineState>>;

pub struct MockEngine {
    state: Handle,
}

impl MockEngine {
    pub fn new(capacity: usize) -> (Self, Handle) {
        let state = Rc::new(RefCell::new(EngineState {
            capacity,
            handshake_flight: 64,
            ..EngineState::default()
        }));
        (
            Self {
                state: state.clone(),
            },
            state,
        )
    }

    fn injected_failure(&self) -> Result<(), MockError> {
        match self.state.borrow_mut().fail_next.take() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

impl EngineState {
    fn stage(&mut self, tx: &mut [u8], record: &[u8]) -> Result<(), MockError> {
        if record.len() > tx.len() {
            return Err(MockError::RecordOverflow);
        }
        tx[..record.len()].copy_from_slice(record);
        self.out_record = record.len();
        self.out_left = record.len();
        Ok(())
    }

    /// Drains staged output as far as the transport allows.
    fn drain(&mut self, tx: &[u8]) -> Result<(), MockError> {
        let start = self.out_record - self.out_left;
        let n = self
            .transport_limit
            .map_or(self.out_left, |limit| limit.min(self.out_left));
        self.sent.extend_from_slice(&tx[start..start + n]);
        self.out_left -= n;
        if self.out_left > 0 {
            Err(MockError::WouldBlock)
        } else {
            Ok(())
        }
    }
}

impl TlsEngine for MockEngine {
    type Config = MockConfig;
    type Error = MockError;

    fn setup(&mut self, config: &MockConfig) -> Result<(), MockError> {
        self.injected_failure()?;
        let mut state = self.state.borrow_mut();
        state.calls.push(Call::Setup);
        state.capacity = config.record_capacity;
        state.out_left = 0;
        state.in_msglen = 0;
        Ok(())
    }

    fn record_capacity(&self, _direction: Direction) -> usize {
        self.state.borrow().capacity
    }

    fn handshake(&mut self, tx: &mut [u8], rx: &mut [u8]) -> Result<(), MockError> {
        self.injected_failure()?;
        let mut state = self.state.borrow_mut();
        state.calls.push(Call::Handshake {
            tx: tx.len(),
            rx: rx.len(),
        });
        let flight = vec![0x16; state.handshake_flight];
        state.stage(tx, &flight)?;
        state.drain(tx)
    }

    fn write(&mut self, tx: &mut [u8], data: &[u8]) -> Result<usize, MockError> {
        self.injected_failure()?;
        let mut state = self.state.borrow_mut();
        state.calls.push(Call::Write {
            tx: tx.len(),
            len: data.len(),
        });
        // Queued output goes first, like a real record layer.
        if state.out_left > 0 {
            state.drain(tx)?;
        }
        let n = data.len().min(tx.len());
        state.stage(tx, &data[..n])?;
        let drained = state.drain(tx);
        if let Some(bogus) = state.bogus_out_left.take() {
            state.out_left = bogus;
        }
        match drained {
            Ok(()) | Err(MockError::WouldBlock) => Ok(n),
            Err(e) => Err(e),
        }
    }

    fn flush_output(&mut self, tx: &mut [u8]) -> Result<(), MockError> {
        self.injected_failure()?;
        let mut state = self.state.borrow_mut();
        state.calls.push(Call::Flush { tx: tx.len() });
        state.drain(tx)
    }

    fn read(&mut self, rx: &mut [u8], data: &mut [u8]) -> Result<usize, MockError> {
        self.injected_failure()?;
        let mut state = self.state.borrow_mut();
        state.calls.push(Call::Read {
            rx: rx.len(),
            len: data.len(),
        });
        if state.in_msglen == 0 {
            let Some(record) = state.incoming.pop_front() else {
                return Err(if state.eof {
                    MockError::Eof
                } else {
                    MockError::WouldBlock
                });
            };
            if record.len() > rx.len() {
                return Err(MockError::RecordOverflow);
            }
            rx[..record.len()].copy_from_slice(&record);
            state.in_msglen = record.len();
            state.in_offset = 0;
        }
        let n = state.in_msglen.min(data.len());
        let start = state.in_offset;
        data[..n].copy_from_slice(&rx[start..start + n]);
        state.in_offset += n;
        state.in_msglen -= n;
        Ok(n)
    }

    fn send_alert(
        &mut self,
        tx: &mut [u8],
        level: AlertLevel,
        description: AlertDescription,
    ) -> Result<(), MockError> {
        self.injected_failure()?;
        let mut state = self.state.borrow_mut();
        state.calls.push(Call::SendAlert {
            tx: tx.len(),
            level,
            description,
        });
        state.stage(tx, &[level as u8, description as u8])?;
        state.drain(tx)
    }

    fn close_notify(&mut self, tx: &mut [u8]) -> Result<(), MockError> {
        self.injected_failure()?;
        let mut state = self.state.borrow_mut();
        state.calls.push(Call::CloseNotify { tx: tx.len() });
        state.stage(tx, &[AlertLevel::Warning as u8, AlertDescription::CloseNotify as u8])?;
        state.drain(tx)
    }

    fn session_reset(&mut self, tx: &mut [u8], rx: &mut [u8]) -> Result<(), MockError> {
        self.injected_failure()?;
        let mut state = self.state.borrow_mut();
        state.calls.push(Call::SessionReset {
            tx: tx.len(),
            rx: rx.len(),
        });
        tx.fill(0);
        rx.fill(0);
        let (out_left, in_msglen) = state.stuck_after_reset.take().unwrap_or((0, 0));
        state.out_left = out_left;
        state.out_record = out_left;
        state.in_msglen = in_msglen;
        state.in_offset = 0;
        state.eof = false;
        Ok(())
    }

    fn free(&mut self) {
        self.state.borrow_mut().calls.push(Call::Free);
    }

    fn pending_output(&self) -> usize {
        self.state.borrow().out_left
    }

    fn pending_input(&self) -> usize {
        self.state.borrow().in_msglen
    }

    fn end_of_stream(&self) -> bool {
        let state = self.state.borrow();
        state.eof && state.incoming.is_empty()
    }
}
