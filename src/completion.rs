use crate::controller::Direction;
use crate::engine::TlsEngine;

/// What the engine's pending counters say about a record buffer after a call.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(crate) enum Completion {
    /// Nothing left to flush or to hand to the application.
    Idle,
    /// Bytes remain in the buffer; it must stay attached.
    Pending(usize),
    /// The counter cannot be reconciled with the buffer that was lent to the
    /// engine: bytes are reported with no buffer attached, or more bytes than
    /// the buffer holds.
    Inconsistent { pending: usize },
}

impl Completion {
    fn evaluate(pending: usize, attached: Option<usize>) -> Self {
        match attached {
            _ if pending == 0 => Self::Idle,
            Some(len) if pending <= len => Self::Pending(pending),
            _ => Self::Inconsistent { pending },
        }
    }
}

/// TX is idle once the engine has no output left to write (`out_left == 0`).
pub(crate) fn tx_done<E: TlsEngine>(engine: &E, attached: Option<usize>) -> Completion {
    Completion::evaluate(engine.pending_output(), attached)
}

/// RX is idle once every decrypted byte was handed out (`in_msglen == 0`).
pub(crate) fn rx_done<E: TlsEngine>(engine: &E, attached: Option<usize>) -> Completion {
    let done = Completion::evaluate(engine.pending_input(), attached);
    if let Completion::Pending(left) = done {
        trace!("RX left {} bytes", left);
    }
    done
}

pub(crate) fn done<E: TlsEngine>(
    engine: &E,
    direction: Direction,
    attached: Option<usize>,
) -> Completion {
    match direction {
        Direction::Tx => tx_done(engine, attached),
        Direction::Rx => rx_done(engine, attached),
    }
}
