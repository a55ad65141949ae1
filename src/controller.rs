use crate::allocator::{AllocError, BufferAllocator, RecordBuffer};
use crate::completion::Completion;
use crate::config::ReleasePolicy;

/// Which of the two record buffers of a connection an action applies to.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Direction {
    Tx,
    Rx,
}

/// The engine left a buffer in a state its pending counter cannot account for.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(crate) struct InvariantViolation;

#[derive(Debug)]
struct Slot {
    buffer: Option<RecordBuffer>,
    capacity: usize,
}

impl Slot {
    fn new(capacity: usize) -> Self {
        Self {
            buffer: None,
            capacity,
        }
    }
}

/// Owns the TX and RX record buffers of one connection and decides when each
/// is allocated and released.
///
/// Each direction holds at most one buffer. Buffers are only lent to the
/// engine for the duration of a call, so nothing outside the controller can
/// observe a buffer after it was released.
#[derive(Debug)]
pub(crate) struct BufferController<A>
where
    A: BufferAllocator,
{
    allocator: A,
    policy: ReleasePolicy,
    tx: Slot,
    rx: Slot,
}

impl<A> BufferController<A>
where
    A: BufferAllocator,
{
    pub(crate) fn new(
        allocator: A,
        policy: ReleasePolicy,
        tx_capacity: usize,
        rx_capacity: usize,
    ) -> Self {
        Self {
            allocator,
            policy,
            tx: Slot::new(tx_capacity),
            rx: Slot::new(rx_capacity),
        }
    }

    fn slot(&self, direction: Direction) -> &Slot {
        match direction {
            Direction::Tx => &self.tx,
            Direction::Rx => &self.rx,
        }
    }

    fn slot_mut(&mut self, direction: Direction) -> &mut Slot {
        match direction {
            Direction::Tx => &mut self.tx,
            Direction::Rx => &mut self.rx,
        }
    }

    pub(crate) fn allocator(&self) -> &A {
        &self.allocator
    }

    pub(crate) fn capacity(&self, direction: Direction) -> usize {
        self.slot(direction).capacity
    }

    /// Sets the size of buffers allocated from now on. An attached buffer
    /// keeps its size until it is released.
    pub(crate) fn set_capacity(&mut self, direction: Direction, capacity: usize) {
        self.slot_mut(direction).capacity = capacity;
    }

    pub(crate) fn is_present(&self, direction: Direction) -> bool {
        self.slot(direction).buffer.is_some()
    }

    /// Length of the buffer attached for `direction`, if any.
    pub(crate) fn attached(&self, direction: Direction) -> Option<usize> {
        self.slot(direction).buffer.as_ref().map(|b| b.len())
    }

    pub(crate) fn live_buffers(&self) -> usize {
        usize::from(self.tx.buffer.is_some()) + usize::from(self.rx.buffer.is_some())
    }

    /// Attaches a buffer for `direction` unless one is already attached, and
    /// returns it for the engine call that needs it.
    pub(crate) fn ensure_present(
        &mut self,
        direction: Direction,
    ) -> Result<&mut [u8], AllocError> {
        let Self { allocator, tx, rx, .. } = self;
        let slot = match direction {
            Direction::Tx => tx,
            Direction::Rx => rx,
        };
        provision(allocator, slot, direction)
    }

    /// Attaches both buffers, as needed by calls that touch both directions.
    ///
    /// When the RX allocation fails a TX buffer attached by this call stays
    /// attached; it is idle and will be reclaimed by the next release.
    pub(crate) fn ensure_both(&mut self) -> Result<(&mut [u8], &mut [u8]), AllocError> {
        let Self { allocator, tx, rx, .. } = self;
        let tx = provision(allocator, tx, Direction::Tx)?;
        let rx = provision(allocator, rx, Direction::Rx)?;
        Ok((tx, rx))
    }

    /// Lends the attached buffer for `direction` without allocating.
    pub(crate) fn get_mut(&mut self, direction: Direction) -> Option<&mut [u8]> {
        self.slot_mut(direction).buffer.as_deref_mut()
    }

    /// Releases the buffer for `direction` if the engine no longer needs it.
    ///
    /// With [`ReleasePolicy::Retain`] an idle buffer stays attached. An
    /// inconsistent completion leaves the buffer in place and reports the
    /// violation; the caller is expected to tear the connection down.
    pub(crate) fn release_if_idle(
        &mut self,
        direction: Direction,
        completion: Completion,
    ) -> Result<(), InvariantViolation> {
        match completion {
            Completion::Idle => {
                if self.policy.releases_idle() {
                    self.force_release(direction);
                }
                Ok(())
            }
            Completion::Pending(left) => {
                debug!("{:?} buffer retained, {} bytes pending", direction, left);
                Ok(())
            }
            Completion::Inconsistent { pending } => {
                error!(
                    "{:?} reports {} pending bytes, attached buffer {:?}",
                    direction,
                    pending,
                    self.attached(direction)
                );
                Err(InvariantViolation)
            }
        }
    }

    /// Detaches and frees the buffer for `direction`. No-op when absent.
    pub(crate) fn force_release(&mut self, direction: Direction) {
        let Self { allocator, tx, rx, .. } = self;
        let slot = match direction {
            Direction::Tx => tx,
            Direction::Rx => rx,
        };
        if let Some(buffer) = slot.buffer.take() {
            debug!("free {:?} buffer ({} bytes)", direction, buffer.len());
            allocator.release(buffer);
        }
    }

    pub(crate) fn release_all(&mut self) {
        self.force_release(Direction::Tx);
        self.force_release(Direction::Rx);
    }
}

fn provision<'s, A: BufferAllocator>(
    allocator: &A,
    slot: &'s mut Slot,
    direction: Direction,
) -> Result<&'s mut [u8], AllocError> {
    let buffer = match slot.buffer.take() {
        Some(buffer) => buffer,
        None => {
            let buffer = allocator.allocate(slot.capacity).inspect_err(|_| {
                warn!("failed to allocate {:?} buffer ({} bytes)", direction, slot.capacity);
            })?;
            debug!("add {:?} buffer ({} bytes)", direction, buffer.len());
            buffer
        }
    };
    let buf: &mut [u8] = slot.buffer.insert(buffer);
    Ok(buf)
}
