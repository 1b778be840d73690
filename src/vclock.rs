use std::{cell::Cell, rc::Rc};

/// Monotonic virtual clock, advanced by the processor once per step.
/// Clone-by-ref; not usable across threads.
#[derive(Clone)]
pub struct VirtualClockRef {
    time_ns: Rc<Cell<u64>>,
}

impl VirtualClockRef {
    pub fn new() -> Self {
        Self {
            time_ns: Rc::new(Cell::new(0)),
        }
    }

    pub fn advance(&self, delta_ns: u64) {
        let prev = self.time_ns.get();
        self.time_ns.set(prev.wrapping_add(delta_ns));
    }

    pub fn now(&self) -> u64 {
        self.time_ns.get()
    }
}

impl Default for VirtualClockRef {
    fn default() -> Self {
        Self::new()
    }
}

struct Pending {
    due: u64,
    seq: u64,
    callback: Box<dyn FnOnce()>,
}

/// Discrete-event queue devices use to schedule completion callbacks
/// against the virtual clock. The processor ticks it before every
/// instruction.
pub struct Scheduler {
    clock: VirtualClockRef,
    next_seq: u64,
    // kept sorted by (due, seq); earliest at the end so tick can pop
    queue: Vec<Pending>,
}

impl Scheduler {
    pub fn new(clock: VirtualClockRef) -> Self {
        Self {
            clock,
            next_seq: 0,
            queue: Vec::new(),
        }
    }

    /// Schedule `callback` to run once the clock has advanced by
    /// `delay_ns`. Returns an id usable with [`Scheduler::cancel`].
    pub fn schedule_in<F>(&mut self, delay_ns: u64, callback: F) -> u64
    where
        F: FnOnce() + 'static,
    {
        let due = self.clock.now().saturating_add(delay_ns);
        let seq = self.next_seq;
        self.next_seq += 1;
        self.queue.push(Pending {
            due,
            seq,
            callback: Box::new(callback),
        });
        self.queue
            .sort_unstable_by(|a, b| (b.due, b.seq).cmp(&(a.due, a.seq)));
        seq
    }

    /// Drop a not-yet-fired callback. Unknown ids are ignored.
    pub fn cancel(&mut self, seq: u64) {
        self.queue.retain(|p| p.seq != seq);
    }

    /// Run every callback whose due time has been reached.
    pub fn tick(&mut self) {
        let now = self.clock.now();
        while let Some(last) = self.queue.last() {
            if last.due > now {
                break;
            }
            let pending = self.queue.pop().unwrap();
            (pending.callback)();
        }
    }

    pub fn next_due(&self) -> Option<u64> {
        self.queue.last().map(|p| p.due)
    }
}
