pub mod decoder;
pub mod event;
pub mod executor;
pub mod instruction;
pub mod mmu;
pub mod opcode;

mod cpu_tester;

use crate::CoreError;
use event::Event;
use mmu::MemFault;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessorMode {
    Kernel,
    User,
}

/// What an instruction handler can go wrong with. Architectural events are
/// consumed by the step loop; host errors abort it. Never use panics or
/// host exceptions for the architectural channel.
#[derive(Debug)]
pub(crate) enum Fault {
    Event(Event),
    Host(CoreError),
}

impl From<Event> for Fault {
    fn from(event: Event) -> Self {
        Fault::Event(event)
    }
}

impl From<CoreError> for Fault {
    fn from(err: CoreError) -> Self {
        Fault::Host(err)
    }
}

impl From<MemFault> for Fault {
    fn from(fault: MemFault) -> Self {
        match fault {
            MemFault::PageFault { segment, address } => {
                Fault::Event(Event::PageFault { segment, address })
            }
            MemFault::WalkOverrun { segment, address } => Fault::Host(CoreError::VrtWalkOverrun {
                segment,
                vaddr: address,
            }),
        }
    }
}
