pub mod event_controller;

use crate::config::ccb;

/// A request to enter a kernel handler through the CCB. Events are plain
/// values observed by the step loop; per-type special-register writes live
/// in the [`event_controller`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    /// Kernel call; `number` selects one of the 256 vectors at the start of
    /// the CCB.
    KernelCall { number: u8 },
    DataAlignment,
    IllegalInstruction { opcode: u32 },
    TrapInstruction,
    PageFault { segment: u32, address: u32 },
    KernelViolation { d0: u32, d1: u32, d2: u32 },
    Check,
    ArithmeticTrap,
    ExternalInterrupt,
    Switch0Interrupt,
    Timer1Interrupt,
    Timer2Interrupt,
}

impl Event {
    pub fn ccb_offset(&self) -> u32 {
        match self {
            Event::KernelCall { number } => 4 * *number as u32,
            Event::DataAlignment => ccb::DATA_ALIGNMENT,
            Event::IllegalInstruction { .. } => ccb::ILLEGAL_INSTRUCTION,
            Event::TrapInstruction => ccb::TRAP_INSTRUCTION,
            Event::PageFault { .. } => ccb::PAGE_FAULT,
            Event::KernelViolation { .. } => ccb::KERNEL_VIOLATION,
            Event::Check => ccb::CHECK,
            Event::ArithmeticTrap => ccb::ARITHMETIC_TRAP,
            Event::ExternalInterrupt => ccb::EXTERNAL_INTERRUPT,
            Event::Switch0Interrupt => ccb::SWITCH0_INTERRUPT,
            Event::Timer1Interrupt => ccb::TIMER1_INTERRUPT,
            Event::Timer2Interrupt => ccb::TIMER2_INTERRUPT,
        }
    }
}
