use crate::{
    cpu::sr_index::{CCB, PARAM1, PARAM2, PARAM3, SAVED_PC, USER_PC},
    isa::ridge::{event::Event, executor::RidgeCPU, ProcessorMode},
};

/// Captures processor context into the special registers for one event and
/// vectors through the CCB. The per-event behavior differs between kernel
/// and user entry; interrupts vector only out of user mode.
pub(in crate::isa::ridge) struct EventController {}

impl EventController {
    pub fn signal(cpu: &mut RidgeCPU, event: Event) {
        let user = cpu.mode == ProcessorMode::User;
        let mut do_vector = true;

        match event {
            Event::KernelCall { .. } => {
                // SR15 always receives the PC just past the KCALL
                if user {
                    cpu.srs[USER_PC] = cpu.pc;
                }
            }

            Event::DataAlignment | Event::Check | Event::TrapInstruction => {
                if user {
                    cpu.srs[SAVED_PC] = 1;
                    cpu.srs[USER_PC] = cpu.opc;
                } else {
                    cpu.srs[SAVED_PC] = cpu.opc;
                }
            }

            Event::IllegalInstruction { opcode } => {
                if user {
                    cpu.srs[SAVED_PC] = 1;
                    cpu.srs[USER_PC] = cpu.pc;
                } else {
                    cpu.srs[SAVED_PC] = cpu.pc;
                }
                cpu.srs[PARAM1] = opcode;
                cpu.srs[PARAM2] = cpu.srs.code_segment();
                cpu.srs[PARAM3] = cpu.pc;
            }

            Event::PageFault { segment, address } => {
                cpu.srs[SAVED_PC] = 1;
                cpu.srs[PARAM1] = 0xFFFF_FFFF;
                cpu.srs[PARAM2] = segment;
                cpu.srs[PARAM3] = address;
                cpu.srs[USER_PC] = cpu.opc;
            }

            Event::KernelViolation { d0, d1, d2 } => {
                if user {
                    cpu.srs[SAVED_PC] = 1;
                    cpu.srs[USER_PC] = cpu.opc;
                } else {
                    cpu.srs[SAVED_PC] = cpu.opc;
                }
                cpu.srs[PARAM1] = d0;
                cpu.srs[PARAM2] = d1;
                cpu.srs[PARAM3] = d2;
            }

            Event::ArithmeticTrap => {}

            Event::ExternalInterrupt => {
                if user {
                    // acknowledge delivers the IOIR and releases the latch
                    let ioir = cpu.ack_pending_interrupt();
                    cpu.srs[SAVED_PC] = ioir;
                    cpu.srs[USER_PC] = cpu.pc;
                } else {
                    // kernel consumes interrupts through ITEST instead
                    do_vector = false;
                }
            }

            Event::Switch0Interrupt => {
                if user {
                    cpu.srs[SAVED_PC] = 1;
                    cpu.srs[USER_PC] = cpu.pc;
                } else {
                    cpu.srs[SAVED_PC] = cpu.pc;
                }
            }

            Event::Timer1Interrupt | Event::Timer2Interrupt => {
                if user {
                    cpu.srs[SAVED_PC] = 1;
                    cpu.srs[USER_PC] = cpu.pc;
                } else {
                    do_vector = false;
                }
            }
        }

        if do_vector {
            let vector = cpu
                .memory
                .read_word(cpu.srs[CCB].wrapping_add(event.ccb_offset()));
            log::trace!("event {:?} vectors to {:#x}", event, vector);
            cpu.mode = ProcessorMode::Kernel;
            cpu.pc = vector;
        }
    }
}
