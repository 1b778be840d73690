use crate::{
    config::{ccb, machine_config, pcb},
    cpu::{sr_index, RegFile, SpecialRegs},
    device::{IoBus, STATUS_MASK},
    isa::ridge::{
        decoder::{self, Decoded},
        event::{event_controller::EventController, Event},
        instruction::exec_mapping::get_exec_func,
        mmu::{MemFault, MemoryController},
        Fault, ProcessorMode,
    },
    vclock::{Scheduler, VirtualClockRef},
    CoreError,
};

/// The Ridge 32 processor: register file, special registers, mode, and the
/// fetch/dispatch/execute loop. Owns the memory controller and the I/O bus
/// for the duration of every step; hosts may inspect state between steps
/// through the accessor methods.
pub struct RidgeCPU {
    pub(crate) regs: RegFile,
    pub(crate) srs: SpecialRegs,
    pub(crate) pc: u32,
    /// PC at the start of the current step; PC-relative addressing and most
    /// event captures use this, not the advanced PC.
    pub(crate) opc: u32,
    pub(crate) mode: ProcessorMode,
    pub(crate) memory: MemoryController,
    pub(crate) bus: Box<dyn IoBus>,
    /// Latched interrupt requester, held until delivered or ITESTed.
    pub(crate) pending_device: Option<u8>,
    tick: u32,
    clock: VirtualClockRef,
    pub(crate) scheduler: Scheduler,
}

impl RidgeCPU {
    pub fn from_memory(memory: MemoryController, bus: Box<dyn IoBus>) -> Self {
        let clock = VirtualClockRef::new();
        let mut cpu = Self {
            regs: RegFile::new(),
            srs: SpecialRegs::new(),
            pc: 0,
            opc: 0,
            mode: ProcessorMode::Kernel,
            memory,
            bus,
            pending_device: None,
            tick: 0,
            scheduler: Scheduler::new(clock.clone()),
            clock,
        };
        cpu.reset();
        cpu
    }

    /// Power-on state: kernel mode at the boot PROM entry, no CCB, no PCB,
    /// memory size reported in SR2.
    pub fn reset(&mut self) {
        self.regs = RegFile::new();
        self.srs = SpecialRegs::new();
        self.mode = ProcessorMode::Kernel;
        self.pc = machine_config::RESET_PC;
        self.opc = self.pc;
        self.srs[sr_index::CCB] = 1;
        self.srs[sr_index::PCB] = 1;
        self.srs[sr_index::PARAM2] = self.memory.ram().len() as u32;
        self.pending_device = None;
        self.tick = 0;
    }

    /// Execute one instruction. Architectural events are absorbed here;
    /// only host-detected impossibilities come back as errors.
    pub fn step(&mut self) -> Result<(), CoreError> {
        self.clock.advance(machine_config::STEP_NS);
        self.scheduler.tick();

        self.opc = self.pc;
        let decoded = match decoder::fetch(&mut self.memory, &self.srs, self.mode, self.pc) {
            Ok(decoded) => decoded,
            Err(MemFault::PageFault { segment, address }) => {
                // PC must not advance on a fetch fault
                EventController::signal(self, Event::PageFault { segment, address });
                return Ok(());
            }
            Err(MemFault::WalkOverrun { segment, address }) => {
                return Err(CoreError::VrtWalkOverrun {
                    segment,
                    vaddr: address,
                });
            }
        };

        match decoded {
            Decoded::Known(instr) => {
                self.pc = self.opc.wrapping_add(instr.length as u32);
                log::trace!("{:#x}: {:?}", self.opc, instr);
                match get_exec_func(instr.op)(&instr, self) {
                    Ok(()) => {}
                    Err(Fault::Event(event)) => EventController::signal(self, event),
                    Err(Fault::Host(err)) => return Err(err),
                }
            }
            Decoded::Unknown { opcode, length } => {
                self.pc = self.opc.wrapping_add(length as u32);
                log::warn!("illegal opcode {:#04x} at {:#x}", opcode, self.opc);
                EventController::signal(
                    self,
                    Event::IllegalInstruction {
                        opcode: opcode as u32,
                    },
                );
            }
        }

        self.poll_external_interrupt();
        self.tick_timers();
        Ok(())
    }

    /// After every step: latch the highest-priority requester if nothing is
    /// held, then deliver to user-mode code. The kernel polls via ITEST.
    fn poll_external_interrupt(&mut self) {
        if self.pending_device.is_none() {
            self.pending_device = self.bus.interrupt_requested();
        }
        if self.mode == ProcessorMode::User && self.pending_device.is_some() {
            EventController::signal(self, Event::ExternalInterrupt);
        }
    }

    /// Once per ~1 ms of virtual time: count down the CCB timer words and
    /// advance the running process's clock.
    fn tick_timers(&mut self) {
        self.tick += 1;
        if self.tick < machine_config::TIMER_TICK_STEPS {
            return;
        }
        self.tick = 0;

        // charge the running process before any timer delivery switches
        // the machine back to kernel mode
        if self.mode == ProcessorMode::User && self.srs.has_pcb() {
            let addr = self.srs[sr_index::PCB].wrapping_add(pcb::PROCESS_CLOCK);
            let clk = self.memory.read_word(addr);
            self.memory.write_word(addr, clk.wrapping_add(1));
        }

        if self.srs.timers_enabled() {
            let base = self.srs[sr_index::CCB];
            let t1_addr = base.wrapping_add(ccb::TIMER1_COUNT);
            let t2_addr = base.wrapping_add(ccb::TIMER2_COUNT);
            let t1 = self.memory.read_word(t1_addr);
            let t2 = self.memory.read_word(t2_addr);
            self.memory.write_word(t1_addr, t1.wrapping_sub(1));
            self.memory.write_word(t2_addr, t2.wrapping_sub(1));

            // "just went negative" means the decrement crossed zero
            if t1 == 0 {
                EventController::signal(self, Event::Timer1Interrupt);
            } else if t2 == 0 {
                EventController::signal(self, Event::Timer2Interrupt);
            }
        }
    }

    /// Acknowledge the latched interrupt, returning its IOIR and releasing
    /// the latch.
    pub(crate) fn ack_pending_interrupt(&mut self) -> u32 {
        match self.pending_device.take() {
            Some(device) => self.bus.ack_interrupt(device),
            None => 0,
        }
    }

    /// Statuses may only carry the not-ready and timed-out bits; anything
    /// else is a broken bus implementation, not an architectural condition.
    pub(crate) fn check_bus_status(status: u32) -> Result<u32, Fault> {
        if status & !STATUS_MASK != 0 {
            Err(Fault::Host(CoreError::UnknownBusStatus { status }))
        } else {
            Ok(status)
        }
    }

    /// Front-panel switch 0.
    pub fn raise_switch0(&mut self) {
        EventController::signal(self, Event::Switch0Interrupt);
    }

    // ---- host inspection surface ----

    pub fn pc(&self) -> u32 {
        self.pc
    }

    pub fn set_pc(&mut self, pc: u32) {
        self.pc = pc;
    }

    pub fn mode(&self) -> ProcessorMode {
        self.mode
    }

    pub fn set_mode(&mut self, mode: ProcessorMode) {
        self.mode = mode;
    }

    pub fn reg(&self, idx: u8) -> u32 {
        self.regs.get(idx)
    }

    pub fn set_reg(&mut self, idx: u8, value: u32) {
        self.regs.set(idx, value);
    }

    pub fn sr(&self, idx: u8) -> u32 {
        self.srs.get(idx)
    }

    pub fn set_sr(&mut self, idx: u8, value: u32) {
        self.srs.set(idx, value);
    }

    pub fn memory(&self) -> &MemoryController {
        &self.memory
    }

    pub fn memory_mut(&mut self) -> &mut MemoryController {
        &mut self.memory
    }

    pub fn bus_mut(&mut self) -> &mut dyn IoBus {
        &mut *self.bus
    }

    pub fn scheduler_mut(&mut self) -> &mut Scheduler {
        &mut self.scheduler
    }

    pub fn clock(&self) -> &VirtualClockRef {
        &self.clock
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        device::{test_device, DeviceSet, STATUS_TIMEOUT},
        isa::ridge::cpu_tester::*,
    };

    const CCB_BASE: u32 = 0x8000;
    const HANDLER: u32 = 0x3000;

    /// CCB at CCB_BASE with every vector pointing at HANDLER.
    fn with_ccb(builder: TestCpuBuilder) -> TestCpuBuilder {
        let mut builder = builder.sr(11, CCB_BASE);
        for offset in (0u32..0x438).step_by(4) {
            builder = builder.word(CCB_BASE + offset, HANDLER);
        }
        builder
    }

    #[test]
    fn test_reset_state() {
        let cpu = TestCpuBuilder::new().build();
        assert_eq!(cpu.pc, machine_config::RESET_PC);
        assert_eq!(cpu.mode, ProcessorMode::Kernel);
        assert_eq!(cpu.srs[sr_index::CCB], 1);
        assert_eq!(cpu.srs[sr_index::PCB], 1);
        assert_eq!(cpu.srs[sr_index::PARAM2], 1024 * 1024);
    }

    #[test]
    fn test_alu_random() {
        let mut tester = ExecTester::new();
        for _ in 0..100 {
            tester.test_rand_alu2(0x03, |a, b| a.wrapping_add(b));
            tester.test_rand_alu2(0x04, |a, b| a.wrapping_sub(b));
            tester.test_rand_alu2(0x05, |a, b| (a as i32).wrapping_mul(b as i32) as u32);
            tester.test_rand_alu2(0x09, |a, b| a | b);
            tester.test_rand_alu2(0x0A, |a, b| a ^ b);
            tester.test_rand_alu2(0x0B, |a, b| a & b);

            tester.test_rand_alu_imm(0x13, |a, imm| a.wrapping_add(imm));
            tester.test_rand_alu_imm(0x14, |a, imm| a.wrapping_sub(imm));
            tester.test_rand_alu_imm(0x11, |_a, imm| imm);
            tester.test_rand_alu_imm(0x1B, |a, imm| a & imm);
        }
    }

    #[test]
    fn test_unary_ops() {
        // MOVE R1,R0
        run_test_step(
            &encode_reg(0x00, 1, 0),
            1,
            |b| b.reg(0, 77).reg(1, 5).pc(0x1000),
            |c| c.reg(1, 77).reg(0, 77).pc(0x1002),
        );
        // NEG R2,R3
        run_test_step(
            &encode_reg(0x01, 2, 3),
            1,
            |b| b.reg(3, 5).pc(0x1000),
            |c| c.reg(2, (-5i32) as u32),
        );
        // NOT R4,R5
        run_test_step(
            &encode_reg(0x08, 4, 5),
            1,
            |b| b.reg(5, 0x0F0F_0F0F).pc(0x1000),
            |c| c.reg(4, 0xF0F0_F0F0),
        );
        // SEB R6,R7 and SEH R6,R7
        run_test_step(
            &encode_reg(0x2E, 6, 7),
            1,
            |b| b.reg(7, 0x1234_5680).pc(0x1000),
            |c| c.reg(6, 0xFFFF_FF80),
        );
        run_test_step(
            &encode_reg(0x2F, 6, 7),
            1,
            |b| b.reg(7, 0x1234_8680).pc(0x1000),
            |c| c.reg(6, 0xFFFF_8680),
        );
        // NOTI R1,#0xF is !sign_extend(0xF) = !0xFFFFFFFF, unmasked
        run_test_step(
            &encode_reg(0x18, 1, 0xF),
            1,
            |b| b.reg(1, 0xDEAD).pc(0x1000),
            |c| c.reg(1, 0),
        );
    }

    #[test]
    fn test_div_rem() {
        run_test_step(
            &encode_reg(0x06, 1, 2),
            1,
            |b| b.reg(1, (-7i32) as u32).reg(2, 2).pc(0x1000),
            |c| c.reg(1, (-3i32) as u32),
        );
        run_test_step(
            &encode_reg(0x07, 1, 2),
            1,
            |b| b.reg(1, (-7i32) as u32).reg(2, 2).pc(0x1000),
            |c| c.reg(1, (-1i32) as u32),
        );
    }

    #[test]
    fn test_divide_by_zero_traps() {
        run_test_step(
            &encode_reg(0x06, 1, 2),
            1,
            |b| with_ccb(b).reg(1, 10).reg(2, 0).pc(0x1000),
            |c| c.pc(HANDLER).mode(ProcessorMode::Kernel).reg(1, 10),
        );
    }

    #[test]
    fn test_register_pair_bits() {
        // CBIT R6,R8 with bit 0 clears the MSB of R6
        run_test_step(
            &encode_reg(0x0C, 6, 8),
            1,
            |b| b.reg(6, 0xFFFF_FFFF).reg(7, 0xFFFF_FFFF).reg(8, 0).pc(0x1000),
            |c| c.reg(6, 0x7FFF_FFFF).reg(7, 0xFFFF_FFFF),
        );
        // bit 63 is the LSB of R7
        run_test_step(
            &encode_reg(0x0C, 6, 8),
            1,
            |b| b.reg(6, 0xFFFF_FFFF).reg(7, 0xFFFF_FFFF).reg(8, 63).pc(0x1000),
            |c| c.reg(6, 0xFFFF_FFFF).reg(7, 0xFFFF_FFFE),
        );
        // SBIT R2,R4 with bit 32 sets the MSB of R3
        run_test_step(
            &encode_reg(0x0D, 2, 4),
            1,
            |b| b.reg(4, 32).pc(0x1000),
            |c| c.reg(2, 0).reg(3, 0x8000_0000),
        );
        // TBIT leaves the pair alone and materialises the bit in Rx
        run_test_step(
            &encode_reg(0x0E, 2, 4),
            1,
            |b| b.reg(2, 0).reg(3, 0x8000_0000).reg(4, 32).pc(0x1000),
            |c| c.reg(2, 1).reg(3, 0x8000_0000),
        );
        // pair wraps: CBIT on R15 touches R0
        run_test_step(
            &encode_reg(0x0C, 15, 4),
            1,
            |b| b.reg(15, 0).reg(0, 0xFFFF_FFFF).reg(4, 63).pc(0x1000),
            |c| c.reg(0, 0xFFFF_FFFE),
        );
    }

    #[test]
    fn test_shifts() {
        run_test_step(
            &encode_reg(0x20, 1, 2),
            1,
            |b| b.reg(1, 3).reg(2, 4).pc(0x1000),
            |c| c.reg(1, 48),
        );
        run_test_step(
            &encode_reg(0x21, 1, 2),
            1,
            |b| b.reg(1, 0x8000_0000).reg(2, 31).pc(0x1000),
            |c| c.reg(1, 1),
        );
        // ASR keeps the sign
        run_test_step(
            &encode_reg(0x23, 1, 2),
            1,
            |b| b.reg(1, 0x8000_0000).reg(2, 31).pc(0x1000),
            |c| c.reg(1, 0xFFFF_FFFF),
        );
        // CSL re-enters the MSB at the bottom
        run_test_step(
            &encode_reg(0x26, 1, 2),
            1,
            |b| b.reg(1, 0x8000_0001).reg(2, 1).pc(0x1000),
            |c| c.reg(1, 3),
        );
        // double shifts work on the pair
        run_test_step(
            &encode_reg(0x24, 2, 4),
            1,
            |b| b.reg(2, 0).reg(3, 0x8000_0000).reg(4, 1).pc(0x1000),
            |c| c.reg(2, 1).reg(3, 0),
        );
        run_test_step(
            &encode_reg(0x25, 2, 4),
            1,
            |b| b.reg(2, 1).reg(3, 0).reg(4, 1).pc(0x1000),
            |c| c.reg(2, 0).reg(3, 0x8000_0000),
        );
        // immediate forms take the count from the Ry field
        run_test_step(
            &encode_reg(0x30, 1, 4),
            1,
            |b| b.reg(1, 3).pc(0x1000),
            |c| c.reg(1, 48),
        );
    }

    #[test]
    fn test_asl_sign_restore_and_trap() {
        // positive value shifted within range: plain doubling
        run_test_step(
            &encode_reg(0x22, 1, 2),
            1,
            |b| b.reg(1, 0x0000_0003).reg(2, 3).pc(0x1000),
            |c| c.reg(1, 0x18).pc(0x1002),
        );
        // sign flip traps after the partial shifts are committed
        run_test_step(
            &encode_reg(0x22, 1, 2),
            1,
            |b| with_ccb(b).reg(1, 0x4000_0000).reg(2, 1).pc(0x1000),
            |c| c.reg(1, 0).pc(HANDLER),
        );
        // negative value keeps its sign while low bits allow it
        run_test_step(
            &encode_reg(0x22, 1, 2),
            1,
            |b| b.reg(1, 0xFFFF_FFFF).reg(2, 1).pc(0x1000),
            |c| c.reg(1, 0xFFFF_FFFE).pc(0x1002),
        );
    }

    #[test]
    fn test_test_ops() {
        run_test_step(
            &encode_reg(0x40, 1, 2),
            1,
            |b| b.reg(1, 5).reg(2, (-3i32) as u32).pc(0x1000),
            |c| c.reg(1, 1),
        );
        run_test_step(
            &encode_reg(0x41, 1, 2),
            1,
            |b| b.reg(1, 5).reg(2, (-3i32) as u32).pc(0x1000),
            |c| c.reg(1, 0),
        );
        run_test_step(
            &encode_reg(0x52, 1, 7),
            1,
            |b| b.reg(1, 7).pc(0x1000),
            |c| c.reg(1, 1),
        );
    }

    #[test]
    fn test_branches() {
        // taken: signed -1 < 1
        run_test_step(
            &encode_short(0x81, 1, 2, 0x10),
            1,
            |b| b.reg(1, (-1i32) as u32).reg(2, 1).pc(0x1000),
            |c| c.pc(0x1010),
        );
        // not taken falls through the 4-byte instruction
        run_test_step(
            &encode_short(0x81, 1, 2, 0x10),
            1,
            |b| b.reg(1, 1).reg(2, (-1i32) as u32).pc(0x1000),
            |c| c.pc(0x1004),
        );
        // long form, equal registers
        run_test_step(
            &encode_long(0x92, 1, 2, 0x10),
            1,
            |b| b.reg(1, 5).reg(2, 5).pc(0x1000),
            |c| c.pc(0x1010),
        );
        // immediate comparison
        run_test_step(
            &encode_short(0xA0, 1, 3, 0x20),
            1,
            |b| b.reg(1, 4).pc(0x1000),
            |c| c.pc(0x1020),
        );
        // unconditional, backwards
        run_test_step(
            &encode_short(0x86, 0, 0, -0x100),
            1,
            |b| b.pc(0x1000),
            |c| c.pc(0xF00),
        );
    }

    #[test]
    fn test_loop() {
        // counting up from a negative value keeps branching
        run_test_step(
            &encode_short(0x87, 1, 1, 0x40),
            1,
            |b| b.reg(1, (-3i32) as u32).pc(0x1000),
            |c| c.reg(1, (-2i32) as u32).pc(0x1040),
        );
        // crossing zero falls through
        run_test_step(
            &encode_short(0x87, 1, 1, 0x40),
            1,
            |b| b.reg(1, (-1i32) as u32).pc(0x1000),
            |c| c.reg(1, 0).pc(0x1004),
        );
    }

    #[test]
    fn test_callr_ret_pairing() {
        run_test_step(
            &encode_reg(0x38, 5, 4),
            1,
            |b| b.reg(4, 0x2000).pc(0x1000),
            |c| c.reg(5, 0x1002).pc(0x3000),
        );
        // RET R5,R5: target read before the link write
        run_test_step(
            &encode_reg(0x39, 5, 5),
            1,
            |b| b.reg(5, 0x1002).pc(0x3000),
            |c| c.reg(5, 0x3002).pc(0x1002),
        );
    }

    #[test]
    fn test_call_with_displacement() {
        run_test_step(
            &encode_long(0x98, 7, 0, 0x800),
            1,
            |b| b.pc(0x1000),
            |c| c.reg(7, 0x1006).pc(0x1800),
        );
    }

    #[test]
    fn test_loads_and_stores_kernel() {
        // LOAD_DS R1,#0x2000
        run_test_step(
            &encode_short(0xCC, 1, 0, 0x2000),
            1,
            |b| b.word(0x2000, 0xCAFE_F00D).pc(0x1000),
            |c| c.reg(1, 0xCAFE_F00D),
        );
        // LOADB zero-extends
        run_test_step(
            &encode_short(0xC8, 1, 0, 0x2001),
            1,
            |b| b.word(0x2000, 0x11FF_3344).pc(0x1000),
            |c| c.reg(1, 0xFF),
        );
        // LOADH
        run_test_step(
            &encode_short(0xCA, 1, 0, 0x2002),
            1,
            |b| b.word(0x2000, 0x1122_8344).pc(0x1000),
            |c| c.reg(1, 0x8344),
        );
        // LOADD fills the pair
        run_test_step(
            &encode_short(0xCE, 2, 0, 0x2000),
            1,
            |b| b.word(0x2000, 0x1111_2222).word(0x2004, 0x3333_4444).pc(0x1000),
            |c| c.reg(2, 0x1111_2222).reg(3, 0x3333_4444),
        );
        // indexed form adds R[Ry]
        run_test_step(
            &encode_short(0xCD, 1, 4, 0x2000),
            1,
            |b| b.reg(4, 8).word(0x2008, 0x5555_6666).pc(0x1000),
            |c| c.reg(1, 0x5555_6666),
        );
        // PC-relative form is based at the instruction start
        run_test_step(
            &encode_short(0xC4, 1, 0, 0x100),
            1,
            |b| b.word(0x1100, 0x7777_8888).pc(0x1000),
            |c| c.reg(1, 0x7777_8888),
        );
        // STORE word then STOREB over its top byte
        run_test_step(
            &[
                &encode_short(0xEC, 1, 0, 0x2000)[..],
                &encode_short(0xE8, 2, 0, 0x2000)[..],
            ]
            .concat(),
            2,
            |b| b.reg(1, 0x1234_5678).reg(2, 0xAB).pc(0x1000),
            |c| c.word(0x2000, 0xAB34_5678),
        );
        // STORED writes the pair
        run_test_step(
            &encode_short(0xEE, 2, 0, 0x2000),
            1,
            |b| b.reg(2, 0xAAAA_BBBB).reg(3, 0xCCCC_DDDD).pc(0x1000),
            |c| c.word(0x2000, 0xAAAA_BBBB).word(0x2004, 0xCCCC_DDDD),
        );
    }

    #[test]
    fn test_laddr_computes_without_memory() {
        run_test_step(
            &encode_short(0xAE, 1, 0, 0x4242),
            1,
            |b| b.pc(0x1000),
            |c| c.reg(1, 0x4242),
        );
        run_test_step(
            &encode_short(0xAD, 1, 6, 0x10),
            1,
            |b| b.reg(6, 0x20).pc(0x1000),
            |c| c.reg(1, 0x1030),
        );
    }

    #[test]
    fn test_misaligned_access_raises_alignment() {
        // LOAD_DS of a word from an odd address: no register change, event
        run_test_step(
            &encode_short(0xCC, 1, 0, 0x2001),
            1,
            |b| with_ccb(b).reg(1, 7).pc(0x1000),
            |c| {
                c.reg(1, 7)
                    .pc(HANDLER)
                    .sr(0, 0x1000) // kernel entry: SR0 <- opc
            },
        );
        // misaligned store leaves memory alone
        run_test_step(
            &encode_short(0xEC, 1, 0, 0x2002),
            1,
            |b| with_ccb(b).reg(1, 0xFFFF_FFFF).pc(0x1000),
            |c| c.word(0x2000, 0).pc(HANDLER),
        );
        // halfword needs only 2-byte alignment
        run_test_step(
            &encode_short(0xCA, 1, 0, 0x2002),
            1,
            |b| b.word(0x2000, 0x1111_2222).pc(0x1000),
            |c| c.reg(1, 0x2222).pc(0x1004),
        );
    }

    #[test]
    fn test_extended_integer() {
        // EADD across the pair boundary
        run_test_step(
            &encode_reg(0x6A, 2, 4),
            1,
            |b| b.reg(2, 0).reg(3, 0xFFFF_FFFF).reg(4, 0).reg(5, 1).pc(0x1000),
            |c| c.reg(2, 1).reg(3, 0),
        );
        // EMPY widens to 64 bits
        run_test_step(
            &encode_reg(0x6C, 2, 4),
            1,
            |b| b.reg(2, 0x8000_0000).reg(4, 4).pc(0x1000),
            |c| c.reg(2, 2).reg(3, 0),
        );
        // EDIV: quotient to Rx+1, remainder to Rx
        run_test_step(
            &encode_reg(0x6D, 2, 4),
            1,
            |b| b.reg(2, 0).reg(3, 17).reg(4, 5).pc(0x1000),
            |c| c.reg(2, 2).reg(3, 3),
        );
        // LCOMP answers -1/0/1
        run_test_step(
            &encode_reg(0x6E, 1, 2),
            1,
            |b| b.reg(1, (-5i32) as u32).reg(2, 3).pc(0x1000),
            |c| c.reg(1, 0xFFFF_FFFF),
        );
        // DCOMP compares the pairs signed
        run_test_step(
            &encode_reg(0x6F, 2, 4),
            1,
            |b| b.reg(2, 0).reg(3, 9).reg(4, 0).reg(5, 2).pc(0x1000),
            |c| c.reg(2, 1),
        );
    }

    #[test]
    fn test_float_opcodes_are_illegal() {
        // RADD R1,R2 vectors through the illegal-instruction slot
        run_test_step(
            &encode_reg(0x63, 1, 2),
            1,
            |b| with_ccb(b).pc(0x1000),
            |c| c.pc(HANDLER).sr(1, 0x63).sr(3, 0x1002),
        );
    }

    #[test]
    fn test_illegal_opcode_hole() {
        run_test_step(
            &encode_reg(0x02, 0, 0),
            1,
            |b| with_ccb(b).pc(0x1000),
            |c| c.pc(HANDLER).sr(0, 0x1002).sr(1, 0x02).sr(3, 0x1002),
        );
    }

    #[test]
    fn test_sus_lus_round_trip() {
        const PCB_BASE: u32 = 0x6000;
        let mut cpu = TestCpuBuilder::new()
            .sr(14, PCB_BASE)
            .sr(15, 0xAAAA)
            .sr(8, 0x2)
            .sr(9, 0x3)
            .sr(10, 0x8000_0001)
            .reg(4, 0x44)
            .reg(5, 0x55)
            .reg(6, 0x66)
            .pc(0x1000)
            .build();
        cpu.memory.ram_mut().load_bytes(&encode_reg(0x58, 4, 6), 0x1000);
        cpu.step().unwrap();

        assert_eq!(cpu.memory.read_word(PCB_BASE + 0x40), 0xAAAA);
        assert_eq!(cpu.memory.read_word(PCB_BASE + 0x44), 0x2_0003);
        assert_eq!(cpu.memory.read_word(PCB_BASE + 0x4C), 0x8000_0001);
        assert_eq!(cpu.memory.read_word(PCB_BASE + 0x10), 0x44);
        assert_eq!(cpu.memory.read_word(PCB_BASE + 0x18), 0x66);

        // scramble, then LUS restores everything
        cpu.srs[sr_index::USER_PC] = 0;
        cpu.srs[sr_index::CODE_SEGMENT] = 0;
        cpu.srs[sr_index::DATA_SEGMENT] = 0;
        cpu.srs[sr_index::TRAPS] = 0;
        cpu.regs.set(4, 0);
        cpu.regs.set(5, 0);
        cpu.regs.set(6, 0);

        cpu.memory.ram_mut().load_bytes(&encode_reg(0x59, 4, 6), 0x1002);
        cpu.step().unwrap();

        assert_eq!(cpu.srs[sr_index::USER_PC], 0xAAAA);
        assert_eq!(cpu.srs[sr_index::CODE_SEGMENT], 0x2);
        assert_eq!(cpu.srs[sr_index::DATA_SEGMENT], 0x3);
        assert_eq!(cpu.srs[sr_index::TRAPS], 0x8000_0001);
        assert_eq!(cpu.regs.get(4), 0x44);
        assert_eq!(cpu.regs.get(5), 0x55);
        assert_eq!(cpu.regs.get(6), 0x66);
    }

    #[test]
    fn test_sus_reversed_range_stores_only_rx() {
        const PCB_BASE: u32 = 0x6000;
        run_test_step(
            &encode_reg(0x58, 6, 4),
            1,
            |b| b.sr(14, PCB_BASE).reg(5, 0x55).reg(6, 0x66).pc(0x1000),
            |c| c.word(PCB_BASE + 0x18, 0x66).word(PCB_BASE + 0x14, 0),
        );
    }

    #[test]
    fn test_sus_without_pcb_is_suppressed() {
        // SR14 == 1: nothing may be dereferenced, word 0x41 stays intact
        run_test_step(
            &encode_reg(0x58, 0, 15),
            1,
            |b| b.sr(15, 0xBEEF).word(0x40, 0x1234_5678).pc(0x1000),
            |c| c.word(0x40, 0x1234_5678).pc(0x1002),
        );
    }

    #[test]
    fn test_rum_enters_user_mode() {
        run_test_step(
            &encode_reg(0x5A, 0, 0),
            1,
            |b| b.sr(14, 0x6000).sr(15, 0x500).pc(0x1000),
            |c| c.pc(0x500).mode(ProcessorMode::User),
        );
    }

    #[test]
    fn test_rum_without_pcb_is_violation() {
        run_test_step(
            &encode_reg(0x5A, 0, 0),
            1,
            |b| with_ccb(b).sr(14, 1).sr(15, 0x500).pc(0x1000),
            |c| c.pc(HANDLER).mode(ProcessorMode::Kernel).sr(1, 0x5A).sr(0, 0x1000),
        );
    }

    #[test]
    fn test_privileged_op_in_user_mode() {
        // TRANS from user mode: KernelViolation, SR0 <- 1, SR15 <- opc
        const VRT: u32 = 0x10000;
        run_test_step(
            &encode_reg(0x5C, 1, 2),
            1,
            |b| {
                // map code page 1 for the user fetch
                with_ccb(b)
                    .user_mode()
                    .sr(12, VRT)
                    .sr(13, 0xFF)
                    .sr(8, 0)
                    .word(VRT + 8, 0)
                    .word(VRT + 12, 0x1000 | 1)
                    .pc(0x1000)
            },
            |c| {
                c.pc(HANDLER)
                    .mode(ProcessorMode::Kernel)
                    .sr(0, 1)
                    .sr(1, 0x5C)
                    .sr(15, 0x1000)
            },
        );
    }

    #[test]
    fn test_trans_and_dirt() {
        const VRT: u32 = 0x10000;
        let map = |b: TestCpuBuilder| {
            // segment 5, page 0x3 -> physical page 0x9
            let probe = VRT + (((0x3u32 + 5) & 0xFF) << 3);
            b.sr(12, VRT)
                .sr(13, 0xFF)
                .word(probe, 5 << 16)
                .word(probe + 4, 0x1000 | 0x9)
        };

        // TRANS answers the real address
        run_test_step(
            &encode_reg(0x5C, 1, 2),
            1,
            |b| map(b).reg(2, 5).reg(3, 0x3ABC).pc(0x1000),
            |c| c.reg(1, 0x9ABC),
        );

        // a miss answers all-ones, no event
        run_test_step(
            &encode_reg(0x5C, 1, 2),
            1,
            |b| map(b).reg(2, 7).reg(3, 0x3ABC).pc(0x1000),
            |c| c.reg(1, 0xFFFF_FFFF).pc(0x1002),
        );

        // DIRT also sets the modified bit
        let probe = VRT + (((0x3u32 + 5) & 0xFF) << 3);
        run_test_step(
            &encode_reg(0x5D, 1, 2),
            1,
            |b| map(b).reg(2, 5).reg(3, 0x3ABC).pc(0x1000),
            |c| c.reg(1, 0x9ABC).word(probe + 4, 0x1000 | 0x9 | 0x8800),
        );
    }

    #[test]
    fn test_move_sr_and_back() {
        run_test_step(
            &[&encode_reg(0x5E, 7, 1)[..], &encode_reg(0x5F, 2, 7)[..]].concat(),
            2,
            |b| b.reg(1, 0x1234).pc(0x1000),
            |c| c.sr(7, 0x1234).reg(2, 0x1234),
        );
    }

    fn bus_with_latch() -> Box<DeviceSet> {
        let mut set = DeviceSet::new();
        set.attach(Box::new(test_device::LatchDevice::new(3))).unwrap();
        Box::new(set)
    }

    #[test]
    fn test_io_read_write() {
        // WRITE R1,R2: store R1 to device 3 sub-address 0, status to R1
        let mut cpu = TestCpuBuilder::with_bus(bus_with_latch())
            .reg(1, 0xFEED_BACC)
            .reg(2, 0x0300_0000)
            .pc(0x1000)
            .build();
        cpu.memory.ram_mut().load_bytes(&encode_reg(0x7F, 1, 2), 0x1000);
        cpu.step().unwrap();
        assert_eq!(cpu.regs.get(1), 0);

        // READ R4,R2: data lands in R5 before the status lands in R4
        cpu.memory.ram_mut().load_bytes(&encode_reg(0x7E, 4, 2), 0x1002);
        cpu.step().unwrap();
        assert_eq!(cpu.regs.get(4), 0);
        assert_eq!(cpu.regs.get(5), 0xFEED_BACC);
    }

    #[test]
    fn test_io_to_missing_device_times_out() {
        run_test_step(
            &encode_reg(0x7E, 4, 2),
            1,
            |b| b.reg(2, 0x0900_0000).pc(0x1000),
            |c| c.reg(4, STATUS_TIMEOUT).reg(5, 0),
        );
    }

    #[test]
    fn test_unknown_bus_status_is_host_error() {
        let mut cpu = TestCpuBuilder::with_bus(bus_with_latch())
            .reg(2, 0x0300_0000 | test_device::SUBADDR_FORCE_STATUS)
            .reg(1, 0x0000_0001) // a status bit outside the defined set
            .pc(0x1000)
            .build();
        // first WRITE programs the forced status (returns OK), the second
        // sees it come back and refuses
        let code = [&encode_reg(0x7F, 1, 2)[..], &encode_reg(0x7F, 1, 2)[..]].concat();
        cpu.memory.ram_mut().load_bytes(&code, 0x1000);
        cpu.step().unwrap();
        assert_eq!(
            cpu.step(),
            Err(crate::CoreError::UnknownBusStatus { status: 1 })
        );
    }

    #[test]
    fn test_maint_machineid_and_elogr() {
        run_test_step(
            &encode_reg(0x7D, 1, 10),
            1,
            |b| b.pc(0x1000),
            |c| c.reg(1, machine_config::MACHINE_ID),
        );
        // no interrupt pending: ELOGR answers 0
        run_test_step(
            &encode_reg(0x7D, 1, 0),
            1,
            |b| b.reg(1, 0xFF).pc(0x1000),
            |c| c.reg(1, 0),
        );
        // TRAPEXIT returns through SR0
        run_test_step(
            &encode_reg(0x7D, 0, 7),
            1,
            |b| b.sr(0, 0x4444).pc(0x1000),
            |c| c.pc(0x4444),
        );
        // unknown sub-op is illegal
        run_test_step(
            &encode_reg(0x7D, 1, 3),
            1,
            |b| with_ccb(b).pc(0x1000),
            |c| c.pc(HANDLER).sr(1, 0x7D),
        );
    }

    #[test]
    fn test_itest_consumes_latched_interrupt() {
        let mut cpu = TestCpuBuilder::with_bus(bus_with_latch()).pc(0x1000).build();
        // raise the device interrupt by writing its IRQ sub-address
        cpu.bus
            .write(3, test_device::SUBADDR_RAISE_IRQ, 0x0300_0007);

        // kernel mode: the poll latches but does not vector
        cpu.memory.ram_mut().load_bytes(&encode_reg(0x00, 0, 0), 0x1000);
        cpu.step().unwrap();
        assert_eq!(cpu.pending_device, Some(3));
        assert_eq!(cpu.mode, ProcessorMode::Kernel);

        // ITEST: IOIR to R2, 0 to R1, latch released
        cpu.memory.ram_mut().load_bytes(&encode_reg(0x7D, 1, 8), 0x1002);
        cpu.step().unwrap();
        assert_eq!(cpu.regs.get(1), 0);
        assert_eq!(cpu.regs.get(2), 0x0300_0007);
        assert_eq!(cpu.pending_device, None);

        // drained: ITEST answers 1
        cpu.memory.ram_mut().load_bytes(&encode_reg(0x7D, 1, 8), 0x1004);
        cpu.step().unwrap();
        assert_eq!(cpu.regs.get(1), 1);
    }

    #[test]
    fn test_kcall_from_user_vectors() {
        const VRT: u32 = 0x10000;
        run_test_step(
            // KCALL R1,R2 -> event number 0x12, vector at CCB + 0x48
            &encode_reg(0x3A, 1, 2),
            1,
            |b| {
                with_ccb(b)
                    .user_mode()
                    .sr(12, VRT)
                    .sr(13, 0xFF)
                    .word(VRT + 8, 0)
                    .word(VRT + 12, 0x1000 | 1)
                    .word(CCB_BASE + 0x48, 0x5678)
                    .pc(0x1000)
            },
            |c| c.pc(0x5678).mode(ProcessorMode::Kernel).sr(15, 0x1002),
        );
    }

    #[test]
    fn test_kcall_from_kernel_is_violation() {
        run_test_step(
            &encode_reg(0x3A, 1, 2),
            1,
            |b| with_ccb(b).pc(0x1000),
            |c| c.pc(HANDLER).sr(1, 0x3A).sr(0, 0x1000),
        );
    }

    #[test]
    fn test_trap_instruction() {
        run_test_step(
            &encode_reg(0x3B, 0, 9),
            1,
            |b| with_ccb(b).word(CCB_BASE + 0x40C, 0x2222).pc(0x1000),
            |c| c.pc(0x2222).sr(3, 9).sr(0, 0x1000),
        );
    }

    #[test]
    fn test_external_interrupt_delivery_to_user() {
        const VRT: u32 = 0x10000;
        let mut cpu = TestCpuBuilder::with_bus(bus_with_latch())
            .user_mode()
            .sr(11, CCB_BASE)
            .sr(12, VRT)
            .sr(13, 0xFF)
            .word(VRT + 8, 0)
            .word(VRT + 12, 0x1000 | 1)
            .word(CCB_BASE + 0x420, 0x7000)
            .pc(0x1000)
            .build();
        cpu.bus
            .write(3, test_device::SUBADDR_RAISE_IRQ, 0x0300_0042);
        // user-mode MOVE at 0x1000 (identity-mapped)
        cpu.memory.ram_mut().load_bytes(&encode_reg(0x00, 1, 1), 0x1000);

        cpu.step().unwrap();
        assert_eq!(cpu.mode, ProcessorMode::Kernel);
        assert_eq!(cpu.pc, 0x7000);
        assert_eq!(cpu.srs[sr_index::SAVED_PC], 0x0300_0042);
        assert_eq!(cpu.srs[sr_index::USER_PC], 0x1002);
        assert_eq!(cpu.pending_device, None);
    }

    #[test]
    fn test_fetch_page_fault_reports_start() {
        // user mode, nothing mapped: the fetch faults and PC does not
        // advance past the instruction
        run_test_step(
            &[],
            1,
            |b| {
                with_ccb(b)
                    .user_mode()
                    .sr(12, 0x10000)
                    .sr(13, 0xFFFF_FFFF)
                    .sr(8, 0x9)
                    .word(CCB_BASE + 0x410, 0x4000)
                    .pc(0x5000)
            },
            |c| {
                c.pc(0x4000)
                    .mode(ProcessorMode::Kernel)
                    .sr(0, 1)
                    .sr(1, 0xFFFF_FFFF)
                    .sr(2, 0x9)
                    .sr(3, 0x5000)
                    .sr(15, 0x5000)
            },
        );
    }

    #[test]
    fn test_vrt_cycle_is_a_host_error() {
        const VRT: u32 = 0x10000;
        let probe = VRT + ((0x5u32 & 0xFF) << 3);
        let self_link = probe - VRT;
        let mut cpu = TestCpuBuilder::new()
            .user_mode()
            .sr(12, VRT)
            .sr(13, 0xFF)
            .sr(8, 5)
            .word(probe, 1 << 16 | 0xDEAD)
            .word(probe + 4, self_link << 16)
            .pc(0)
            .build();
        assert_eq!(
            cpu.step(),
            Err(crate::CoreError::VrtWalkOverrun {
                segment: 5,
                vaddr: 0
            })
        );
    }

    #[test]
    fn test_timer_countdown_and_user_delivery() {
        const VRT: u32 = 0x10000;
        const PCB_BASE: u32 = 0x9000;
        let mut cpu = TestCpuBuilder::with_bus(Box::new(crate::device::NullBus))
            .user_mode()
            .sr(11, CCB_BASE)
            .sr(12, VRT)
            .sr(13, 0xFF)
            .sr(14, PCB_BASE)
            .word(VRT + 8, 0)
            .word(VRT + 12, 0x1000 | 1)
            .word(CCB_BASE + 0x440, 0) // timer 1 crosses zero on the first tick
            .word(CCB_BASE + 0x444, 500)
            .word(CCB_BASE + 0x430, 0x3000)
            .pc(0x1000)
            .build();
        // user code: branch-to-self
        let loop_code = encode_short(0x86, 0, 0, 0);
        cpu.memory.ram_mut().load_bytes(&loop_code, 0x1000);

        for _ in 0..machine_config::TIMER_TICK_STEPS {
            cpu.step().unwrap();
        }

        assert_eq!(cpu.mode, ProcessorMode::Kernel);
        assert_eq!(cpu.pc, 0x3000);
        assert_eq!(cpu.srs[sr_index::SAVED_PC], 1);
        assert_eq!(cpu.srs[sr_index::USER_PC], 0x1000);
        assert_eq!(cpu.memory.read_word(CCB_BASE + 0x440), 0xFFFF_FFFF);
        assert_eq!(cpu.memory.read_word(CCB_BASE + 0x444), 499);
        // the process clock advanced once
        assert_eq!(cpu.memory.read_word(PCB_BASE + 0x50), 1);
    }

    #[test]
    fn test_timer_suppressed_in_kernel_mode() {
        let mut cpu = TestCpuBuilder::new()
            .sr(11, CCB_BASE)
            .word(CCB_BASE + 0x440, 0)
            .word(CCB_BASE + 0x444, 500)
            .word(CCB_BASE + 0x430, 0x3000)
            .pc(0x1000)
            .build();
        let loop_code = encode_short(0x86, 0, 0, 0);
        cpu.memory.ram_mut().load_bytes(&loop_code, 0x1000);

        for _ in 0..machine_config::TIMER_TICK_STEPS {
            cpu.step().unwrap();
        }

        // the words still count down, the event is not delivered
        assert_eq!(cpu.pc, 0x1000);
        assert_eq!(cpu.mode, ProcessorMode::Kernel);
        assert_eq!(cpu.memory.read_word(CCB_BASE + 0x440), 0xFFFF_FFFF);
    }

    #[test]
    fn test_timers_disabled_by_sentinel_ccb() {
        // SR11 == 1 from reset: no CCB words may be touched
        let mut cpu = TestCpuBuilder::new().pc(0x1000).build();
        let loop_code = encode_short(0x86, 0, 0, 0);
        cpu.memory.ram_mut().load_bytes(&loop_code, 0x1000);
        let probe = cpu.memory.read_word(1 + 0x440);

        for _ in 0..machine_config::TIMER_TICK_STEPS {
            cpu.step().unwrap();
        }
        assert_eq!(cpu.memory.read_word(1 + 0x440), probe);
    }
}
