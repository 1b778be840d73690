#![cfg(test)]
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha12Rng;

use crate::{
    device::{IoBus, NullBus},
    isa::ridge::{executor::RidgeCPU, mmu::MemoryController, ProcessorMode},
    ram::PhysicalMemory,
};

pub(super) struct TestCpuBuilder {
    cpu: RidgeCPU,
}

impl TestCpuBuilder {
    pub(super) fn new() -> Self {
        Self::with_bus(Box::new(NullBus))
    }

    pub(super) fn with_bus(bus: Box<dyn IoBus>) -> Self {
        let memory = MemoryController::new(PhysicalMemory::new(1024));
        Self {
            cpu: RidgeCPU::from_memory(memory, bus),
        }
    }

    pub(super) fn reg(mut self, idx: u8, value: u32) -> Self {
        self.cpu.regs.set(idx, value);
        self
    }

    pub(super) fn sr(mut self, idx: u8, value: u32) -> Self {
        self.cpu.srs.set(idx, value);
        self
    }

    pub(super) fn pc(mut self, value: u32) -> Self {
        self.cpu.pc = value;
        self
    }

    pub(super) fn user_mode(mut self) -> Self {
        self.cpu.mode = ProcessorMode::User;
        self
    }

    pub(super) fn bytes(mut self, addr: u32, data: &[u8]) -> Self {
        self.cpu.memory.ram_mut().load_bytes(data, addr);
        self
    }

    pub(super) fn word(mut self, addr: u32, value: u32) -> Self {
        self.cpu.memory.write_word(addr, value);
        self
    }

    pub(super) fn build(self) -> RidgeCPU {
        self.cpu
    }
}

pub(super) struct CpuChecker<'a> {
    pub(super) cpu: &'a mut RidgeCPU,
}

impl<'a> CpuChecker<'a> {
    pub(super) fn new(cpu: &'a mut RidgeCPU) -> Self {
        Self { cpu }
    }

    pub(super) fn reg(self, idx: u8, value: u32) -> Self {
        assert_eq!(
            self.cpu.regs.get(idx),
            value,
            "register R{} incorrect",
            idx
        );
        self
    }

    pub(super) fn sr(self, idx: u8, value: u32) -> Self {
        assert_eq!(self.cpu.srs.get(idx), value, "SR{} incorrect", idx);
        self
    }

    pub(super) fn pc(self, value: u32) -> Self {
        assert_eq!(self.cpu.pc, value, "PC incorrect");
        self
    }

    pub(super) fn mode(self, mode: ProcessorMode) -> Self {
        assert_eq!(self.cpu.mode, mode, "mode incorrect");
        self
    }

    pub(super) fn word(self, addr: u32, value: u32) -> Self {
        assert_eq!(
            self.cpu.memory.read_word(addr),
            value,
            "memory word at {:#x} incorrect",
            addr
        );
        self
    }

    pub(super) fn customized<F>(self, f: F) -> Self
    where
        F: FnOnce(Self) -> Self,
    {
        f(self)
    }
}

/// Place `code` at the CPU's current PC, run `steps` steps, check.
pub(super) fn run_test_step<F, G>(code: &[u8], steps: usize, build: F, check: G)
where
    F: FnOnce(TestCpuBuilder) -> TestCpuBuilder,
    G: FnOnce(CpuChecker) -> CpuChecker,
{
    let mut cpu = build(TestCpuBuilder::new()).build();
    let pc = cpu.pc;
    cpu.memory.ram_mut().load_bytes(code, pc);
    for _ in 0..steps {
        cpu.step().unwrap();
    }
    check(CpuChecker::new(&mut cpu));
}

pub(super) fn encode_reg(opcode: u8, rx: u8, ry: u8) -> [u8; 2] {
    [opcode, rx << 4 | ry]
}

pub(super) fn encode_short(opcode: u8, rx: u8, ry: u8, disp: i16) -> [u8; 4] {
    let d = disp as u16;
    [opcode, rx << 4 | ry, (d >> 8) as u8, d as u8]
}

pub(super) fn encode_long(opcode: u8, rx: u8, ry: u8, disp: i32) -> [u8; 6] {
    let d = disp as u32;
    [
        opcode,
        rx << 4 | ry,
        (d >> 24) as u8,
        (d >> 16) as u8,
        (d >> 8) as u8,
        d as u8,
    ]
}

/// Seeded random driver for the two-operand ALU group.
pub(super) struct ExecTester {
    rng: ChaCha12Rng,
}

impl ExecTester {
    pub(super) fn new() -> Self {
        Self {
            rng: ChaCha12Rng::seed_from_u64(0x51D6E),
        }
    }

    pub(super) fn rand_word(&mut self) -> u32 {
        self.rng.random()
    }

    fn rand_unique_reg_idx2(&mut self) -> (u8, u8) {
        let idx1 = self.rng.random_range(0..16) as u8;
        let mut idx2 = idx1;
        while idx2 == idx1 {
            idx2 = self.rng.random_range(0..16) as u8;
        }
        (idx1, idx2)
    }

    /// Run `opcode` over random operands and compare Rx against `calc`.
    pub(super) fn test_rand_alu2<F>(&mut self, opcode: u8, calc: F)
    where
        F: Fn(u32, u32) -> u32,
    {
        let (rx, ry) = self.rand_unique_reg_idx2();
        let (a, b) = (self.rand_word(), self.rand_word());
        let expected = calc(a, b);
        run_test_step(
            &encode_reg(opcode, rx, ry),
            1,
            |builder| builder.reg(rx, a).reg(ry, b).pc(0x1000),
            |checker| checker.reg(rx, expected).pc(0x1002),
        );
    }

    /// Same for the 4-bit immediate group.
    pub(super) fn test_rand_alu_imm<F>(&mut self, opcode: u8, calc: F)
    where
        F: Fn(u32, u32) -> u32,
    {
        let rx = self.rng.random_range(0..16) as u8;
        let imm = self.rng.random_range(0..16) as u8;
        let a = self.rand_word();
        let expected = calc(a, imm as u32);
        run_test_step(
            &encode_reg(opcode, rx, imm),
            1,
            |builder| builder.reg(rx, a).pc(0x1000),
            |checker| checker.reg(rx, expected).pc(0x1002),
        );
    }
}
