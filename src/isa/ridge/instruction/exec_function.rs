use std::cmp::Ordering;

use crate::{
    cpu::sr_index,
    isa::ridge::{
        event::Event, executor::RidgeCPU, instruction::Instruction, mmu::SegmentKind,
        Fault, ProcessorMode,
    },
    utils::{is_aligned, ridge_bit64, sign_extend},
};

pub(in crate::isa::ridge) type ExecResult = Result<(), Fault>;

// ==========================================
//              integer ALU
// ==========================================
// Overflow traps for ADD/SUB/MPY are unimplemented pending the hardware
// manual; results wrap silently.

macro_rules! alu2 {
    ($name:ident, |$a:ident, $b:ident| $rst:expr) => {
        pub(super) fn $name(instr: &Instruction, cpu: &mut RidgeCPU) -> ExecResult {
            let $a = cpu.regs.get(instr.rx);
            let $b = cpu.regs.get(instr.ry);
            cpu.regs.set(instr.rx, $rst);
            Ok(())
        }
    };
}

macro_rules! alu1 {
    ($name:ident, |$b:ident| $rst:expr) => {
        pub(super) fn $name(instr: &Instruction, cpu: &mut RidgeCPU) -> ExecResult {
            let $b = cpu.regs.get(instr.ry);
            cpu.regs.set(instr.rx, $rst);
            Ok(())
        }
    };
}

// Rx receives the 4-bit Ry field itself
macro_rules! alu_imm {
    ($name:ident, |$a:ident, $imm:ident| $rst:expr) => {
        pub(super) fn $name(instr: &Instruction, cpu: &mut RidgeCPU) -> ExecResult {
            let $a = cpu.regs.get(instr.rx);
            let $imm = instr.ry as u32;
            cpu.regs.set(instr.rx, $rst);
            Ok(())
        }
    };
}

alu1!(exec_move, |b| b);
alu1!(exec_neg, |b| (b as i32).wrapping_neg() as u32);
alu1!(exec_not, |b| !b);
alu1!(exec_seb, |b| sign_extend(b, 8));
alu1!(exec_seh, |b| sign_extend(b, 16));

alu2!(exec_add, |a, b| a.wrapping_add(b));
alu2!(exec_sub, |a, b| a.wrapping_sub(b));
alu2!(exec_mpy, |a, b| (a as i32).wrapping_mul(b as i32) as u32);
alu2!(exec_or, |a, b| a | b);
alu2!(exec_xor, |a, b| a ^ b);
alu2!(exec_and, |a, b| a & b);

alu_imm!(exec_movei, |_a, imm| imm);
alu_imm!(exec_addi, |a, imm| a.wrapping_add(imm));
alu_imm!(exec_subi, |a, imm| a.wrapping_sub(imm));
alu_imm!(exec_mpyi, |a, imm| (a as i32).wrapping_mul(imm as i32) as u32);
alu_imm!(exec_andi, |a, imm| a & imm);
// the full complement of the sign-extended immediate, not masked to 4 bits
alu_imm!(exec_noti, |_a, imm| !sign_extend(imm, 4));

pub(super) fn exec_div(instr: &Instruction, cpu: &mut RidgeCPU) -> ExecResult {
    let a = cpu.regs.get(instr.rx) as i32;
    let b = cpu.regs.get(instr.ry) as i32;
    if b == 0 {
        return Err(Event::ArithmeticTrap.into());
    }
    cpu.regs.set(instr.rx, a.wrapping_div(b) as u32);
    Ok(())
}

pub(super) fn exec_rem(instr: &Instruction, cpu: &mut RidgeCPU) -> ExecResult {
    let a = cpu.regs.get(instr.rx) as i32;
    let b = cpu.regs.get(instr.ry) as i32;
    if b == 0 {
        return Err(Event::ArithmeticTrap.into());
    }
    cpu.regs.set(instr.rx, a.wrapping_rem(b) as u32);
    Ok(())
}

pub(super) fn exec_chk(instr: &Instruction, cpu: &mut RidgeCPU) -> ExecResult {
    if (cpu.regs.get(instr.rx) as i32) > (cpu.regs.get(instr.ry) as i32) {
        return Err(Event::Check.into());
    }
    Ok(())
}

pub(super) fn exec_chki(instr: &Instruction, cpu: &mut RidgeCPU) -> ExecResult {
    if (cpu.regs.get(instr.rx) as i32) > instr.ry as i32 {
        return Err(Event::Check.into());
    }
    Ok(())
}

// ==========================================
//        bit operations on register pairs
// ==========================================
// Bit index 0 is the MSB of R[Rx], 63 the LSB of R[(Rx+1) mod 16].

pub(super) fn exec_cbit(instr: &Instruction, cpu: &mut RidgeCPU) -> ExecResult {
    let bit = cpu.regs.get(instr.ry) & 0x3F;
    let pair = cpu.regs.pair(instr.rx);
    cpu.regs.set_pair(instr.rx, pair & !ridge_bit64(bit));
    Ok(())
}

pub(super) fn exec_sbit(instr: &Instruction, cpu: &mut RidgeCPU) -> ExecResult {
    let bit = cpu.regs.get(instr.ry) & 0x3F;
    let pair = cpu.regs.pair(instr.rx);
    cpu.regs.set_pair(instr.rx, pair | ridge_bit64(bit));
    Ok(())
}

pub(super) fn exec_tbit(instr: &Instruction, cpu: &mut RidgeCPU) -> ExecResult {
    let bit = cpu.regs.get(instr.ry) & 0x3F;
    let pair = cpu.regs.pair(instr.rx);
    cpu.regs
        .set(instr.rx, (pair & ridge_bit64(bit) != 0) as u32);
    Ok(())
}

// ==========================================
//                  shifts
// ==========================================

macro_rules! shift {
    ($reg_name:ident, $imm_name:ident, |$v:ident, $c:ident| $rst:expr) => {
        pub(super) fn $reg_name(instr: &Instruction, cpu: &mut RidgeCPU) -> ExecResult {
            let $v = cpu.regs.get(instr.rx);
            let $c = cpu.regs.get(instr.ry) & 0x1F;
            cpu.regs.set(instr.rx, $rst);
            Ok(())
        }

        pub(super) fn $imm_name(instr: &Instruction, cpu: &mut RidgeCPU) -> ExecResult {
            let $v = cpu.regs.get(instr.rx);
            let $c = instr.ry as u32;
            cpu.regs.set(instr.rx, $rst);
            Ok(())
        }
    };
}

shift!(exec_lsl, exec_lsli, |v, c| v.wrapping_shl(c));
shift!(exec_lsr, exec_lsri, |v, c| v.wrapping_shr(c));
shift!(exec_asr, exec_asri, |v, c| ((v as i32).wrapping_shr(c)) as u32);
shift!(exec_csl, exec_csli, |v, c| v.rotate_left(c));

macro_rules! dshift {
    ($reg_name:ident, $imm_name:ident, |$v:ident, $c:ident| $rst:expr) => {
        pub(super) fn $reg_name(instr: &Instruction, cpu: &mut RidgeCPU) -> ExecResult {
            let $v = cpu.regs.pair(instr.rx);
            let $c = cpu.regs.get(instr.ry) & 0x3F;
            cpu.regs.set_pair(instr.rx, $rst);
            Ok(())
        }

        pub(super) fn $imm_name(instr: &Instruction, cpu: &mut RidgeCPU) -> ExecResult {
            let $v = cpu.regs.pair(instr.rx);
            let $c = instr.ry as u32;
            cpu.regs.set_pair(instr.rx, $rst);
            Ok(())
        }
    };
}

dshift!(exec_dlsl, exec_dlsli, |v, c| v.wrapping_shl(c));
dshift!(exec_dlsr, exec_dlsri, |v, c| v.wrapping_shr(c));

/// Arithmetic shift left, 1983 edition: shift one position at a time,
/// restoring the original sign after every position. The trap fires at the
/// first position whose shifted-in top bit disagrees with the sign, with
/// the partial result already committed.
fn asl_steps(cpu: &mut RidgeCPU, rx: u8, count: u32) -> ExecResult {
    let sign = cpu.regs.get(rx) & 0x8000_0000;
    let mut v = cpu.regs.get(rx);
    for _ in 0..count {
        v <<= 1;
        let top = v & 0x8000_0000;
        v = v & 0x7FFF_FFFF | sign;
        cpu.regs.set(rx, v);
        if top != sign {
            return Err(Event::ArithmeticTrap.into());
        }
    }
    Ok(())
}

pub(super) fn exec_asl(instr: &Instruction, cpu: &mut RidgeCPU) -> ExecResult {
    let count = cpu.regs.get(instr.ry) & 0x1F;
    asl_steps(cpu, instr.rx, count)
}

pub(super) fn exec_asli(instr: &Instruction, cpu: &mut RidgeCPU) -> ExecResult {
    asl_steps(cpu, instr.rx, instr.ry as u32)
}

// ==========================================
//            tests and branches
// ==========================================
// All comparisons are signed. Branch targets come pre-masked from the
// decoder.

macro_rules! test_op {
    ($reg_name:ident, $imm_name:ident, $op:tt) => {
        pub(super) fn $reg_name(instr: &Instruction, cpu: &mut RidgeCPU) -> ExecResult {
            let a = cpu.regs.get(instr.rx) as i32;
            let b = cpu.regs.get(instr.ry) as i32;
            cpu.regs.set(instr.rx, (a $op b) as u32);
            Ok(())
        }

        pub(super) fn $imm_name(instr: &Instruction, cpu: &mut RidgeCPU) -> ExecResult {
            let a = cpu.regs.get(instr.rx) as i32;
            let b = instr.ry as i32;
            cpu.regs.set(instr.rx, (a $op b) as u32);
            Ok(())
        }
    };
}

test_op!(exec_test_gt, exec_testi_gt, >);
test_op!(exec_test_lt, exec_testi_lt, <);
test_op!(exec_test_eq, exec_testi_eq, ==);
test_op!(exec_test_lteq, exec_testi_lteq, <=);
test_op!(exec_test_gteq, exec_testi_gteq, >=);
test_op!(exec_test_neq, exec_testi_neq, !=);

macro_rules! branch_op {
    ($reg_name:ident, $imm_name:ident, $op:tt) => {
        pub(super) fn $reg_name(instr: &Instruction, cpu: &mut RidgeCPU) -> ExecResult {
            let a = cpu.regs.get(instr.rx) as i32;
            let b = cpu.regs.get(instr.ry) as i32;
            if a $op b {
                cpu.pc = instr.branch_address;
            }
            Ok(())
        }

        pub(super) fn $imm_name(instr: &Instruction, cpu: &mut RidgeCPU) -> ExecResult {
            let a = cpu.regs.get(instr.rx) as i32;
            let b = instr.ry as i32;
            if a $op b {
                cpu.pc = instr.branch_address;
            }
            Ok(())
        }
    };
}

branch_op!(exec_br_gt, exec_bri_gt, >);
branch_op!(exec_br_lt, exec_bri_lt, <);
branch_op!(exec_br_eq, exec_bri_eq, ==);
branch_op!(exec_br_lteq, exec_bri_lteq, <=);
branch_op!(exec_br_gteq, exec_bri_gteq, >=);
branch_op!(exec_br_neq, exec_bri_neq, !=);

pub(super) fn exec_br(instr: &Instruction, cpu: &mut RidgeCPU) -> ExecResult {
    cpu.pc = instr.branch_address;
    Ok(())
}

/// Counted loop: add the signed 4-bit Ry to R[Rx], branch while the result
/// is still negative. Compilers count up from a negative value.
pub(super) fn exec_loop(instr: &Instruction, cpu: &mut RidgeCPU) -> ExecResult {
    let v = cpu
        .regs
        .get(instr.rx)
        .wrapping_add(sign_extend(instr.ry as u32, 4));
    cpu.regs.set(instr.rx, v);
    if (v as i32) < 0 {
        cpu.pc = instr.branch_address;
    }
    Ok(())
}

pub(super) fn exec_call(instr: &Instruction, cpu: &mut RidgeCPU) -> ExecResult {
    cpu.regs.set(instr.rx, cpu.pc);
    cpu.pc = instr.branch_address;
    Ok(())
}

pub(super) fn exec_callr(instr: &Instruction, cpu: &mut RidgeCPU) -> ExecResult {
    // target first: Rx and Ry may alias
    let target = cpu.opc.wrapping_add(cpu.regs.get(instr.ry));
    cpu.regs.set(instr.rx, cpu.pc);
    cpu.pc = target;
    Ok(())
}

pub(super) fn exec_ret(instr: &Instruction, cpu: &mut RidgeCPU) -> ExecResult {
    let target = cpu.regs.get(instr.ry);
    let old_pc = cpu.pc;
    cpu.pc = target;
    cpu.regs.set(instr.rx, old_pc);
    Ok(())
}

pub(super) fn exec_kcall(instr: &Instruction, cpu: &mut RidgeCPU) -> ExecResult {
    if cpu.mode != ProcessorMode::User {
        return Err(Event::KernelViolation {
            d0: instr.op as u32,
            d1: 0,
            d2: 0,
        }
        .into());
    }
    Err(Event::KernelCall {
        number: instr.rx << 4 | instr.ry,
    }
    .into())
}

pub(super) fn exec_trap(instr: &Instruction, cpu: &mut RidgeCPU) -> ExecResult {
    cpu.srs[sr_index::PARAM3] = instr.ry as u32;
    Err(Event::TrapInstruction.into())
}

// ==========================================
//             loads and stores
// ==========================================

/// `PCREL` selects the `c` (PC-relative) address forms; the base is the PC
/// at the start of the instruction. `INDEXED` adds R[Ry].
fn effective_address<const PCREL: bool, const INDEXED: bool>(
    instr: &Instruction,
    cpu: &RidgeCPU,
) -> u32 {
    let base = if PCREL { cpu.opc } else { 0 };
    let mut ea = base.wrapping_add(instr.displacement as u32);
    if INDEXED {
        ea = ea.wrapping_add(cpu.regs.get(instr.ry));
    }
    ea
}

pub(super) fn exec_load<const SIZE: u32, const PCREL: bool, const INDEXED: bool>(
    instr: &Instruction,
    cpu: &mut RidgeCPU,
) -> ExecResult {
    let ea = effective_address::<PCREL, INDEXED>(instr, cpu);
    if !is_aligned(ea, SIZE) {
        return Err(Event::DataAlignment.into());
    }
    match SIZE {
        1 => {
            let v = cpu
                .memory
                .read_byte_v(ea, SegmentKind::Data, cpu.mode, &cpu.srs)?;
            cpu.regs.set(instr.rx, v as u32);
        }
        2 => {
            let v = cpu
                .memory
                .read_halfword_v(ea, SegmentKind::Data, cpu.mode, &cpu.srs)?;
            cpu.regs.set(instr.rx, v as u32);
        }
        4 => {
            let v = cpu
                .memory
                .read_word_v(ea, SegmentKind::Data, cpu.mode, &cpu.srs)?;
            cpu.regs.set(instr.rx, v);
        }
        _ => {
            let v = cpu
                .memory
                .read_doubleword_v(ea, SegmentKind::Data, cpu.mode, &cpu.srs)?;
            cpu.regs.set_pair(instr.rx, v);
        }
    }
    Ok(())
}

pub(super) fn exec_store<const SIZE: u32, const PCREL: bool, const INDEXED: bool>(
    instr: &Instruction,
    cpu: &mut RidgeCPU,
) -> ExecResult {
    let ea = effective_address::<PCREL, INDEXED>(instr, cpu);
    if !is_aligned(ea, SIZE) {
        return Err(Event::DataAlignment.into());
    }
    match SIZE {
        1 => {
            let v = cpu.regs.get(instr.rx) as u8;
            cpu.memory.write_byte_v(ea, v, cpu.mode, &cpu.srs)?;
        }
        2 => {
            let v = cpu.regs.get(instr.rx) as u16;
            cpu.memory.write_halfword_v(ea, v, cpu.mode, &cpu.srs)?;
        }
        4 => {
            let v = cpu.regs.get(instr.rx);
            cpu.memory.write_word_v(ea, v, cpu.mode, &cpu.srs)?;
        }
        _ => {
            let v = cpu.regs.pair(instr.rx);
            cpu.memory.write_doubleword_v(ea, v, cpu.mode, &cpu.srs)?;
        }
    }
    Ok(())
}

/// LADDR materialises the effective address without touching memory.
pub(super) fn exec_laddr<const PCREL: bool, const INDEXED: bool>(
    instr: &Instruction,
    cpu: &mut RidgeCPU,
) -> ExecResult {
    let ea = effective_address::<PCREL, INDEXED>(instr, cpu);
    cpu.regs.set(instr.rx, ea);
    Ok(())
}

// ==========================================
//        extended-precision integer
// ==========================================

pub(super) fn exec_eadd(instr: &Instruction, cpu: &mut RidgeCPU) -> ExecResult {
    let rst = cpu.regs.pair(instr.rx).wrapping_add(cpu.regs.pair(instr.ry));
    cpu.regs.set_pair(instr.rx, rst);
    Ok(())
}

pub(super) fn exec_esub(instr: &Instruction, cpu: &mut RidgeCPU) -> ExecResult {
    let rst = cpu.regs.pair(instr.rx).wrapping_sub(cpu.regs.pair(instr.ry));
    cpu.regs.set_pair(instr.rx, rst);
    Ok(())
}

/// Unsigned 32x32 -> 64 multiply into the pair at Rx.
pub(super) fn exec_empy(instr: &Instruction, cpu: &mut RidgeCPU) -> ExecResult {
    let rst = cpu.regs.get(instr.rx) as u64 * cpu.regs.get(instr.ry) as u64;
    cpu.regs.set_pair(instr.rx, rst);
    Ok(())
}

/// Unsigned 64/32 divide of the pair at Rx: quotient to R[(Rx+1) mod 16],
/// remainder to R[Rx].
pub(super) fn exec_ediv(instr: &Instruction, cpu: &mut RidgeCPU) -> ExecResult {
    let dividend = cpu.regs.pair(instr.rx);
    let divisor = cpu.regs.get(instr.ry) as u64;
    if divisor == 0 {
        return Err(Event::ArithmeticTrap.into());
    }
    let quotient = dividend / divisor;
    let remainder = dividend % divisor;
    cpu.regs
        .set(instr.rx.wrapping_add(1) & 0xF, quotient as u32);
    cpu.regs.set(instr.rx, remainder as u32);
    Ok(())
}

fn ordering_value(ord: Ordering) -> u32 {
    match ord {
        Ordering::Less => -1i32 as u32,
        Ordering::Equal => 0,
        Ordering::Greater => 1,
    }
}

pub(super) fn exec_lcomp(instr: &Instruction, cpu: &mut RidgeCPU) -> ExecResult {
    let a = cpu.regs.get(instr.rx) as i32;
    let b = cpu.regs.get(instr.ry) as i32;
    cpu.regs.set(instr.rx, ordering_value(a.cmp(&b)));
    Ok(())
}

pub(super) fn exec_dcomp(instr: &Instruction, cpu: &mut RidgeCPU) -> ExecResult {
    let a = cpu.regs.pair(instr.rx) as i64;
    let b = cpu.regs.pair(instr.ry) as i64;
    cpu.regs.set(instr.rx, ordering_value(a.cmp(&b)));
    Ok(())
}

/// Real-number arithmetic is not implemented; programs that reach it get
/// the illegal-instruction event, exactly like an undefined opcode.
pub(super) fn exec_float_stub(instr: &Instruction, _cpu: &mut RidgeCPU) -> ExecResult {
    Err(Event::IllegalInstruction {
        opcode: instr.op as u32,
    }
    .into())
}
