//! Handlers for the privileged instruction group. Everything here raises
//! KernelViolation out of user mode; MAINT, READ and WRITE also accept a
//! user program whose PP flag is set in SR10.

use super::exec_function::ExecResult;
use crate::{
    config::{machine_config::MACHINE_ID, pcb},
    cpu::sr_index,
    isa::ridge::{
        event::Event, executor::RidgeCPU, instruction::Instruction, mmu::MemFault,
        opcode::Opcode, ProcessorMode,
    },
};

// MAINT sub-operations, selected by the Ry field
const MAINT_ELOGR: u8 = 0;
const MAINT_FLUSH: u8 = 6;
const MAINT_TRAPEXIT: u8 = 7;
const MAINT_ITEST: u8 = 8;
const MAINT_MACHINEID: u8 = 10;

fn kernel_violation(instr: &Instruction) -> Event {
    Event::KernelViolation {
        d0: instr.op as u32,
        d1: 0,
        d2: 0,
    }
}

fn require_kernel(instr: &Instruction, cpu: &RidgeCPU) -> ExecResult {
    if cpu.mode == ProcessorMode::Kernel {
        Ok(())
    } else {
        Err(kernel_violation(instr).into())
    }
}

fn require_io_privilege(instr: &Instruction, cpu: &RidgeCPU) -> ExecResult {
    if cpu.mode == ProcessorMode::Kernel || cpu.srs.user_privileged() {
        Ok(())
    } else {
        Err(kernel_violation(instr).into())
    }
}

/// Register range of SUS/LUS/LDREGS: Rx through Ry, no wrap; Rx alone when
/// Rx > Ry.
fn register_range(instr: &Instruction) -> std::ops::RangeInclusive<u8> {
    instr.rx..=instr.ry.max(instr.rx)
}

/// Save user state into the PCB. A missing PCB (SR14 == 1) makes this a
/// no-op; the PCB pointer is never dereferenced then.
pub(super) fn exec_sus(instr: &Instruction, cpu: &mut RidgeCPU) -> ExecResult {
    require_kernel(instr, cpu)?;
    if !cpu.srs.has_pcb() {
        return Ok(());
    }
    let base = cpu.srs[sr_index::PCB];
    cpu.memory
        .write_word(base.wrapping_add(pcb::USER_PC), cpu.srs[sr_index::USER_PC]);
    cpu.memory.write_word(
        base.wrapping_add(pcb::SEGMENTS),
        cpu.srs[sr_index::CODE_SEGMENT] << 16 | cpu.srs[sr_index::DATA_SEGMENT] & 0xFFFF,
    );
    cpu.memory
        .write_word(base.wrapping_add(pcb::TRAPS_WORD), cpu.srs[sr_index::TRAPS]);
    for k in register_range(instr) {
        cpu.memory
            .write_word(base.wrapping_add(4 * k as u32), cpu.regs.get(k));
    }
    Ok(())
}

/// Load user state from the PCB; the inverse of SUS.
pub(super) fn exec_lus(instr: &Instruction, cpu: &mut RidgeCPU) -> ExecResult {
    require_kernel(instr, cpu)?;
    if !cpu.srs.has_pcb() {
        return Ok(());
    }
    let base = cpu.srs[sr_index::PCB];
    cpu.srs[sr_index::USER_PC] = cpu.memory.read_word(base.wrapping_add(pcb::USER_PC));
    let segments = cpu.memory.read_word(base.wrapping_add(pcb::SEGMENTS));
    cpu.srs[sr_index::CODE_SEGMENT] = segments >> 16;
    cpu.srs[sr_index::DATA_SEGMENT] = segments & 0xFFFF;
    cpu.srs[sr_index::TRAPS] = cpu.memory.read_word(base.wrapping_add(pcb::TRAPS_WORD));
    for k in register_range(instr) {
        let v = cpu.memory.read_word(base.wrapping_add(4 * k as u32));
        cpu.regs.set(k, v);
    }
    Ok(())
}

/// Reload only the register block from the PCB.
pub(super) fn exec_ldregs(instr: &Instruction, cpu: &mut RidgeCPU) -> ExecResult {
    require_kernel(instr, cpu)?;
    if !cpu.srs.has_pcb() {
        return Ok(());
    }
    let base = cpu.srs[sr_index::PCB];
    for k in register_range(instr) {
        let v = cpu.memory.read_word(base.wrapping_add(4 * k as u32));
        cpu.regs.set(k, v);
    }
    Ok(())
}

/// Resume user mode at the saved user PC. Resuming with no current PCB is
/// a kernel bug and reports as a violation rather than jumping blind.
pub(super) fn exec_rum(instr: &Instruction, cpu: &mut RidgeCPU) -> ExecResult {
    require_kernel(instr, cpu)?;
    if !cpu.srs.has_pcb() {
        return Err(kernel_violation(instr).into());
    }
    cpu.pc = cpu.srs[sr_index::USER_PC];
    cpu.mode = ProcessorMode::User;
    Ok(())
}

/// TRANS probes the VRT for (R[Ry], R[Ry+1]); DIRT additionally marks the
/// page modified. A miss answers all-ones instead of faulting.
pub(super) fn exec_trans(instr: &Instruction, cpu: &mut RidgeCPU) -> ExecResult {
    require_kernel(instr, cpu)?;
    let segment = cpu.regs.get(instr.ry) & 0xFFFF;
    let vaddr = cpu.regs.get(instr.ry.wrapping_add(1) & 0xF);
    let modified = instr.op == Opcode::DIRT;
    match cpu.memory.translate(&cpu.srs, segment, vaddr, modified, true) {
        Ok(real) => cpu.regs.set(instr.rx, real),
        Err(MemFault::PageFault { .. }) => cpu.regs.set(instr.rx, 0xFFFF_FFFF),
        Err(fault @ MemFault::WalkOverrun { .. }) => return Err(fault.into()),
    }
    Ok(())
}

pub(super) fn exec_move_sr(instr: &Instruction, cpu: &mut RidgeCPU) -> ExecResult {
    require_kernel(instr, cpu)?;
    let v = cpu.regs.get(instr.ry);
    cpu.srs.set(instr.rx, v);
    Ok(())
}

pub(super) fn exec_move_rs(instr: &Instruction, cpu: &mut RidgeCPU) -> ExecResult {
    require_kernel(instr, cpu)?;
    let v = cpu.srs.get(instr.ry);
    cpu.regs.set(instr.rx, v);
    Ok(())
}

/// I/O address word in R[Ry]: device in bits 0..7 (the top byte), the rest
/// is passed to the device.
fn split_address_word(word: u32) -> (u8, u32) {
    ((word >> 24) as u8, word & 0x00FF_FFFF)
}

pub(super) fn exec_read(instr: &Instruction, cpu: &mut RidgeCPU) -> ExecResult {
    require_io_privilege(instr, cpu)?;
    let (device, device_data) = split_address_word(cpu.regs.get(instr.ry));
    let (status, data) = cpu.bus.read(device, device_data);
    let status = RidgeCPU::check_bus_status(status)?;
    // data before status: Rx+1 first, so READ with aliasing Rx/Ry still
    // sees the status win
    cpu.regs.set(instr.rx.wrapping_add(1) & 0xF, data);
    cpu.regs.set(instr.rx, status);
    Ok(())
}

pub(super) fn exec_write(instr: &Instruction, cpu: &mut RidgeCPU) -> ExecResult {
    require_io_privilege(instr, cpu)?;
    let (device, device_data) = split_address_word(cpu.regs.get(instr.ry));
    let status = cpu.bus.write(device, device_data, cpu.regs.get(instr.rx));
    let status = RidgeCPU::check_bus_status(status)?;
    cpu.regs.set(instr.rx, status);
    Ok(())
}

pub(super) fn exec_maint(instr: &Instruction, cpu: &mut RidgeCPU) -> ExecResult {
    require_io_privilege(instr, cpu)?;
    match instr.ry {
        MAINT_ELOGR => {
            let v = if cpu.pending_device.is_some() { 0x10 } else { 0x00 };
            cpu.regs.set(instr.rx, v);
        }
        MAINT_FLUSH => {
            // no instruction cache or TMT is modelled
        }
        MAINT_TRAPEXIT => {
            cpu.pc = cpu.srs[sr_index::SAVED_PC];
        }
        MAINT_ITEST => {
            if cpu.pending_device.is_some() {
                let ioir = cpu.ack_pending_interrupt();
                cpu.regs.set(instr.rx.wrapping_add(1) & 0xF, ioir);
                cpu.regs.set(instr.rx, 0);
            } else {
                cpu.regs.set(instr.rx, 1);
            }
        }
        MAINT_MACHINEID => {
            cpu.regs.set(instr.rx, MACHINE_ID);
        }
        other => {
            log::warn!("MAINT sub-op {} is not implemented", other);
            return Err(Event::IllegalInstruction {
                opcode: instr.op as u32,
            }
            .into());
        }
    }
    Ok(())
}
