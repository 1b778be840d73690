use crate::{
    cpu::SpecialRegs,
    isa::ridge::{
        instruction::Instruction,
        mmu::{MemFault, MemoryController, SegmentKind},
        opcode::{encoded_length, Opcode},
        ProcessorMode,
    },
};

/// Decode result. An opcode byte naming no instruction still has a
/// well-defined length from its format bits, which the processor needs to
/// advance past it before signalling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decoded {
    Known(Instruction),
    Unknown { opcode: u8, length: u8 },
}

/// Fetch and decode the instruction at `addr`: raw in kernel mode,
/// translated through the code segment in user mode.
///
/// A six-byte instruction needs more than one memory read and each read can
/// fault on its own page. Whichever sub-read faults, the fault is reported
/// against the instruction's start address; the long displacement is read
/// as two halfwords so a fetch straddling a page boundary stays correct.
pub fn fetch(
    mem: &mut MemoryController,
    srs: &SpecialRegs,
    mode: ProcessorMode,
    addr: u32,
) -> Result<Decoded, MemFault> {
    let report_at_start = |fault: MemFault| match fault {
        MemFault::PageFault { segment, .. } => MemFault::PageFault {
            segment,
            address: addr,
        },
        MemFault::WalkOverrun { segment, .. } => MemFault::WalkOverrun {
            segment,
            address: addr,
        },
    };

    let h0 = mem
        .read_halfword_v(addr, SegmentKind::Code, mode, srs)
        .map_err(report_at_start)?;
    let opcode_byte = (h0 >> 8) as u8;
    let rx = (h0 >> 4 & 0xF) as u8;
    let ry = (h0 & 0xF) as u8;
    let length = encoded_length(opcode_byte);

    let displacement = match length {
        2 => 0,
        4 => {
            let d = mem
                .read_halfword_v(addr.wrapping_add(2), SegmentKind::Code, mode, srs)
                .map_err(report_at_start)?;
            d as i16 as i32
        }
        _ => {
            let hi = mem
                .read_halfword_v(addr.wrapping_add(2), SegmentKind::Code, mode, srs)
                .map_err(report_at_start)?;
            let lo = mem
                .read_halfword_v(addr.wrapping_add(4), SegmentKind::Code, mode, srs)
                .map_err(report_at_start)?;
            ((hi as u32) << 16 | lo as u32) as i32
        }
    };

    let op = match Opcode::try_from(opcode_byte) {
        Ok(op) => op,
        Err(_) => {
            return Ok(Decoded::Unknown {
                opcode: opcode_byte,
                length,
            })
        }
    };

    Ok(Decoded::Known(Instruction {
        op,
        rx,
        ry,
        displacement,
        branch_address: addr.wrapping_add(displacement as u32) & !1,
        length,
    }))
}
