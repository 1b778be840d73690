use bitflags::bitflags;

use crate::{config::machine_config::VRT_WALK_BOUND, ram::PhysicalMemory};

bitflags! {
    /// Flag bits of the second VRT entry word. Ridge numbering: the
    /// referenced bit is bit 16 of the word, modified is bit 20.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct VrtFlags: u32 {
        const REFERENCED = 0x8000;
        const VALID = 0x7000;
        const MODIFIED = 0x0800;
    }
}

/// Low 11 bits of the second entry word hold the physical page number.
const PAGE_NUM_MASK: u32 = 0x7FF;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Translation {
    Real(u32),
    PageFault,
}

/// The caller-built link chain looped past the safety bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WalkOverrun;

/// Walk the Virtual Resource Table for `(segment, vaddr)`.
///
/// The VRT is a hash-chained inverted page table: the initial probe is
/// `(((vaddr >> 12) + segment) & vrmask) * 8 + vrt_base`, and non-matching
/// entries chain through the link halfword. Entry reads and the
/// modified/referenced writeback go through the raw (untranslated) memory
/// interface. On a hit the flag update is written back before returning.
pub fn translate(
    mem: &mut PhysicalMemory,
    vrt_base: u32,
    vrmask: u32,
    segment: u32,
    vaddr: u32,
    modified: bool,
    referenced: bool,
) -> Result<Translation, WalkOverrun> {
    let tag = vaddr >> 16;
    let mut probe = (vaddr >> 12).wrapping_add(segment) & vrmask;
    probe = (probe << 3).wrapping_add(vrt_base);

    for _ in 0..VRT_WALK_BOUND {
        let e0 = mem.read_word(probe);
        let e1 = mem.read_word(probe.wrapping_add(4));

        if e0 >> 16 == segment && e0 & 0xFFFF == tag {
            if e1 & VrtFlags::VALID.bits() == 0 {
                return Ok(Translation::PageFault);
            }
            let mut flags = e1;
            if modified {
                flags |= VrtFlags::MODIFIED.bits();
            }
            if referenced {
                flags |= VrtFlags::REFERENCED.bits();
            }
            mem.write_word(probe.wrapping_add(4), flags);
            let real = (e1 & PAGE_NUM_MASK) << 12 | vaddr & 0xFFF;
            return Ok(Translation::Real(real));
        }

        let link = e1 >> 16;
        if link == 0 {
            return Ok(Translation::PageFault);
        }
        probe = link.wrapping_add(vrt_base);
    }

    Err(WalkOverrun)
}
