pub mod vrt;

use crate::{
    cpu::SpecialRegs,
    cpu::sr_index,
    isa::ridge::ProcessorMode,
    ram::PhysicalMemory,
};
use vrt::Translation;

/// Which segment register names the address space of a virtual access.
/// Fetches use the code segment (SR8), everything else the data segment
/// (SR9).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentKind {
    Code,
    Data,
}

/// Failure of a virtual access. `PageFault` is architectural and becomes an
/// event at the processor; `WalkOverrun` is a host-detected impossibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemFault {
    PageFault { segment: u32, address: u32 },
    WalkOverrun { segment: u32, address: u32 },
}

/// Single authority for memory access and the VRT walk.
///
/// Two families: the raw one bypasses translation (kernel mode and the walk
/// itself), the `_v` one translates in user mode and passes through in
/// kernel mode. Nothing here raises events; page faults are returned as
/// flags for the processor to convert. Alignment is the processor's
/// problem.
pub struct MemoryController {
    ram: PhysicalMemory,
}

impl MemoryController {
    pub fn new(ram: PhysicalMemory) -> Self {
        Self { ram }
    }

    pub fn ram(&self) -> &PhysicalMemory {
        &self.ram
    }

    pub fn ram_mut(&mut self) -> &mut PhysicalMemory {
        &mut self.ram
    }

    // ---- raw family ----

    pub fn read_byte(&self, addr: u32) -> u8 {
        self.ram.read_byte(addr)
    }

    pub fn read_halfword(&self, addr: u32) -> u16 {
        self.ram.read_halfword(addr)
    }

    pub fn read_word(&self, addr: u32) -> u32 {
        self.ram.read_word(addr)
    }

    pub fn read_doubleword(&self, addr: u32) -> u64 {
        self.ram.read_doubleword(addr)
    }

    pub fn write_byte(&mut self, addr: u32, data: u8) {
        self.ram.write_byte(addr, data);
    }

    pub fn write_halfword(&mut self, addr: u32, data: u16) {
        self.ram.write_halfword(addr, data);
    }

    pub fn write_word(&mut self, addr: u32, data: u32) {
        self.ram.write_word(addr, data);
    }

    pub fn write_doubleword(&mut self, addr: u32, data: u64) {
        self.ram.write_doubleword(addr, data);
    }

    // ---- translation ----

    /// VRT walk for an explicit (segment, address) pair; the TRANS and DIRT
    /// instructions come through here as well as the virtual families.
    pub fn translate(
        &mut self,
        srs: &SpecialRegs,
        segment: u32,
        vaddr: u32,
        modified: bool,
        referenced: bool,
    ) -> Result<u32, MemFault> {
        let rst = vrt::translate(
            &mut self.ram,
            srs[sr_index::VRT],
            srs[sr_index::VRMASK],
            segment,
            vaddr,
            modified,
            referenced,
        );
        match rst {
            Ok(Translation::Real(real)) => Ok(real),
            Ok(Translation::PageFault) => Err(MemFault::PageFault {
                segment,
                address: vaddr,
            }),
            Err(vrt::WalkOverrun) => Err(MemFault::WalkOverrun {
                segment,
                address: vaddr,
            }),
        }
    }

    fn segment_number(kind: SegmentKind, srs: &SpecialRegs) -> u32 {
        match kind {
            SegmentKind::Code => srs.code_segment(),
            SegmentKind::Data => srs.data_segment(),
        }
    }

    /// Translate a read access: sets only the referenced bit.
    fn read_address(
        &mut self,
        addr: u32,
        kind: SegmentKind,
        mode: ProcessorMode,
        srs: &SpecialRegs,
    ) -> Result<u32, MemFault> {
        match mode {
            ProcessorMode::Kernel => Ok(addr),
            ProcessorMode::User => {
                let segment = Self::segment_number(kind, srs);
                self.translate(srs, segment, addr, false, true)
            }
        }
    }

    /// Translate a write access: sets modified and referenced.
    fn write_address(
        &mut self,
        addr: u32,
        mode: ProcessorMode,
        srs: &SpecialRegs,
    ) -> Result<u32, MemFault> {
        match mode {
            ProcessorMode::Kernel => Ok(addr),
            ProcessorMode::User => {
                let segment = srs.data_segment();
                self.translate(srs, segment, addr, true, true)
            }
        }
    }

    // ---- virtual family ----
    //
    // Callers align these accesses, so one translation covers the whole
    // transfer (a page is 4 KiB).

    pub fn read_byte_v(
        &mut self,
        addr: u32,
        kind: SegmentKind,
        mode: ProcessorMode,
        srs: &SpecialRegs,
    ) -> Result<u8, MemFault> {
        let real = self.read_address(addr, kind, mode, srs)?;
        Ok(self.ram.read_byte(real))
    }

    pub fn read_halfword_v(
        &mut self,
        addr: u32,
        kind: SegmentKind,
        mode: ProcessorMode,
        srs: &SpecialRegs,
    ) -> Result<u16, MemFault> {
        let real = self.read_address(addr, kind, mode, srs)?;
        Ok(self.ram.read_halfword(real))
    }

    pub fn read_word_v(
        &mut self,
        addr: u32,
        kind: SegmentKind,
        mode: ProcessorMode,
        srs: &SpecialRegs,
    ) -> Result<u32, MemFault> {
        let real = self.read_address(addr, kind, mode, srs)?;
        Ok(self.ram.read_word(real))
    }

    pub fn read_doubleword_v(
        &mut self,
        addr: u32,
        kind: SegmentKind,
        mode: ProcessorMode,
        srs: &SpecialRegs,
    ) -> Result<u64, MemFault> {
        let real = self.read_address(addr, kind, mode, srs)?;
        Ok(self.ram.read_doubleword(real))
    }

    pub fn write_byte_v(
        &mut self,
        addr: u32,
        data: u8,
        mode: ProcessorMode,
        srs: &SpecialRegs,
    ) -> Result<(), MemFault> {
        let real = self.write_address(addr, mode, srs)?;
        self.ram.write_byte(real, data);
        Ok(())
    }

    pub fn write_halfword_v(
        &mut self,
        addr: u32,
        data: u16,
        mode: ProcessorMode,
        srs: &SpecialRegs,
    ) -> Result<(), MemFault> {
        let real = self.write_address(addr, mode, srs)?;
        self.ram.write_halfword(real, data);
        Ok(())
    }

    pub fn write_word_v(
        &mut self,
        addr: u32,
        data: u32,
        mode: ProcessorMode,
        srs: &SpecialRegs,
    ) -> Result<(), MemFault> {
        let real = self.write_address(addr, mode, srs)?;
        self.ram.write_word(real, data);
        Ok(())
    }

    pub fn write_doubleword_v(
        &mut self,
        addr: u32,
        data: u64,
        mode: ProcessorMode,
        srs: &SpecialRegs,
    ) -> Result<(), MemFault> {
        let real = self.write_address(addr, mode, srs)?;
        self.ram.write_doubleword(real, data);
        Ok(())
    }
}
