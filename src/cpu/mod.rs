mod reg_file;

pub use reg_file::{sr_index, RegFile, SpecialRegs};
