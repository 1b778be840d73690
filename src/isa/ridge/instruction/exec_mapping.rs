use crate::isa::ridge::{
    executor::RidgeCPU,
    instruction::{exec_function::*, exec_priv_function::*, Instruction},
    opcode::Opcode,
};

/// Dispatch table, one handler per opcode. Short and long displacement
/// variants share a handler; the decoder already resolved the length and
/// target. Holes in the opcode space never reach this: they fall out of
/// decode as unknown.
pub(in crate::isa::ridge) fn get_exec_func(op: Opcode) -> fn(&Instruction, &mut RidgeCPU) -> ExecResult {
    match op {
        // integer ALU
        Opcode::MOVE => exec_move,
        Opcode::NEG => exec_neg,
        Opcode::ADD => exec_add,
        Opcode::SUB => exec_sub,
        Opcode::MPY => exec_mpy,
        Opcode::DIV => exec_div,
        Opcode::REM => exec_rem,
        Opcode::NOT => exec_not,
        Opcode::OR => exec_or,
        Opcode::XOR => exec_xor,
        Opcode::AND => exec_and,
        Opcode::CBIT => exec_cbit,
        Opcode::SBIT => exec_sbit,
        Opcode::TBIT => exec_tbit,
        Opcode::CHK => exec_chk,

        Opcode::MOVEI => exec_movei,
        Opcode::ADDI => exec_addi,
        Opcode::SUBI => exec_subi,
        Opcode::MPYI => exec_mpyi,
        Opcode::NOTI => exec_noti,
        Opcode::ANDI => exec_andi,
        Opcode::CHKI => exec_chki,

        // shifts
        Opcode::LSL => exec_lsl,
        Opcode::LSR => exec_lsr,
        Opcode::ASL => exec_asl,
        Opcode::ASR => exec_asr,
        Opcode::DLSL => exec_dlsl,
        Opcode::DLSR => exec_dlsr,
        Opcode::CSL => exec_csl,
        Opcode::SEB => exec_seb,
        Opcode::SEH => exec_seh,

        Opcode::LSLI => exec_lsli,
        Opcode::LSRI => exec_lsri,
        Opcode::ASLI => exec_asli,
        Opcode::ASRI => exec_asri,
        Opcode::DLSLI => exec_dlsli,
        Opcode::DLSRI => exec_dlsri,
        Opcode::CSLI => exec_csli,

        // control transfer
        Opcode::CALLR => exec_callr,
        Opcode::RET => exec_ret,
        Opcode::KCALL => exec_kcall,
        Opcode::TRAP => exec_trap,

        // tests
        Opcode::TEST_GT => exec_test_gt,
        Opcode::TEST_LT => exec_test_lt,
        Opcode::TEST_EQ => exec_test_eq,
        Opcode::TEST_LTEQ => exec_test_lteq,
        Opcode::TEST_GTEQ => exec_test_gteq,
        Opcode::TEST_NEQ => exec_test_neq,

        Opcode::TESTI_GT => exec_testi_gt,
        Opcode::TESTI_LT => exec_testi_lt,
        Opcode::TESTI_EQ => exec_testi_eq,
        Opcode::TESTI_LTEQ => exec_testi_lteq,
        Opcode::TESTI_GTEQ => exec_testi_gteq,
        Opcode::TESTI_NEQ => exec_testi_neq,

        // privileged
        Opcode::SUS => exec_sus,
        Opcode::LUS => exec_lus,
        Opcode::RUM => exec_rum,
        Opcode::LDREGS => exec_ldregs,
        Opcode::TRANS | Opcode::DIRT => exec_trans,
        Opcode::MOVE_SR => exec_move_sr,
        Opcode::MOVE_RS => exec_move_rs,
        Opcode::MAINT => exec_maint,
        Opcode::READ => exec_read,
        Opcode::WRITE => exec_write,

        // floating point: stubbed to illegal-instruction
        Opcode::FIXT
        | Opcode::FIXR
        | Opcode::RNEG
        | Opcode::RADD
        | Opcode::RSUB
        | Opcode::RMPY
        | Opcode::RDIV
        | Opcode::MAKERD
        | Opcode::FLOAT
        | Opcode::RCOMP
        | Opcode::DFIXT
        | Opcode::DFIXR
        | Opcode::DRNEG
        | Opcode::DRADD
        | Opcode::DRSUB
        | Opcode::DRMPY
        | Opcode::DRDIV
        | Opcode::MAKEDR
        | Opcode::DFLOAT
        | Opcode::DRCOMP => exec_float_stub,

        // extended-precision integer
        Opcode::EADD => exec_eadd,
        Opcode::ESUB => exec_esub,
        Opcode::EMPY => exec_empy,
        Opcode::EDIV => exec_ediv,
        Opcode::LCOMP => exec_lcomp,
        Opcode::DCOMP => exec_dcomp,

        // branches, register comparison
        Opcode::BR_GT_S | Opcode::BR_GT_L => exec_br_gt,
        Opcode::BR_LT_S | Opcode::BR_LT_L => exec_br_lt,
        Opcode::BR_EQ_S | Opcode::BR_EQ_L => exec_br_eq,
        Opcode::BR_LTEQ_S | Opcode::BR_LTEQ_L => exec_br_lteq,
        Opcode::BR_GTEQ_S | Opcode::BR_GTEQ_L => exec_br_gteq,
        Opcode::BR_NEQ_S | Opcode::BR_NEQ_L => exec_br_neq,
        Opcode::BR_S | Opcode::BR_L => exec_br,
        Opcode::LOOP_S | Opcode::LOOP_L => exec_loop,
        Opcode::CALL_S | Opcode::CALL_L => exec_call,

        // branches, immediate comparison
        Opcode::BR_GT_SI | Opcode::BR_GT_LI => exec_bri_gt,
        Opcode::BR_LT_SI | Opcode::BR_LT_LI => exec_bri_lt,
        Opcode::BR_EQ_SI | Opcode::BR_EQ_LI => exec_bri_eq,
        Opcode::BR_LTEQ_SI | Opcode::BR_LTEQ_LI => exec_bri_lteq,
        Opcode::BR_GTEQ_SI | Opcode::BR_GTEQ_LI => exec_bri_gteq,
        Opcode::BR_NEQ_SI | Opcode::BR_NEQ_LI => exec_bri_neq,

        // address generation
        Opcode::LADDR_CS | Opcode::LADDR_CL => exec_laddr::<true, false>,
        Opcode::LADDR_CSX | Opcode::LADDR_CLX => exec_laddr::<true, true>,
        Opcode::LADDR_DS | Opcode::LADDR_DL => exec_laddr::<false, false>,
        Opcode::LADDR_DSX | Opcode::LADDR_DLX => exec_laddr::<false, true>,

        // loads
        Opcode::LOADB_CS | Opcode::LOADB_CL => exec_load::<1, true, false>,
        Opcode::LOADB_CSX | Opcode::LOADB_CLX => exec_load::<1, true, true>,
        Opcode::LOADH_CS | Opcode::LOADH_CL => exec_load::<2, true, false>,
        Opcode::LOADH_CSX | Opcode::LOADH_CLX => exec_load::<2, true, true>,
        Opcode::LOAD_CS | Opcode::LOAD_CL => exec_load::<4, true, false>,
        Opcode::LOAD_CSX | Opcode::LOAD_CLX => exec_load::<4, true, true>,
        Opcode::LOADD_CS | Opcode::LOADD_CL => exec_load::<8, true, false>,
        Opcode::LOADD_CSX | Opcode::LOADD_CLX => exec_load::<8, true, true>,
        Opcode::LOADB_DS | Opcode::LOADB_DL => exec_load::<1, false, false>,
        Opcode::LOADB_DSX | Opcode::LOADB_DLX => exec_load::<1, false, true>,
        Opcode::LOADH_DS | Opcode::LOADH_DL => exec_load::<2, false, false>,
        Opcode::LOADH_DSX | Opcode::LOADH_DLX => exec_load::<2, false, true>,
        Opcode::LOAD_DS | Opcode::LOAD_DL => exec_load::<4, false, false>,
        Opcode::LOAD_DSX | Opcode::LOAD_DLX => exec_load::<4, false, true>,
        Opcode::LOADD_DS | Opcode::LOADD_DL => exec_load::<8, false, false>,
        Opcode::LOADD_DSX | Opcode::LOADD_DLX => exec_load::<8, false, true>,

        // stores
        Opcode::STOREB_CS | Opcode::STOREB_CL => exec_store::<1, true, false>,
        Opcode::STOREB_CSX | Opcode::STOREB_CLX => exec_store::<1, true, true>,
        Opcode::STOREH_CS | Opcode::STOREH_CL => exec_store::<2, true, false>,
        Opcode::STOREH_CSX | Opcode::STOREH_CLX => exec_store::<2, true, true>,
        Opcode::STORE_CS | Opcode::STORE_CL => exec_store::<4, true, false>,
        Opcode::STORE_CSX | Opcode::STORE_CLX => exec_store::<4, true, true>,
        Opcode::STORED_CS | Opcode::STORED_CL => exec_store::<8, true, false>,
        Opcode::STORED_CSX | Opcode::STORED_CLX => exec_store::<8, true, true>,
        Opcode::STOREB_DS | Opcode::STOREB_DL => exec_store::<1, false, false>,
        Opcode::STOREB_DSX | Opcode::STOREB_DLX => exec_store::<1, false, true>,
        Opcode::STOREH_DS | Opcode::STOREH_DL => exec_store::<2, false, false>,
        Opcode::STOREH_DSX | Opcode::STOREH_DLX => exec_store::<2, false, true>,
        Opcode::STORE_DS | Opcode::STORE_DL => exec_store::<4, false, false>,
        Opcode::STORE_DSX | Opcode::STORE_DLX => exec_store::<4, false, true>,
        Opcode::STORED_DS | Opcode::STORED_DL => exec_store::<8, false, false>,
        Opcode::STORED_DSX | Opcode::STORED_DLX => exec_store::<8, false, true>,
    }
}
