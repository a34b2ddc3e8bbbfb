//! Whole-pipeline scenarios: assembly source through the encoder, the
//! memory models, and the behavioral core.

use warpsim::asm::encoder::assemble;
use warpsim::asm::AsmError;
use warpsim::isa;
use warpsim::sim::driver::{set_kernel_config, simulate};
use warpsim::sim::memory::{DataMemory, InstructionMemory};
use warpsim::sim::model::Core;

const WARP: u32 = isa::WARP_SIZE as u32;

/// Assembles and runs a kernel on a fresh core, with `preload` pushed
/// into data memory first. Panics on time-out.
fn run(source: &str, preload: &[u32], max_cycles: u32) -> DataMemory {
    let program = assemble(source).expect("program should assemble");
    let mut core = Core::new();
    let mut instruction_mem = InstructionMemory::new();
    let mut data_mem = DataMemory::new();
    for &word in preload {
        data_mem.push(word);
    }
    instruction_mem.load_program(0, &program);
    set_kernel_config(
        &mut core,
        program.config.base_instructions_addr,
        program.config.base_data_addr,
        program.config.num_blocks,
        program.config.num_warps_per_block,
    );
    let done = simulate(&mut core, &mut instruction_mem, &mut data_mem, max_cycles);
    assert!(done, "kernel timed out after {max_cycles} cycles");
    data_mem
}

#[test]
fn thread_id_store() {
    let data = run("addi x5, x1, 0\nsw x5, 0(x1)\nhalt\n", &[], 100);
    for i in 0..WARP {
        assert_eq!(data.get(i), i);
    }
}

#[test]
fn broadcast_load_then_store() {
    let data = run(
        "lw x6, 0(x0)\nsw x1, 0(x6)\nhalt\n",
        &[10, 20, 30],
        10000,
    );
    for i in 0..WARP {
        assert_eq!(data.get(i), 10);
    }
}

#[test]
fn load_add_store() {
    let source = "\
lw      x6, 0(x0)
lw      x5, 1(x0)
add     x7, x6, x5
sw      x1, 0(x7)
halt
";
    let data = run(source, &[10, 20], 2000);
    for i in 0..WARP {
        assert_eq!(data.get(i), 30);
    }
}

#[test]
fn masked_load_gates_the_lanes() {
    // The mask bit on a load turns it into a scalar load of the
    // execution mask, built here exactly the way a device test would:
    // by setting bit 6 on an encoded word.
    let mut core = Core::new();
    let mut instruction_mem = InstructionMemory::new();
    let mut data_mem = DataMemory::new();

    data_mem.push(1 << 2);

    instruction_mem.push(isa::lw(1, 0, 0).with_scalar_mask());
    instruction_mem.push(isa::addi(5, 1, 0));
    instruction_mem.push(isa::sw(5, 1, 0));
    instruction_mem.push(isa::halt());

    set_kernel_config(&mut core, 0, 0, 1, 1);
    assert!(simulate(&mut core, &mut instruction_mem, &mut data_mem, 500));

    assert_eq!(data_mem.get(0), 4);
    for i in 1..WARP {
        if i == 2 {
            assert_eq!(data_mem.get(i), 2);
        } else {
            assert_eq!(data_mem.get(i), 0);
        }
    }
}

#[test]
fn masked_load_assembles_as_scalar_form() {
    let source = "\
s_lw    s1, 0(s0)
addi    x5, x1, 0
sw      x5, 0(x1)
halt
";
    let data = run(source, &[1 << 2], 500);
    assert_eq!(data.get(0), 4);
    assert_eq!(data.get(2), 2);
    for i in (1..WARP).filter(|&i| i != 2) {
        assert_eq!(data.get(i), 0);
    }
}

#[test]
fn cross_width_compare_masks_the_tail() {
    let source = "\
addi    x5, x1, 0
sx_slti s1, x5, 5
sw      x5, 0(x1)
halt
";
    let data = run(source, &[], 2000);
    for i in 0..WARP {
        if i < 5 {
            assert_eq!(data.get(i), i);
        } else {
            assert_eq!(data.get(i), 0);
        }
    }
}

#[test]
fn register_kind_errors_stop_before_simulation() {
    let errors = assemble("addi s5, x1, 0\n").unwrap_err();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].line, 1);
    assert_eq!(
        errors[0].error,
        AsmError::RegisterType {
            column: 6,
            register: "s5".to_owned(),
            expected: "vector",
        }
    );
}

#[test]
fn directives_shape_the_launch() {
    let source = "\
.blocks 2
.warps  2
addi    x5, x1, 0
sw      x5, 0(x1)
halt
";
    let data = run(source, &[], 2000);
    // Two warps per block cover thread ids 0..64; the second block
    // repeats the same stores.
    for i in 0..2 * WARP {
        assert_eq!(data.get(i), i);
    }
    assert_eq!(data.get(2 * WARP), 0);
}

#[test]
fn labels_resolve_through_the_pipeline() {
    let source = "\
entry:
    addi    x5, x4, end
    sw      x1, 0(x5)
    halt
end:
";
    let data = run(source, &[], 2000);
    // `end` sits three instructions past the addi at pc 0.
    for i in 0..WARP {
        assert_eq!(data.get(i), 3);
    }
}
