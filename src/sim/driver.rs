//! The cycle loop around the device under test.

use super::{
    memory::{DataMemory, InstructionMemory},
    Dut, KC_BASE_DATA, KC_BASE_INSTRUCTIONS, KC_NUM_BLOCKS, KC_NUM_WARPS,
};

/// Pulses the clock once: low, settle, high, settle. External actors
/// never observe the two levels as separate states.
pub fn tick<D: Dut>(dut: &mut D) {
    dut.pins_mut().clk = false;
    dut.eval();
    dut.pins_mut().clk = true;
    dut.eval();
}

/// Drives the launch parameters onto the kernel-config bus. The slot
/// assignment is part of the device contract.
pub fn set_kernel_config<D: Dut>(
    dut: &mut D,
    base_instructions_addr: u32,
    base_data_addr: u32,
    num_blocks: u32,
    num_warps_per_block: u32,
) {
    let kernel_config = &mut dut.pins_mut().kernel_config;
    kernel_config[KC_BASE_INSTRUCTIONS] = base_instructions_addr;
    kernel_config[KC_BASE_DATA] = base_data_addr;
    kernel_config[KC_NUM_BLOCKS] = num_blocks;
    kernel_config[KC_NUM_WARPS] = num_warps_per_block;
}

/// Runs the device until it reports done or the cycle budget runs out.
/// Returns whether it finished. On time-out nothing is torn down; the
/// memories stay inspectable.
///
/// Each cycle: settle, check the done flag, service both memories,
/// settle the freshly driven responses, then pulse the clock.
pub fn simulate<D: Dut>(
    dut: &mut D,
    instruction_mem: &mut InstructionMemory,
    data_mem: &mut DataMemory,
    max_cycles: u32,
) -> bool {
    dut.pins_mut().execution_start = true;

    for cycle in 0..max_cycles {
        dut.eval();

        if dut.pins().execution_done {
            log::debug!("execution done after {cycle} cycles");
            return true;
        }

        instruction_mem.process(&mut dut.pins_mut().instruction_mem_read);
        {
            let pins = dut.pins_mut();
            data_mem.process(&mut pins.data_mem_read, &mut pins.data_mem_write);
        }

        dut.eval();

        tick(dut);
    }
    log::debug!("cycle budget of {max_cycles} exhausted");
    false
}
