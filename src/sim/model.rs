//! A deterministic behavioral model of the GPU core, honoring the same
//! pin contract as the gate-level device. The harness treats it as any
//! other [`Dut`]; nothing outside the pins is observable.

use crate::isa::{InstructionWord, MnemonicName, LAST_RESERVED_REGISTER, WARP_SIZE};

use super::{
    get_bit, set_bit, Dut, Pins, DATA_MEM_CHANNELS, KC_BASE_DATA, KC_BASE_INSTRUCTIONS,
    KC_NUM_BLOCKS, KC_NUM_WARPS,
};

const VECTOR_REGS: usize = 32;
const SCALAR_REGS: usize = 32;

/// Scalar register gating lane execution: bit `i` of `s1` enables
/// thread `i` of the warp.
const MASK_REGISTER: usize = 1;

/// A fetched word split into its fields.
#[derive(Debug, Clone, Copy)]
struct Decoded {
    name: MnemonicName,
    scalar: bool,
    rd: usize,
    rs1: usize,
    rs2: usize,
    imm: i32,
}

fn decode(word: InstructionWord) -> Option<Decoded> {
    let name = word.name().ok()?;
    let imm = if name.is_store() {
        word.imm_stype()
    } else {
        word.imm_itype()
    };
    Some(Decoded {
        name,
        scalar: word.scalar_flag(),
        rd: word.rd() as usize,
        rs1: word.rs1() as usize,
        rs2: word.rs2() as usize,
        imm,
    })
}

#[derive(Debug, Clone, Copy)]
enum WarpState {
    /// Requesting the word at the current PC.
    Fetch,
    /// Waiting on the data-memory responses for one lane batch.
    Mem { decoded: Decoded, batch: usize },
}

#[derive(Debug, Clone)]
struct Warp {
    pc: u32,
    state: WarpState,
    done: bool,
    vregs: [[u32; WARP_SIZE]; VECTOR_REGS],
    sregs: [u32; SCALAR_REGS],
}

impl Warp {
    fn new(block_id: u32, warp_in_block: u32, block_size: u32) -> Self {
        let mut vregs = [[0u32; WARP_SIZE]; VECTOR_REGS];
        for (lane, value) in vregs[1].iter_mut().enumerate() {
            *value = warp_in_block * WARP_SIZE as u32 + lane as u32;
        }
        vregs[2] = [block_id; WARP_SIZE];
        vregs[3] = [block_size; WARP_SIZE];

        let mut sregs = [0u32; SCALAR_REGS];
        sregs[MASK_REGISTER] = u32::MAX;

        Self {
            pc: 0,
            state: WarpState::Fetch,
            done: false,
            vregs,
            sregs,
        }
    }

    fn active_mask(&self) -> u32 {
        self.sregs[MASK_REGISTER]
    }

    /// Vector registers 0..=3 are launch constants; writes are dropped.
    fn write_vreg(&mut self, reg: usize, lane: usize, value: u32) {
        if reg > LAST_RESERVED_REGISTER as usize {
            self.vregs[reg][lane] = value;
        }
    }

    /// `s0` is hard zero; writes are dropped.
    fn write_sreg(&mut self, reg: usize, value: u32) {
        if reg != 0 {
            self.sregs[reg] = value;
        }
    }

    fn execute_alu(&mut self, d: &Decoded) {
        if d.name.is_cross_width() {
            // Collect the per-lane predicate into a scalar bitmask;
            // inactive lanes contribute 0.
            let mask = self.active_mask();
            let mut result = 0u32;
            for lane in 0..WARP_SIZE {
                if !get_bit(mask, lane) {
                    continue;
                }
                let a = self.vregs[d.rs1][lane] as i32;
                let b = if d.name == MnemonicName::SxSlti {
                    d.imm
                } else {
                    self.vregs[d.rs2][lane] as i32
                };
                if a < b {
                    result |= 1 << lane;
                }
            }
            self.write_sreg(d.rd, result);
        } else if d.scalar {
            let a = self.sregs[d.rs1];
            let b = if d.name.is_rtype() {
                self.sregs[d.rs2]
            } else {
                d.imm as u32
            };
            let value = alu_op(d.name, a, b);
            self.write_sreg(d.rd, value);
        } else {
            let mask = self.active_mask();
            for lane in 0..WARP_SIZE {
                if !get_bit(mask, lane) {
                    continue;
                }
                let a = self.vregs[d.rs1][lane];
                let b = if d.name.is_rtype() {
                    self.vregs[d.rs2][lane]
                } else {
                    d.imm as u32
                };
                self.write_vreg(d.rd, lane, alu_op(d.name, a, b));
            }
        }
    }

    /// Whether every channel requested for this batch has its ready bit.
    fn mem_responses_complete(
        &self,
        d: &Decoded,
        batch: usize,
        read_ready: u32,
        write_ready: u32,
    ) -> bool {
        let ready = if d.name.is_load() {
            read_ready
        } else {
            write_ready
        };
        if d.scalar {
            return get_bit(ready, 0);
        }
        let mask = self.active_mask();
        for channel in 0..DATA_MEM_CHANNELS {
            let lane = batch * DATA_MEM_CHANNELS + channel;
            if lane >= WARP_SIZE {
                break;
            }
            if get_bit(mask, lane) && !get_bit(ready, channel) {
                return false;
            }
        }
        true
    }

    fn apply_load(&mut self, d: &Decoded, batch: usize, data: &[u32; DATA_MEM_CHANNELS]) {
        if d.scalar {
            let value = load_value(d.name, data[0]);
            self.write_sreg(d.rd, value);
            return;
        }
        let mask = self.active_mask();
        for channel in 0..DATA_MEM_CHANNELS {
            let lane = batch * DATA_MEM_CHANNELS + channel;
            if lane >= WARP_SIZE {
                break;
            }
            if get_bit(mask, lane) {
                self.write_vreg(d.rd, lane, load_value(d.name, data[channel]));
            }
        }
    }
}

fn alu_op(name: MnemonicName, a: u32, b: u32) -> u32 {
    use MnemonicName::*;
    match name {
        Addi | Add => a.wrapping_add(b),
        Sub => a.wrapping_sub(b),
        Slti | Slt => ((a as i32) < (b as i32)) as u32,
        Xori | Xor => a ^ b,
        Ori | Or => a | b,
        Andi | And => a & b,
        Slli | Sll => a << (b & 0x1f),
        Srli | Srl => a >> (b & 0x1f),
        Srai | Sra => ((a as i32) >> (b & 0x1f)) as u32,
        _ => 0,
    }
}

/// Memory cells are word-granular; the narrow accesses take the low
/// half/byte of the cell, sign-extended on load.
fn load_value(name: MnemonicName, word: u32) -> u32 {
    match name {
        MnemonicName::Lb => word as u8 as i8 as i32 as u32,
        MnemonicName::Lh => word as u16 as i16 as i32 as u32,
        _ => word,
    }
}

fn store_value(name: MnemonicName, value: u32) -> u32 {
    match name {
        MnemonicName::Sb => value & 0xff,
        MnemonicName::Sh => value & 0xffff,
        _ => value,
    }
}

/// The behavioral core. One warp is serviced per cycle, round-robin per
/// retired instruction, which keeps the memory channels collision-free
/// and the run deterministic.
#[derive(Debug, Default)]
pub struct Core {
    pins: Pins,
    warps: Vec<Warp>,
    current: usize,
    started: bool,
    prev_clk: bool,
    base_instructions: u32,
    base_data: u32,
}

impl Core {
    pub fn new() -> Self {
        Self::default()
    }

    fn launch(&mut self) {
        let config = self.pins.kernel_config;
        self.base_instructions = config[KC_BASE_INSTRUCTIONS];
        self.base_data = config[KC_BASE_DATA];
        let num_blocks = config[KC_NUM_BLOCKS];
        let warps_per_block = config[KC_NUM_WARPS];
        let block_size = warps_per_block * WARP_SIZE as u32;

        self.warps.clear();
        for block in 0..num_blocks {
            for warp in 0..warps_per_block {
                self.warps.push(Warp::new(block, warp, block_size));
            }
        }
        self.current = 0;
        self.started = true;
        log::debug!(
            "launch: {num_blocks} block(s) x {warps_per_block} warp(s), \
             instructions at {:#x}, data at {:#x}",
            self.base_instructions,
            self.base_data
        );
    }

    fn all_done(&self) -> bool {
        self.warps.iter().all(|w| w.done)
    }

    fn advance_warp(&mut self) {
        if self.warps.is_empty() || self.all_done() {
            return;
        }
        loop {
            self.current = (self.current + 1) % self.warps.len();
            if !self.warps[self.current].done {
                break;
            }
        }
    }

    fn on_rising_edge(&mut self) {
        if !self.started {
            if self.pins.execution_start {
                self.launch();
            }
            return;
        }
        if self.all_done() {
            return;
        }

        let imem_ready = get_bit(self.pins.instruction_mem_read.ready, 0);
        let fetched = InstructionWord(self.pins.instruction_mem_read.data[0]);
        let read_ready = self.pins.data_mem_read.ready;
        let read_data = self.pins.data_mem_read.data;
        let write_ready = self.pins.data_mem_write.ready;

        let warp = &mut self.warps[self.current];
        let mut retired = false;

        match warp.state {
            WarpState::Fetch => {
                if imem_ready {
                    match decode(fetched) {
                        None => {
                            log::error!(
                                "undecodable instruction {:#010x} at pc {}",
                                fetched.bits(),
                                warp.pc
                            );
                            warp.done = true;
                            retired = true;
                        }
                        Some(d) if d.name == MnemonicName::Halt => {
                            warp.done = true;
                            retired = true;
                        }
                        Some(d) if d.name.is_load() || d.name.is_store() => {
                            warp.state = WarpState::Mem {
                                decoded: d,
                                batch: 0,
                            };
                        }
                        Some(d) => {
                            warp.execute_alu(&d);
                            warp.pc += 1;
                            retired = true;
                        }
                    }
                }
            }
            WarpState::Mem { decoded, batch } => {
                if warp.mem_responses_complete(&decoded, batch, read_ready, write_ready) {
                    if decoded.name.is_load() {
                        warp.apply_load(&decoded, batch, &read_data);
                    }
                    let batches = if decoded.scalar {
                        1
                    } else {
                        WARP_SIZE / DATA_MEM_CHANNELS
                    };
                    if batch + 1 >= batches {
                        warp.pc += 1;
                        warp.state = WarpState::Fetch;
                        retired = true;
                    } else {
                        warp.state = WarpState::Mem {
                            decoded,
                            batch: batch + 1,
                        };
                    }
                }
            }
        }

        if retired {
            self.advance_warp();
        }
    }

    fn drive_outputs(&mut self) {
        self.pins.instruction_mem_read.valid = 0;
        self.pins.data_mem_read.valid = 0;
        self.pins.data_mem_write.valid = 0;
        self.pins.execution_done = self.started && self.all_done();
        if !self.started || self.pins.execution_done {
            return;
        }

        let warp = &self.warps[self.current];
        match &warp.state {
            WarpState::Fetch => {
                self.pins.instruction_mem_read.valid = 1;
                self.pins.instruction_mem_read.address[0] =
                    self.base_instructions.wrapping_add(warp.pc);
            }
            WarpState::Mem { decoded, batch } => {
                let d = decoded;
                if d.scalar {
                    let base = self.base_data.wrapping_add(d.imm as u32);
                    if d.name.is_load() {
                        let port = &mut self.pins.data_mem_read;
                        port.valid = 1;
                        port.address[0] = base.wrapping_add(warp.sregs[d.rs1]);
                    } else {
                        let port = &mut self.pins.data_mem_write;
                        port.valid = 1;
                        port.address[0] = base.wrapping_add(warp.sregs[d.rs2]);
                        port.data[0] = store_value(d.name, warp.sregs[d.rs1]);
                    }
                    return;
                }

                let mask = warp.active_mask();
                for channel in 0..DATA_MEM_CHANNELS {
                    let lane = batch * DATA_MEM_CHANNELS + channel;
                    if lane >= WARP_SIZE {
                        break;
                    }
                    if !get_bit(mask, lane) {
                        continue;
                    }
                    let base = self.base_data.wrapping_add(d.imm as u32);
                    if d.name.is_load() {
                        let port = &mut self.pins.data_mem_read;
                        set_bit(&mut port.valid, channel, true);
                        port.address[channel] = base.wrapping_add(warp.vregs[d.rs1][lane]);
                    } else {
                        let port = &mut self.pins.data_mem_write;
                        set_bit(&mut port.valid, channel, true);
                        port.address[channel] = base.wrapping_add(warp.vregs[d.rs2][lane]);
                        port.data[channel] = store_value(d.name, warp.vregs[d.rs1][lane]);
                    }
                }
            }
        }
    }
}

impl Dut for Core {
    fn pins(&self) -> &Pins {
        &self.pins
    }

    fn pins_mut(&mut self) -> &mut Pins {
        &mut self.pins
    }

    fn eval(&mut self) {
        let rising = self.pins.clk && !self.prev_clk;
        self.prev_clk = self.pins.clk;
        if rising {
            self.on_rising_edge();
        }
        self.drive_outputs();
    }
}
