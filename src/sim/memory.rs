//! The instruction- and data-memory models serviced once per simulated
//! clock cycle.

use std::collections::BTreeMap;

use rustc_hash::FxHashMap;

use crate::asm::encoder::Program;
use crate::isa::InstructionWord;

use super::{get_bit, set_bit, ReadPort, WritePort, DATA_MEM_CHANNELS, INST_MEM_CHANNELS};

/// Addresses must stay below this; the top word is reserved as an
/// invalid-address marker, matching the device's bus convention.
const MAX_ADDRESS: u32 = u32::MAX;

/// Sparse instruction store. Never-written cells read as zero.
#[derive(Debug, Default)]
pub struct InstructionMemory {
    memory: FxHashMap<u32, u32>,
    push_ptr: u32,
}

impl InstructionMemory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Places one instruction at an explicit address. Does not move the
    /// push pointer.
    pub fn load(&mut self, addr: u32, word: InstructionWord) {
        if addr < MAX_ADDRESS {
            self.memory.insert(addr, word.bits());
        } else {
            log::error!("attempt to load instruction at invalid address {addr:#x}");
        }
    }

    /// Appends one instruction at the push pointer. The pointer is
    /// advanced only by push calls, never by [`load`](Self::load).
    pub fn push(&mut self, word: InstructionWord) {
        self.memory.insert(self.push_ptr, word.bits());
        self.push_ptr += 1;
    }

    /// Loads an assembled program starting at `base`.
    pub fn load_program(&mut self, base: u32, program: &Program) {
        for (offset, word) in program.instructions.iter().enumerate() {
            self.load(base + offset as u32, *word);
        }
    }

    pub fn get(&self, addr: u32) -> u32 {
        self.memory.get(&addr).copied().unwrap_or(0)
    }

    /// Services this cycle's read requests: every channel with its
    /// `valid` bit set gets data and a `ready` bit.
    pub fn process(&mut self, port: &mut ReadPort<INST_MEM_CHANNELS>) {
        for i in 0..INST_MEM_CHANNELS {
            if get_bit(port.valid, i) {
                let addr = port.address[i];
                if addr < MAX_ADDRESS {
                    port.data[i] = self.get(addr);
                } else {
                    port.data[i] = 0;
                    log::error!("instruction read out of bounds at {addr:#x}");
                }
                set_bit(&mut port.ready, i, true);
            } else {
                set_bit(&mut port.ready, i, false);
            }
        }
    }
}

/// Sparse data store, ordered so dumps come out address-ascending.
#[derive(Debug, Default)]
pub struct DataMemory {
    memory: BTreeMap<u32, u32>,
    push_ptr: u32,
}

impl DataMemory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends one word at the push pointer. The pointer is advanced
    /// only by push calls, never by [`set`](Self::set).
    pub fn push(&mut self, word: u32) {
        self.memory.insert(self.push_ptr, word);
        self.push_ptr += 1;
    }

    /// Writes one word at an explicit address. Does not move the push
    /// pointer.
    pub fn set(&mut self, addr: u32, word: u32) {
        self.memory.insert(addr, word);
    }

    pub fn get(&self, addr: u32) -> u32 {
        self.memory.get(&addr).copied().unwrap_or(0)
    }

    /// The populated cells, address-ascending.
    pub fn iter(&self) -> impl Iterator<Item = (u32, u32)> + '_ {
        self.memory.iter().map(|(addr, word)| (*addr, *word))
    }

    /// Services this cycle's requests. Writes land before reads, so a
    /// read of a just-written address returns the new value within the
    /// same cycle.
    pub fn process(
        &mut self,
        read: &mut ReadPort<DATA_MEM_CHANNELS>,
        write: &mut WritePort<DATA_MEM_CHANNELS>,
    ) {
        for i in 0..DATA_MEM_CHANNELS {
            if get_bit(write.valid, i) {
                let addr = write.address[i];
                if addr < MAX_ADDRESS {
                    self.memory.insert(addr, write.data[i]);
                } else {
                    log::error!("data write out of bounds at {addr:#x}");
                }
                set_bit(&mut write.ready, i, true);
            } else {
                set_bit(&mut write.ready, i, false);
            }
        }

        for i in 0..DATA_MEM_CHANNELS {
            if get_bit(read.valid, i) {
                let addr = read.address[i];
                if addr < MAX_ADDRESS {
                    read.data[i] = self.get(addr);
                } else {
                    read.data[i] = 0;
                    log::error!("data read out of bounds at {addr:#x}");
                }
                set_bit(&mut read.ready, i, true);
            } else {
                set_bit(&mut read.ready, i, false);
            }
        }
    }
}
