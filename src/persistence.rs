//! # Checksummed value slots in non-volatile storage
//!
//! Each slot holds a 32-bit signed value as 4 little-endian bytes followed by
//! the 8-bit sum of those bytes. A record torn by a power loss during a write
//! fails the checksum and reads back as absent, never as a partial value.
//!
//! Slots are spaced [`SLOT_STRIDE`] bytes apart, [`RECORD_LEN`] bytes of each
//! are used.

use core::fmt::Debug;

use embedded_storage::{ReadStorage, Storage};
use num_enum::IntoPrimitive;

/// Address distance between two slots.
pub const SLOT_STRIDE: u32 = 8;
/// Bytes per record: value plus checksum.
pub const RECORD_LEN: usize = 5;

/// Persisted values.
#[derive(Copy, Clone, Debug, PartialEq, Eq, IntoPrimitive)]
#[repr(u8)]
pub enum Slot {
    /// Probe set-point, [`crate::fixed::Fixed`] bits.
    ProbeSetpoint = 0,
    /// Outer loop integral at 8x resolution.
    OuterIntegral = 1,
    // 2 holds the elapsed process time of the stage scheduler.
    /// Inner loop integral, [`crate::fixed::Fixed`] bits.
    InnerIntegral = 3,
}

impl Slot {
    /// Start address of the record.
    pub fn address(self) -> u32 {
        u8::from(self) as u32 * SLOT_STRIDE
    }
}

/// Reasons a slot reads back as absent.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Error<E> {
    /// Stored and recomputed checksum differ. Also the state of a slot that was
    /// never written (unless the erased pattern happens to sum up).
    Checksum { stored: u8, computed: u8 },
    /// The storage device failed.
    Storage(E),
}

fn checksum(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0u8, |sum, b| sum.wrapping_add(*b))
}

/// Encode `value` into a slot record.
pub fn encode(value: i32) -> [u8; RECORD_LEN] {
    let mut record = [0; RECORD_LEN];
    record[..4].copy_from_slice(&value.to_le_bytes());
    record[4] = checksum(&record[..4]);
    record
}

/// Decode and verify a slot record.
pub fn decode<E>(record: &[u8; RECORD_LEN]) -> Result<i32, Error<E>> {
    let (data, stored) = (&record[..4], record[4]);
    let computed = checksum(data);
    if computed != stored {
        return Err(Error::Checksum { stored, computed });
    }
    let mut bytes = [0; 4];
    bytes.copy_from_slice(data);
    Ok(i32::from_le_bytes(bytes))
}

/// Read and verify a slot.
pub fn read<S: ReadStorage>(storage: &mut S, slot: Slot) -> Result<i32, Error<S::Error>> {
    let mut record = [0; RECORD_LEN];
    storage
        .read(slot.address(), &mut record)
        .map_err(Error::Storage)?;
    decode(&record)
}

/// Write a slot.
pub fn save<S: Storage>(storage: &mut S, slot: Slot, value: i32) -> Result<(), S::Error>
where
    S::Error: Debug,
{
    storage.write(slot.address(), &encode(value)).map_err(|e| {
        log::error!("Storing {:?} failed: {:?}", slot, e);
        e
    })?;
    log::info!("Stored {:?} = {}", slot, value);
    Ok(())
}

/// Read a slot, `None` if it is absent or unreadable.
pub fn load<S: ReadStorage>(storage: &mut S, slot: Slot) -> Option<i32>
where
    S::Error: Debug,
{
    match read(storage, slot) {
        Ok(value) => {
            log::info!("Restored {:?} = {}", slot, value);
            Some(value)
        }
        Err(e) => {
            log::warn!("Restoring {:?} failed: {:?}", slot, e);
            None
        }
    }
}

/// Byte-addressed storage in RAM.
///
/// Starts out in the erased state (`0xff`). Used by the simulator and tests.
#[derive(Clone, Debug)]
pub struct RamStorage<const N: usize> {
    bytes: [u8; N],
}

/// Out-of-range access on a [`RamStorage`].
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct OutOfBounds;

impl<const N: usize> RamStorage<N> {
    pub const fn new() -> Self {
        Self { bytes: [0xff; N] }
    }

    pub fn bytes(&self) -> &[u8; N] {
        &self.bytes
    }

    pub fn bytes_mut(&mut self) -> &mut [u8; N] {
        &mut self.bytes
    }

    fn range(offset: u32, len: usize) -> Result<core::ops::Range<usize>, OutOfBounds> {
        let start = offset as usize;
        let end = start.checked_add(len).ok_or(OutOfBounds)?;
        if end > N {
            return Err(OutOfBounds);
        }
        Ok(start..end)
    }
}

impl<const N: usize> Default for RamStorage<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> ReadStorage for RamStorage<N> {
    type Error = OutOfBounds;

    fn read(&mut self, offset: u32, bytes: &mut [u8]) -> Result<(), Self::Error> {
        let range = Self::range(offset, bytes.len())?;
        bytes.copy_from_slice(&self.bytes[range]);
        Ok(())
    }

    fn capacity(&self) -> usize {
        N
    }
}

impl<const N: usize> Storage for RamStorage<N> {
    fn write(&mut self, offset: u32, bytes: &[u8]) -> Result<(), Self::Error> {
        let range = Self::range(offset, bytes.len())?;
        self.bytes[range].copy_from_slice(bytes);
        Ok(())
    }
}
