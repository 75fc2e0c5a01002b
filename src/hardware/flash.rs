//! Persistence slots in the first flash word of a bank.
//!
//! Flash is erased per sector, so every write reprograms the whole record area
//! from a RAM image. Checkpoints are rare enough for the sector endurance.
//!
//! A power loss between the erase and the program loses every slot at once.
//! The erased record fails its checksum and reads back as absent, so the
//! controller then starts from the configured set-point with zero integrals.

use embedded_storage::nor_flash::{ErrorType, NorFlash, ReadNorFlash};
use embedded_storage::{ReadStorage, Storage};

use super::hal::flash::{LockedFlashBank, UnlockedFlashBank};

/// Bytes reserved for records, one flash word.
pub const RECORD_AREA: usize = 32;

pub type BankError = <LockedFlashBank as ErrorType>::Error;

#[derive(Debug)]
pub enum Error {
    OutOfBounds,
    Bank(BankError),
}

impl From<BankError> for Error {
    fn from(e: BankError) -> Self {
        Self::Bank(e)
    }
}

pub struct FlashStorage {
    bank: LockedFlashBank,
    image: [u8; RECORD_AREA],
}

impl FlashStorage {
    pub fn new(bank: LockedFlashBank) -> Self {
        Self {
            bank,
            image: [0xff; RECORD_AREA],
        }
    }
}

impl ReadStorage for FlashStorage {
    type Error = Error;

    fn read(&mut self, offset: u32, bytes: &mut [u8]) -> Result<(), Self::Error> {
        if offset as usize + bytes.len() > RECORD_AREA {
            return Err(Error::OutOfBounds);
        }
        Ok(self.bank.read(offset, bytes)?)
    }

    fn capacity(&self) -> usize {
        RECORD_AREA
    }
}

impl Storage for FlashStorage {
    fn write(&mut self, offset: u32, bytes: &[u8]) -> Result<(), Self::Error> {
        let start = offset as usize;
        let end = start + bytes.len();
        if end > RECORD_AREA {
            return Err(Error::OutOfBounds);
        }
        self.bank.read(0, &mut self.image)?;
        if self.image[start..end] == *bytes {
            return Ok(());
        }
        self.image[start..end].copy_from_slice(bytes);

        let mut bank = self.bank.unlocked();
        bank.erase(0, <UnlockedFlashBank<'static> as NorFlash>::ERASE_SIZE as u32)?;
        bank.write(0, &self.image)?;
        Ok(())
    }
}
