//! SD card storage collaborator backed by `embedded-sdmmc`.
//!
//! Record I/O is blocking and happens only from the monitor task, inside a
//! tick. The FAT volume is opened and closed per operation, so a pulled or
//! dying card costs at most that one operation; handles dropped on an error
//! path close themselves (RAII), the success path closes them explicitly to
//! surface close errors.

use embedded_sdmmc::{Mode, SdCard, TimeSource, VolumeIdx, VolumeManager};

use super::{RecordText, Storage, StorageError};

pub struct SdCardStorage<S, D, T>
where
    S: embedded_hal::spi::SpiDevice<u8>,
    D: embedded_hal::delay::DelayNs,
    T: TimeSource,
{
    volume_mgr: VolumeManager<SdCard<S, D>, T, 4, 4, 1>,
}

impl<S, D, T> SdCardStorage<S, D, T>
where
    S: embedded_hal::spi::SpiDevice<u8>,
    D: embedded_hal::delay::DelayNs,
    T: TimeSource,
{
    pub fn new(sd_card: SdCard<S, D>, time_source: T) -> Self {
        Self {
            volume_mgr: VolumeManager::new(sd_card, time_source),
        }
    }
}

impl<S, D, T> Storage for SdCardStorage<S, D, T>
where
    S: embedded_hal::spi::SpiDevice<u8>,
    D: embedded_hal::delay::DelayNs,
    T: TimeSource,
{
    fn mount(&mut self) -> Result<(), StorageError> {
        // Probing the volume proves the card is present and the FAT is sane.
        let volume = self
            .volume_mgr
            .open_volume(VolumeIdx(0))
            .map_err(|e| StorageError::mount(&e))?;
        volume.close().map_err(|e| StorageError::mount(&e))?;
        Ok(())
    }

    fn read_file(&mut self, path: &str) -> Result<RecordText, StorageError> {
        let name = path.trim_start_matches('/');
        let volume = self
            .volume_mgr
            .open_volume(VolumeIdx(0))
            .map_err(|e| StorageError::read(&e))?;
        let root = volume.open_root_dir().map_err(|e| StorageError::read(&e))?;
        let file = match root.open_file_in_dir(name, Mode::ReadOnly) {
            Ok(file) => file,
            // A day without a record yet reads as empty, per the contract.
            Err(embedded_sdmmc::Error::NotFound) => return Ok(RecordText::new()),
            Err(e) => return Err(StorageError::read(&e)),
        };

        let mut text = RecordText::new();
        let mut buffer = [0u8; 64];
        'drain: loop {
            let count = file.read(&mut buffer).map_err(|e| StorageError::read(&e))?;
            if count == 0 {
                break;
            }
            for &byte in &buffer[..count] {
                if text.push(byte as char).is_err() {
                    // Oversized records are truncated, not rejected.
                    break 'drain;
                }
            }
        }

        file.close().map_err(|e| StorageError::read(&e))?;
        root.close().map_err(|e| StorageError::read(&e))?;
        volume.close().map_err(|e| StorageError::read(&e))?;
        Ok(text)
    }

    fn write_file(&mut self, path: &str, contents: &str) -> Result<(), StorageError> {
        let name = path.trim_start_matches('/');
        let volume = self
            .volume_mgr
            .open_volume(VolumeIdx(0))
            .map_err(|e| StorageError::write(&e))?;
        let root = volume.open_root_dir().map_err(|e| StorageError::write(&e))?;
        let file = root
            .open_file_in_dir(name, Mode::ReadWriteCreateOrTruncate)
            .map_err(|e| StorageError::write(&e))?;
        file.write(contents.as_bytes())
            .map_err(|e| StorageError::write(&e))?;

        file.close().map_err(|e| StorageError::write(&e))?;
        root.close().map_err(|e| StorageError::write(&e))?;
        volume.close().map_err(|e| StorageError::write(&e))?;
        Ok(())
    }

    fn delete_file(&mut self, path: &str) -> Result<(), StorageError> {
        let name = path.trim_start_matches('/');
        let volume = self
            .volume_mgr
            .open_volume(VolumeIdx(0))
            .map_err(|e| StorageError::delete(&e))?;
        let root = volume.open_root_dir().map_err(|e| StorageError::delete(&e))?;
        match root.delete_file_in_dir(name) {
            // Deleting a record that never made it to the card is fine.
            Ok(()) | Err(embedded_sdmmc::Error::NotFound) => {}
            Err(e) => return Err(StorageError::delete(&e)),
        }

        root.close().map_err(|e| StorageError::delete(&e))?;
        volume.close().map_err(|e| StorageError::delete(&e))?;
        Ok(())
    }
}
