/*++

Licensed under the Apache-2.0 license.

File Name:

    client.rs

Abstract:

    File contains the per-handle control surface: one staging buffer in
    DRAM, requests expressed relative to it, and bounded mappings of it.

--*/

use crate::{ChaosDriver, Resource};
use chaos_api::{ChaosApiError, ChaosRequest};
use chaos_emu_bus::{Bus, SharedMemory};
use chaos_error::{ChaosError, ChaosResult};
use std::sync::Arc;

/// An open handle on the accelerator
pub struct Client {
    driver: Arc<ChaosDriver>,
    buffer: Option<Resource>,
}

impl Client {
    pub fn new(driver: Arc<ChaosDriver>) -> Self {
        Self {
            driver,
            buffer: None,
        }
    }

    /// Allocate the staging buffer; allowed once per client
    ///
    /// # Error
    ///
    /// * `CLIENT_INVALID_SIZE` - `size` is zero
    /// * `CLIENT_BUFFER_EXISTS` - The buffer was already allocated
    /// * `DRIVER_DRAM_NO_SPACE` - DRAM is exhausted
    pub fn allocate_buffer(&mut self, size: usize) -> ChaosResult<()> {
        if size == 0 {
            return Err(ChaosError::CLIENT_INVALID_SIZE);
        }
        if self.buffer.is_some() {
            return Err(ChaosError::CLIENT_BUFFER_EXISTS);
        }
        let buffer = self.driver.pool().allocate(size)?;
        log::debug!(
            "client buffer at {:#x}, {:#x} bytes",
            buffer.offset(),
            buffer.size()
        );
        self.buffer = Some(buffer);
        Ok(())
    }

    /// Size of the staging buffer, if allocated
    pub fn buffer_size(&self) -> Option<usize> {
        self.buffer.as_ref().map(Resource::size)
    }

    /// Run `req`, whose buffer fields are offsets into the staging buffer
    ///
    /// # Returns
    ///
    /// * `ChaosRequest` - `req` with `out_size` set to the bytes produced
    pub fn request(&self, req: &ChaosRequest) -> Result<ChaosRequest, ChaosApiError> {
        let buffer = self.buffer.as_ref().ok_or(ChaosError::CLIENT_NO_BUFFER)?;
        let translate = |offset: u32, size: u32| -> ChaosResult<u32> {
            let end = offset as u64 + size as u64;
            if end > buffer.size() as u64 {
                return Err(ChaosError::CLIENT_INVALID_OFFSET);
            }
            u32::try_from(buffer.offset() as u64 + offset as u64)
                .map_err(|_| ChaosError::CLIENT_INVALID_OFFSET)
        };
        let dev_req = ChaosRequest {
            algo: req.algo,
            input: translate(req.input, req.in_size)?,
            in_size: req.in_size,
            key: translate(req.key, req.key_size)?,
            key_size: req.key_size,
            output: translate(req.output, req.out_size)?,
            out_size: req.out_size,
        };
        let done = self.driver.mailbox().request(&dev_req)?;
        Ok(ChaosRequest {
            out_size: done.out_size,
            ..*req
        })
    }

    /// Map `len` bytes of the staging buffer starting at `offset`
    pub fn map(&self, offset: usize, len: usize) -> ChaosResult<MappedBuffer<'_>> {
        let buffer = self.buffer.as_ref().ok_or(ChaosError::CLIENT_NO_BUFFER)?;
        let end = offset
            .checked_add(len)
            .ok_or(ChaosError::CLIENT_INVALID_MAPPING)?;
        if len == 0 || end > buffer.size() {
            return Err(ChaosError::CLIENT_INVALID_MAPPING);
        }
        Ok(MappedBuffer {
            dram: &**self.driver.dram(),
            base: buffer.offset() + offset,
            len,
        })
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        if let Some(buffer) = self.buffer.take() {
            if let Err(err) = self.driver.pool().free(buffer) {
                log::error!("freeing client buffer failed: {err}");
            }
        }
    }
}

/// Window onto part of a client's staging buffer
pub struct MappedBuffer<'a> {
    dram: &'a SharedMemory,
    base: usize,
    len: usize,
}

impl MappedBuffer<'_> {
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    fn check(&self, offset: usize, len: usize) -> ChaosResult<usize> {
        match offset.checked_add(len) {
            Some(end) if end <= self.len => Ok(self.base + offset),
            _ => Err(ChaosError::CLIENT_INVALID_MAPPING),
        }
    }

    /// Copy out of the mapping
    pub fn read(&self, offset: usize, buf: &mut [u8]) -> ChaosResult<()> {
        let start = self.check(offset, buf.len())?;
        Ok(self.dram.read_bytes(start, buf)?)
    }

    /// Copy into the mapping
    pub fn write(&self, offset: usize, data: &[u8]) -> ChaosResult<()> {
        let start = self.check(offset, data.len())?;
        Ok(self.dram.write_bytes(start, data)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DriverConfig;
    use chaos_emu_bus::DeviceResources;

    fn driver() -> Arc<ChaosDriver> {
        let config = DriverConfig {
            queue_size: 4,
            ..Default::default()
        };
        let resources = DeviceResources::new(0x1000).unwrap();
        Arc::new(ChaosDriver::new(resources, &config).unwrap())
    }

    #[test]
    fn test_single_buffer() {
        let driver = driver();
        let before = driver.pool().available();
        let mut client = driver.open();

        assert_eq!(
            client.request(&ChaosRequest::default()),
            Err(ChaosApiError::Driver(ChaosError::CLIENT_NO_BUFFER))
        );
        assert_eq!(client.allocate_buffer(0), Err(ChaosError::CLIENT_INVALID_SIZE));
        client.allocate_buffer(0x100).unwrap();
        assert_eq!(
            client.allocate_buffer(0x100),
            Err(ChaosError::CLIENT_BUFFER_EXISTS)
        );
        assert_eq!(client.buffer_size(), Some(0x100));

        let mut other = driver.open();
        assert_eq!(
            other.allocate_buffer(0x1000),
            Err(ChaosError::DRIVER_DRAM_NO_SPACE)
        );

        drop(client);
        drop(other);
        assert_eq!(driver.pool().available(), before);
    }

    #[test]
    fn test_request_offsets_checked() {
        let driver = driver();
        let mut client = driver.open();
        client.allocate_buffer(0x40).unwrap();
        let bad = [
            ChaosRequest {
                input: 0x30,
                in_size: 0x11,
                ..Default::default()
            },
            ChaosRequest {
                key: 0x41,
                ..Default::default()
            },
            ChaosRequest {
                output: u32::MAX,
                out_size: u32::MAX,
                ..Default::default()
            },
        ];
        for req in bad {
            assert_eq!(
                client.request(&req),
                Err(ChaosApiError::Driver(ChaosError::CLIENT_INVALID_OFFSET))
            );
        }
    }

    #[test]
    fn test_mapping_bounds() {
        let driver = driver();
        let mut client = driver.open();
        assert!(client.map(0, 1).is_err());
        client.allocate_buffer(0x20).unwrap();

        assert_eq!(
            client.map(0x10, 0x11).err(),
            Some(ChaosError::CLIENT_INVALID_MAPPING)
        );
        assert_eq!(
            client.map(usize::MAX, 2).err(),
            Some(ChaosError::CLIENT_INVALID_MAPPING)
        );

        let map = client.map(0x10, 0x10).unwrap();
        map.write(0, b"chaos").unwrap();
        assert_eq!(map.write(0xc, b"chaos"), Err(ChaosError::CLIENT_INVALID_MAPPING));

        let whole = client.map(0, 0x20).unwrap();
        let mut out = [0u8; 5];
        whole.read(0x10, &mut out).unwrap();
        assert_eq!(&out, b"chaos");
        assert_eq!(whole.len(), 0x20);
    }
}
