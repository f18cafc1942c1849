// Copyright 2020-2022 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

//! Lazy (write-buffer) versioning. Grounded on
//! `lazy_version_manager.{h,cpp}` in the original simulator: stores are
//! buffered privately and applied to memory only at commit.

use super::VersionManager;
use crate::transaction::Address;
use std::collections::HashMap;

#[derive(Default)]
pub(crate) struct LazyVersionManager {
    write_buffer: HashMap<Address, Vec<u8>>,
}

impl VersionManager for LazyVersionManager {
    fn store(&mut self, address: Address, bytes: &[u8]) {
        // Insert replaces any earlier entry for this address; the old
        // Vec is dropped, so we only ever keep the latest write.
        self.write_buffer.insert(address, bytes.to_vec());
    }

    fn get_value(&self, address: Address, dest: &mut [u8]) -> bool {
        match self.write_buffer.get(&address) {
            Some(bytes) => {
                dest.copy_from_slice(bytes);
                true
            }
            None => false,
        }
    }

    fn abort(&mut self) {
        self.write_buffer.clear();
    }

    fn end(&mut self) {
        for (address, bytes) in self.write_buffer.drain() {
            unsafe {
                std::ptr::copy_nonoverlapping(bytes.as_ptr(), address as *mut u8, bytes.len());
            }
        }
    }
}
