// Copyright 2020-2022 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

//! Eager (write-through + undo log) versioning. Grounded on
//! `eager_version_manager.{h,cpp}` in the original simulator: stores
//! mutate memory immediately and the undo log remembers only the
//! earliest pre-image per address.

use super::VersionManager;
use crate::transaction::Address;
use std::collections::HashMap;

/// Undo entries own their pre-image as a `Vec<u8>`, so there is nothing
/// to manually `free` on abort or drop -- unlike the C++ original, a
/// leaked or double-freed undo buffer is not a representable state.
#[derive(Default)]
pub(crate) struct EagerVersionManager {
    undo_log: HashMap<Address, Vec<u8>>,
}

impl VersionManager for EagerVersionManager {
    fn store(&mut self, address: Address, bytes: &[u8]) {
        // Only the first store to a given address records an undo
        // entry; later stores are lost on abort, which is exactly what
        // restores the pre-transaction state.
        self.undo_log.entry(address).or_insert_with(|| {
            let mut pre_image = vec![0u8; bytes.len()];
            unsafe {
                std::ptr::copy_nonoverlapping(address as *const u8, pre_image.as_mut_ptr(), bytes.len());
            }
            pre_image
        });

        unsafe {
            std::ptr::copy_nonoverlapping(bytes.as_ptr(), address as *mut u8, bytes.len());
        }
    }

    fn get_value(&self, _address: Address, _dest: &mut [u8]) -> bool {
        // Reads always see mutated memory directly; nothing is buffered.
        false
    }

    fn abort(&mut self) {
        for (address, pre_image) in self.undo_log.drain() {
            unsafe {
                std::ptr::copy_nonoverlapping(pre_image.as_ptr(), address as *mut u8, pre_image.len());
            }
        }
    }

    fn end(&mut self) {
        self.undo_log.clear();
    }
}
