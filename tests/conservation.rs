// Copyright 2020-2022 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

//! The banking scenario from the original simulator's test suite
//! (Joe, Aparna, Nana, Mike, Sam, Popo): concurrent transfers between
//! accounts must never change the sum of all balances, across every
//! legal configuration.

use rand::Rng;
use stm_core::TransactionManager;

#[cfg(test)]
#[ctor::ctor]
fn init_logger() {
    let _ = env_logger::builder()
        .is_test(true)
        .filter_level(log::LevelFilter::Debug)
        .try_init();
}

struct Accounts {
    joe: i64,
    aparna: i64,
    nana: i64,
    mike: i64,
    sam: i64,
    popo: i64,
}

impl Accounts {
    fn opening_balances() -> Self {
        Accounts {
            joe: 1000,
            aparna: 1000,
            nana: 1000,
            mike: 1000,
            sam: 1000,
            popo: 1000,
        }
    }

    fn total(&self) -> i64 {
        self.joe + self.aparna + self.nana + self.mike + self.sam + self.popo
    }

    fn pointers(&mut self) -> [*mut i64; 6] {
        [
            &mut self.joe,
            &mut self.aparna,
            &mut self.nana,
            &mut self.mike,
            &mut self.sam,
            &mut self.popo,
        ]
    }
}

#[derive(Clone, Copy)]
struct SendAddress(usize);
unsafe impl Send for SendAddress {}

impl SendAddress {
    fn of(ptr: *mut i64) -> Self {
        SendAddress(ptr as usize)
    }
    fn as_mut_ptr(self) -> *mut i64 {
        self.0 as *mut i64
    }
    fn as_const_ptr(self) -> *const i64 {
        self.0 as *const i64
    }
}

fn transfer(manager: &TransactionManager, from: SendAddress, to: SendAddress, amount: i64) {
    loop {
        let txn = manager.begin();
        let attempt = (|| -> Result<(), stm_core::TxError> {
            let from_balance = txn.load(from.as_const_ptr())?;
            let to_balance = txn.load(to.as_const_ptr())?;
            txn.store(from.as_mut_ptr(), from_balance - amount)?;
            txn.store(to.as_mut_ptr(), to_balance + amount)?;
            txn.end()
        })();

        if attempt.is_ok() {
            return;
        }
    }
}

/// Ten concurrent transfers among six accounts, retrying on abort:
/// the sum of all balances afterwards must equal the sum before,
/// under every legal versioning/detection pairing (spec §8 scenario 3).
#[test]
fn concurrent_transfers_preserve_total_balance() {
    for (lazy, pessimistic) in [(false, true), (true, true), (true, false)] {
        let manager = TransactionManager::new(lazy, pessimistic).unwrap();
        let mut accounts = Accounts::opening_balances();
        let opening_total = accounts.total();
        let [joe, aparna, nana, mike, sam, popo] = accounts.pointers();

        let transfers = [
            (joe, aparna, 100),
            (aparna, nana, 50),
            (nana, mike, 75),
            (mike, sam, 25),
            (sam, popo, 60),
            (popo, joe, 40),
            (joe, nana, 30),
            (aparna, mike, 20),
            (nana, sam, 15),
            (mike, popo, 45),
        ];

        let pool = threadpool::ThreadPool::new(6);
        for (from, to, amount) in transfers {
            let manager = manager.clone();
            let from = SendAddress::of(from);
            let to = SendAddress::of(to);
            pool.execute(move || transfer(&manager, from, to, amount));
        }
        pool.join();

        assert_eq!(
            accounts.total(),
            opening_total,
            "total balance must be conserved under lazy={lazy} pessimistic={pessimistic}"
        );
    }
}

/// A stress variant with randomized transfer amounts and a larger
/// worker pool, still asserting the same conservation law.
#[test]
fn randomized_concurrent_transfers_preserve_total_balance() {
    let manager = TransactionManager::new(true, true).unwrap();
    let mut accounts = Accounts::opening_balances();
    let opening_total = accounts.total();
    let addresses: Vec<SendAddress> = accounts.pointers().into_iter().map(SendAddress::of).collect();

    let pool = threadpool::ThreadPool::new(8);
    let mut rng = rand::thread_rng();
    for _ in 0..200 {
        let from_idx = rng.gen_range(0..addresses.len());
        let mut to_idx = rng.gen_range(0..addresses.len());
        while to_idx == from_idx {
            to_idx = rng.gen_range(0..addresses.len());
        }
        let amount = rng.gen_range(1..=10);

        let manager = manager.clone();
        let from = addresses[from_idx];
        let to = addresses[to_idx];
        pool.execute(move || transfer(&manager, from, to, amount));
    }
    pool.join();

    assert_eq!(accounts.total(), opening_total, "total balance must be conserved under random load");
}
