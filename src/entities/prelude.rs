#![allow(unused_imports)]

pub use super::transaction::Entity as Transaction;
