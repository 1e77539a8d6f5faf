pub mod prelude;

pub mod transaction;
