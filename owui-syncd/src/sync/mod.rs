pub mod duplicates;
pub mod engine;
pub mod gateway;
pub mod ledger;
pub mod naming;
pub mod scanner;
