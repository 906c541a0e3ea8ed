pub mod cli;
pub mod devnet;
