pub mod error;
pub mod format;
pub mod idcounter;
pub mod parser;
pub mod rpc;
