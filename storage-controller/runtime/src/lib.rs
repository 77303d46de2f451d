#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

pub use gateway_storage_consul as consul;
pub use gateway_storage_core as core;
pub use gateway_storage_file as file;
pub use gateway_storage_k8s as k8s;

mod args;
mod log;

#[cfg(test)]
mod tests;

pub use self::args::Args;
