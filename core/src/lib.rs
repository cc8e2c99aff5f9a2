pub mod blockchain;
pub mod config;
pub mod consensus;
pub mod constants;
pub mod errors;
pub mod plots;
pub mod proof_cache;
pub mod protocols;
pub mod traits;
pub mod utils;

fn _version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
fn _pkg_name() -> &'static str {
    env!("CARGO_PKG_NAME")
}

pub fn version() -> String {
    format!("{}: {}", _pkg_name(), _version())
}

#[test]
fn test_version() {
    println!("{}", version());
}
