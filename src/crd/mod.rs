//! # Custom Resource Definitions
//!
//! Primary resource (`Microcks`) and satellites (`APISource`, `SecretSource`, `Test`).

mod microcks;
mod sources;
mod status;
mod test_run;

pub use microcks::*;
pub use sources::*;
pub use status::*;
pub use test_run::*;
