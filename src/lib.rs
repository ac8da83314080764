#[macro_use]
extern crate serde;

mod audit;
mod ballot;
mod elgamal;
mod error;
mod merkle;
mod privacy;
mod proof;
mod registry;
mod schulze;
mod serde_enc;
mod store;
mod tally;
mod trustee;

pub use audit::*;
pub use ballot::*;
pub use elgamal::*;
pub use error::*;
pub use merkle::*;
pub use privacy::*;
pub use proof::*;
pub use registry::*;
pub use schulze::*;
pub use serde_enc::*;
pub use store::*;
pub use tally::*;
pub use trustee::*;

#[cfg(test)]
mod tests;
