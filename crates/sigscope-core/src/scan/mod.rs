mod scanner;
mod signature;

pub use scanner::{Matches, find, find_all, find_near};
pub use signature::Signature;
