mod handler;
mod ktest;


pub use handler::*;
pub use ktest::*;
