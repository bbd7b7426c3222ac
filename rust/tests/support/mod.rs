mod helpers;
mod server;

#[allow(unused_imports)]
pub use helpers::*;
pub use server::*;
