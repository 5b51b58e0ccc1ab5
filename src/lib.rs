pub mod config;
pub mod net;
pub mod proto;
pub mod scenario;
pub mod sim;
pub mod trace;

#[cfg(test)]
mod test;
