pub mod client;
pub mod config;
pub mod path;
pub mod vault;

#[cfg(test)]
mod testing;
