pub mod plugin_client;
pub mod repository;
pub mod service;
pub mod stream;

#[cfg(test)]
mod testing;
