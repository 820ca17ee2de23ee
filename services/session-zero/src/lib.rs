pub mod capture;
pub mod config;
pub mod console;
pub mod deepgram_adapter;
pub mod prompt_loader;
