pub mod audio;
pub mod camera;
pub mod config;
pub mod hotkey;
pub mod language;
pub mod reward;
pub mod services;
pub mod session;
