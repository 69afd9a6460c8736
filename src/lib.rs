pub mod color;
pub mod config;
pub mod draw;
pub mod rand;
pub mod runner;
pub mod sound;
pub mod state;
pub mod visual;
