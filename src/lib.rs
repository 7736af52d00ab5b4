pub mod capture;
pub mod compositor;
pub mod config;
pub mod error;
pub mod frame;
pub mod frame_loop;
pub mod output;
pub mod region;
pub mod segmentation;
pub mod session;

pub use error::{Error, Result};
