use eprof::engine::backend::dft::DEFAULT_FUNCTIONAL;
use eprof::engine::backend::ml::{DEFAULT_DEVICE, DEFAULT_MODEL, DEFAULT_TASKS};
use std::path::PathBuf;

pub struct DefaultsConfig {
    pub z_start: f64,
    pub z_end: f64,
    pub z_step: f64,
    pub vacuum: f64,
    pub miller: [i32; 3],
    pub crystal_size: [usize; 3],
    pub layer_size: [usize; 2],
    pub use_ml: bool,
    pub use_dft: bool,
    pub ml_tasks: Vec<String>,
    pub ml_model: String,
    pub ml_device: String,
    pub dft_functional: String,
    pub dft_height_stride: usize,
    pub output_directory: PathBuf,
    pub save_structures: bool,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            z_start: 2.0,
            z_end: 8.0,
            z_step: 0.2,
            vacuum: 14.0,
            miller: [1, 1, 1],
            crystal_size: [3, 3, 4],
            layer_size: [3, 3],
            use_ml: true,
            use_dft: true,
            ml_tasks: DEFAULT_TASKS.iter().map(|t| t.to_string()).collect(),
            ml_model: DEFAULT_MODEL.to_string(),
            ml_device: DEFAULT_DEVICE.to_string(),
            dft_functional: DEFAULT_FUNCTIONAL.to_string(),
            dft_height_stride: 2,
            output_directory: PathBuf::from("./results"),
            save_structures: true,
        }
    }
}
