pub mod partition;
pub mod postprocess;
