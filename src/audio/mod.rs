pub mod decode;
pub mod pitch;
