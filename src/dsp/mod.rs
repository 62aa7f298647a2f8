pub mod resample;
pub mod spectral;
pub mod transform;
