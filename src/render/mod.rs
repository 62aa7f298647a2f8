pub mod assemble;
pub mod pipeline;
