pub mod fragment;
pub mod note;
pub mod segment;
