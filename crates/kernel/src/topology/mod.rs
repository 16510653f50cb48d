pub mod brep;
pub mod primitives;
