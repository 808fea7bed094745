pub mod atom;
pub mod element;
pub mod structure;
