pub mod html;
pub mod indices;
pub mod serialize;
