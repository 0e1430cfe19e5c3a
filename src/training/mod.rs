pub mod class_weights;
pub mod padding;
