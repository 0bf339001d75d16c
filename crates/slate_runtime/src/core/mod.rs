pub mod gc;
pub mod value;
