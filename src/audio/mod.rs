pub mod correlation;
pub mod decode;
pub mod frontend;
