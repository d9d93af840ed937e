pub mod message;
pub mod tcp;
