//! Deployment notification protocol

pub mod describe;
pub mod dispatch;
pub mod payload;
pub mod sequence;
