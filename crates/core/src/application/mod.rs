pub mod initialize;
pub mod session;
