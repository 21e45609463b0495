pub mod save;
pub mod sos;
