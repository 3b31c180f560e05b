pub mod approval;
pub mod event;
pub mod hook;
