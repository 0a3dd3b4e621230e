pub mod organization;
pub mod system;
pub mod task;
