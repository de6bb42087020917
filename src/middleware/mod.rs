pub mod gate;
pub mod rbac;
