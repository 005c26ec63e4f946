pub mod permissions;
pub mod routing;
