pub mod redirect;
pub mod shorten;
