pub mod api;
pub mod db;
pub mod mongodb;
pub mod otp;
pub mod store;
