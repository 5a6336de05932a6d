pub mod models;
pub mod slots;
pub mod view;
pub mod weather;
