pub mod catalog;
pub mod credits;
pub mod test_engine;
