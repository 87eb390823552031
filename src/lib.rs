pub mod takeout_core;
