mod command_tests;
mod config_tests;
mod filter_tests;
mod task_tests;
