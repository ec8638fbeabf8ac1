mod common;
mod install_tests;
mod query_tests;
