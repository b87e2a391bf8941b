mod common;
mod content_tests;
mod engine_tests;
