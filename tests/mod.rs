mod support;

mod directory_tests;
mod postgres_tests;
