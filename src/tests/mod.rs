mod manifest_tests;
mod resource_tests;
