mod pipeline_tests;
mod property_tests;
mod semantic_tests;
