pub mod clustering;
pub mod completeness;
pub mod config;
pub mod dataset_writer;
pub mod env_loader;
pub mod excel_writer;
pub mod extractor;
pub mod js_literal;
pub mod matcher;
pub mod merge;
pub mod models;
pub mod pipeline;
pub mod report;
pub mod similarity;
pub mod standardize;
