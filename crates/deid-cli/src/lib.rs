//! Command-line front end for the SVS de-identification pipeline.
//!
//! `main` parses flags, resolves a [`RunConfig`](deid_model::RunConfig)
//! through [`config`], and hands it to [`commands`].

pub mod cli;
pub mod commands;
pub mod config;
pub mod logging;
pub mod summary;
