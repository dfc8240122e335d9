// SPDX-License-Identifier: MIT

pub mod catalog;
pub mod config;
pub mod graph;
pub mod loader;
pub mod server;
