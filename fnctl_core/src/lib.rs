// SPDX-FileCopyrightText: © 2024 Technical University of Munich, Chair of Connected Mobility
// SPDX-License-Identifier: MIT
pub mod build;
pub mod client;
pub mod deploy;
pub mod http_invoker;
pub mod job;
pub mod push;
pub mod registry;
pub mod run;
pub mod store;
pub mod unconfigured;

pub use client::Client;
