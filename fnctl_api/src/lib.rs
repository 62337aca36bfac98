// SPDX-FileCopyrightText: © 2024 Technical University of Munich, Chair of Connected Mobility
// SPDX-License-Identifier: MIT
pub mod builder;
pub mod deployer;
pub mod error;
pub mod function;
pub mod invoker;
pub mod pusher;
pub mod registry;
pub mod runner;
pub mod util;
