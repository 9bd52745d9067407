// Copyright 2025 minirpc Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! # minirpc CLI
//!
//! Command-line front end for minirpc.
//!
//! - `minirpc serve`: serve the demo [`echo`] service until Ctrl-C
//! - `minirpc call`: make one call and print the JSON result (for scripting)
//!
//! ## Architecture
//!
//! The binary parses arguments with `argh` and delegates to this library:
//! [`echo::service`] builds the demo service descriptor and [`call::run`]
//! performs a one-shot call through `minirpc-client`.

pub mod call;
pub mod echo;
