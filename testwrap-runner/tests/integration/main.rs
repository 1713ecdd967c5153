// Copyright (c) The testwrap Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Integration tests that supervise a real (fake) test binary.

mod basic;
mod fixtures;
mod report;
