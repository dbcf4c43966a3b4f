// Copyright (c) 2025 R3BL LLC. Licensed under Apache License, Version 2.0.

//! Multi-component scenario tests: real spawned owner threads, cross-thread posting,
//! cancellation races, and teardown. Single-component tests live next to their
//! modules in `#[cfg(test)]` blocks.

mod fifo_order_tests;
mod invoke_tests;
mod wait_cancel_tests;
